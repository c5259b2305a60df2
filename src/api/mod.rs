// API routes, split per domain.
pub mod categories;
pub mod errors;
pub mod items;
pub mod sketches;
pub mod user_context;

use crate::state::AppState;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;

pub fn build_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/healthz", get(health))
        .merge(categories::router())
        .merge(items::router())
        .merge(sketches::router())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}
