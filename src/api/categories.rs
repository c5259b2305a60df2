use crate::api::errors::error_response;
use crate::api::user_context::resolve_owner;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::error;

const MAX_NAME_CHARS: usize = 50;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/categories", get(list_categories).post(create_category))
        .route("/api/categories/{id}", delete(delete_category))
}

async fn list_categories(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, Response> {
    let owner = resolve_owner(&state, &headers).await?;
    let categories = state.records.list_categories(&owner.id).map_err(|err| {
        error!("failed to list categories: {err}");
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load categories.")
    })?;
    let count = categories.len();
    Ok(Json(json!({ "categories": categories, "count": count })).into_response())
}

#[derive(Deserialize)]
struct CreateCategoryRequest {
    name: Option<String>,
}

async fn create_category(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CreateCategoryRequest>,
) -> Result<Response, Response> {
    let owner = resolve_owner(&state, &headers).await?;
    let name = payload
        .name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| error_response(StatusCode::BAD_REQUEST, "Category name is required."))?;
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "Category name must be 50 characters or fewer.",
        ));
    }
    let duplicate = state
        .records
        .find_category_by_name(&owner.id, name)
        .map_err(|err| {
            error!("failed to check category name: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create category.")
        })?;
    if duplicate.is_some() {
        return Err(error_response(
            StatusCode::CONFLICT,
            "A category with this name already exists.",
        ));
    }
    // The unique constraint still backstops a concurrent create.
    let created = state.records.insert_category(&owner.id, name).map_err(|err| {
        error!("failed to create category: {err}");
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create category.")
    })?;
    let Some(category) = created else {
        return Err(error_response(
            StatusCode::CONFLICT,
            "A category with this name already exists.",
        ));
    };
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Category created.", "category": category })),
    )
        .into_response())
}

async fn delete_category(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, Response> {
    let owner = resolve_owner(&state, &headers).await?;
    let existing = state.records.get_category(&owner.id, &id).map_err(|err| {
        error!("failed to load category {id}: {err}");
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete category.")
    })?;
    if existing.is_none() {
        return Err(error_response(StatusCode::NOT_FOUND, "Category not found."));
    }
    state.records.delete_category(&owner.id, &id).map_err(|err| {
        error!("failed to delete category {id}: {err}");
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete category.")
    })?;
    Ok(Json(json!({ "message": "Category deleted." })).into_response())
}
