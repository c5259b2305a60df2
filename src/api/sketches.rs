use crate::api::errors::{error_response, image_error_response};
use crate::api::user_context::resolve_owner;
use crate::images::{recommended_ids, ImageSource, UrlClass, RECOMMENDED_ICONS};
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, warn};
use url::Url;

const MAX_PROMPT_CHARS: usize = 500;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/sketches", get(list_recommended))
        .route("/api/sketches/search", get(search_sketches))
        .route("/api/sketches/generate", post(generate_sketch))
        .route(
            "/api/sketches/custom",
            get(list_custom_sketches).post(save_custom_sketch),
        )
        .route("/api/sketches/custom/{id}", delete(delete_custom_sketch))
}

#[derive(Deserialize)]
struct RecommendedQuery {
    category: Option<String>,
}

async fn list_recommended(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecommendedQuery>,
) -> Result<Response, Response> {
    let category = query.category.as_deref().filter(|name| !name.is_empty());
    let ids = recommended_ids(category);
    let sketches = state.icons.sketches(&ids).await;
    let categories = RECOMMENDED_ICONS
        .iter()
        .map(|(name, label, _)| json!({ "name": name, "label": label }))
        .collect::<Vec<_>>();
    Ok(Json(json!({
        "sketches": sketches,
        "categories": categories,
        "category": category.unwrap_or("all"),
    }))
    .into_response())
}

#[derive(Deserialize)]
struct SearchQuery {
    q: Option<String>,
    limit: Option<u32>,
}

async fn search_sketches(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Response, Response> {
    let q = query
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| error_response(StatusCode::BAD_REQUEST, "Enter a search term."))?;
    if q.chars().count() < 2 {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "Search terms need at least 2 characters.",
        ));
    }
    let limit = query.limit.unwrap_or(20).min(64);
    let result = state.icons.search(q, limit).await.map_err(|err| {
        error!("icon search failed: {err}");
        error_response(StatusCode::BAD_GATEWAY, "Sketch search is unavailable right now.")
    })?;
    let sketches = state.icons.sketches(&result.icons).await;
    Ok(Json(json!({
        "sketches": sketches,
        "total": result.total,
        "query": q,
    }))
    .into_response())
}

#[derive(Deserialize)]
struct GenerateRequest {
    prompt: Option<String>,
}

async fn generate_sketch(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<GenerateRequest>,
) -> Result<Response, Response> {
    let _owner = resolve_owner(&state, &headers).await?;
    let prompt = validate_prompt(payload.prompt.as_deref())?;
    let generated = state
        .generator
        .generate(prompt)
        .await
        .map_err(|err| image_error_response("sketch generation failed", &err))?;
    if let Some(warning) = &generated.warning {
        warn!("sketch generated with translation fallback: {warning}");
    }
    // The returned URL is ephemeral; it only becomes durable once saved
    // through the custom-sketch endpoint.
    Ok(Json(json!({
        "image_url": generated.url,
        "prompt": prompt,
    }))
    .into_response())
}

async fn list_custom_sketches(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, Response> {
    let owner = resolve_owner(&state, &headers).await?;
    let sketches = state.records.list_sketches(&owner.id).map_err(|err| {
        error!("failed to list sketches: {err}");
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load sketches.")
    })?;
    let count = sketches.len();
    Ok(Json(json!({ "sketches": sketches, "count": count })).into_response())
}

#[derive(Deserialize)]
struct SaveSketchRequest {
    image_url: Option<String>,
    prompt: Option<String>,
}

async fn save_custom_sketch(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<SaveSketchRequest>,
) -> Result<Response, Response> {
    let owner = resolve_owner(&state, &headers).await?;
    let image_url = payload
        .image_url
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .ok_or_else(|| error_response(StatusCode::BAD_REQUEST, "Image URL is required."))?;
    if Url::parse(image_url).is_err() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "Image URL is not a valid URL.",
        ));
    }
    let prompt = validate_prompt(payload.prompt.as_deref())?;

    // Two-phase save: move the image into our bucket first, then write the
    // record. The source URL may expire any moment, so the record must never
    // point at it.
    let already_persisted =
        state.engine.classifier().classify(image_url) == UrlClass::StoragePersisted;
    let stored_url = state
        .engine
        .persist(ImageSource::Remote(image_url.to_string()), &owner.id)
        .await
        .map_err(|err| image_error_response("sketch persist failed", &err))?;

    match state.records.insert_sketch(&owner.id, prompt, &stored_url) {
        Ok(sketch) => Ok((
            StatusCode::CREATED,
            Json(json!({ "message": "Sketch saved.", "sketch": sketch })),
        )
            .into_response()),
        Err(err) => {
            error!("sketch record insert failed: {err}");
            // Compensating delete, but only for an object this request
            // actually uploaded.
            if !already_persisted {
                let outcome = state.engine.delete(&stored_url).await;
                if let Some(warning) = outcome.warning() {
                    warn!("compensating delete left an orphan at {stored_url}: {warning}");
                }
            }
            Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "The sketch could not be saved. Please try again.",
            ))
        }
    }
}

async fn delete_custom_sketch(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, Response> {
    let owner = resolve_owner(&state, &headers).await?;
    let sketch = state
        .records
        .get_sketch(&id)
        .map_err(|err| {
            error!("failed to load sketch {id}: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete sketch.")
        })?
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, "Sketch not found."))?;
    if sketch.owner_id != owner.id {
        return Err(error_response(
            StatusCode::FORBIDDEN,
            "You cannot delete this sketch.",
        ));
    }
    state.records.delete_sketch(&id).map_err(|err| {
        error!("failed to delete sketch {id}: {err}");
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete sketch.")
    })?;
    // Record first, storage second: a stuck storage delete never blocks the
    // deletion the user asked for.
    let outcome = state.engine.delete(&sketch.image_url).await;
    if let Some(warning) = outcome.warning() {
        warn!("sketch {id} deleted but storage object remains: {warning}");
    }
    Ok(Json(json!({ "success": true, "message": "Sketch deleted." })).into_response())
}

fn validate_prompt(prompt: Option<&str>) -> Result<&str, Response> {
    let prompt = prompt
        .map(str::trim)
        .filter(|prompt| !prompt.is_empty())
        .ok_or_else(|| error_response(StatusCode::BAD_REQUEST, "Prompt is required."))?;
    if prompt.chars().count() > MAX_PROMPT_CHARS {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "Prompts are limited to 500 characters.",
        ));
    }
    Ok(prompt)
}
