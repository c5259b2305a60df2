use crate::api::errors::{error_response, image_error_response};
use crate::api::user_context::resolve_owner;
use crate::images::{ImageSource, MAX_IMAGE_BYTES};
use crate::state::AppState;
use crate::storage::{ImageKind, ItemChanges, NewItem};
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Deserializer};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, warn};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/items", get(list_items).post(create_item))
        .route(
            "/api/items/{id}",
            get(get_item).put(update_item).delete(delete_item),
        )
        .route(
            "/api/items/image",
            post(upload_item_image)
                .layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES as usize + 64 * 1024)),
        )
}

// Distinguishes "field absent" from "field set to null" in PUT payloads.
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn internal(context: &str, err: anyhow::Error) -> Response {
    error!("{context}: {err}");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "Server error. Please try again.")
}

fn parse_image_kind(raw: Option<&str>) -> Result<Option<ImageKind>, Response> {
    match raw {
        None => Ok(None),
        Some(raw) => ImageKind::parse(raw).map(Some).ok_or_else(|| {
            error_response(
                StatusCode::BAD_REQUEST,
                "Image kind must be 'default', 'custom', or 'uploaded'.",
            )
        }),
    }
}

#[derive(Deserialize)]
struct ListItemsQuery {
    category_id: Option<String>,
}

async fn list_items(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListItemsQuery>,
) -> Result<Response, Response> {
    let owner = resolve_owner(&state, &headers).await?;
    let category_filter = query
        .category_id
        .as_deref()
        .filter(|value| !value.is_empty() && *value != "all");
    let items = state
        .records
        .list_items(&owner.id, category_filter)
        .map_err(|err| internal("failed to list items", err))?;
    let count = items.len();
    Ok(Json(json!({ "items": items, "count": count })).into_response())
}

#[derive(Deserialize)]
struct CreateItemRequest {
    name: Option<String>,
    description: Option<String>,
    quantity: Option<i64>,
    image_url: Option<String>,
    image_kind: Option<String>,
    category_id: Option<String>,
}

async fn create_item(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CreateItemRequest>,
) -> Result<Response, Response> {
    let owner = resolve_owner(&state, &headers).await?;
    let name = payload
        .name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| error_response(StatusCode::BAD_REQUEST, "Item name is required."))?;
    let category_id = payload
        .category_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| error_response(StatusCode::BAD_REQUEST, "Select a category."))?;
    let category = state
        .records
        .get_category(&owner.id, category_id)
        .map_err(|err| internal("failed to verify category", err))?;
    if category.is_none() {
        return Err(error_response(StatusCode::BAD_REQUEST, "Select a valid category."));
    }
    let quantity = payload.quantity.unwrap_or(1);
    if quantity < 1 {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "Quantity must be at least 1.",
        ));
    }
    let image_kind =
        parse_image_kind(payload.image_kind.as_deref())?.unwrap_or(ImageKind::Default);

    let item = state
        .records
        .insert_item(NewItem {
            owner_id: owner.id.clone(),
            name: name.to_string(),
            description: payload
                .description
                .as_deref()
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .map(str::to_string),
            quantity,
            image_url: payload.image_url.filter(|url| !url.trim().is_empty()),
            image_kind,
            category_id: Some(category_id.to_string()),
        })
        .map_err(|err| internal("failed to create item", err))?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Item created.", "item": item })),
    )
        .into_response())
}

async fn get_item(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, Response> {
    let owner = resolve_owner(&state, &headers).await?;
    let item = state
        .records
        .get_item(&owner.id, &id)
        .map_err(|err| internal("failed to load item", err))?
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, "Item not found."))?;
    Ok(Json(json!({ "item": item })).into_response())
}

#[derive(Deserialize)]
struct UpdateItemRequest {
    name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    description: Option<Option<String>>,
    quantity: Option<i64>,
    #[serde(default, deserialize_with = "double_option")]
    image_url: Option<Option<String>>,
    image_kind: Option<String>,
}

async fn update_item(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<UpdateItemRequest>,
) -> Result<Response, Response> {
    let owner = resolve_owner(&state, &headers).await?;

    let name = match payload.name.as_deref().map(str::trim) {
        Some("") => {
            return Err(error_response(
                StatusCode::BAD_REQUEST,
                "Item name cannot be empty.",
            ))
        }
        Some(name) => Some(name.to_string()),
        None => None,
    };
    if let Some(quantity) = payload.quantity {
        if quantity < 1 {
            return Err(error_response(
                StatusCode::BAD_REQUEST,
                "Quantity must be at least 1.",
            ));
        }
    }
    let changes = ItemChanges {
        name,
        description: payload.description.map(|value| {
            value
                .map(|text| text.trim().to_string())
                .filter(|text| !text.is_empty())
        }),
        quantity: payload.quantity,
        image_url: payload
            .image_url
            .map(|value| value.filter(|url| !url.trim().is_empty())),
        image_kind: parse_image_kind(payload.image_kind.as_deref())?,
    };
    if changes.is_empty() {
        return Err(error_response(StatusCode::BAD_REQUEST, "Nothing to update."));
    }
    let item = state
        .records
        .update_item(&owner.id, &id, changes)
        .map_err(|err| internal("failed to update item", err))?
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, "Item not found."))?;
    Ok(Json(json!({ "message": "Item updated.", "item": item })).into_response())
}

async fn delete_item(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, Response> {
    let owner = resolve_owner(&state, &headers).await?;
    let item = state
        .records
        .get_item(&owner.id, &id)
        .map_err(|err| internal("failed to load item", err))?
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, "Item not found."))?;
    state
        .records
        .delete_item(&owner.id, &id)
        .map_err(|err| internal("failed to delete item", err))?;

    // The record is gone either way; a stuck storage delete must not turn
    // the response into a failure.
    if item.image_kind != ImageKind::Default {
        if let Some(url) = &item.image_url {
            let outcome = state.engine.delete(url).await;
            if let Some(warning) = outcome.warning() {
                warn!("item {id} deleted but storage object remains: {warning}");
            }
        }
    }
    Ok(Json(json!({ "message": "Item deleted." })).into_response())
}

async fn upload_item_image(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Response, Response> {
    let owner = resolve_owner(&state, &headers).await?;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| error_response(StatusCode::BAD_REQUEST, err.to_string()))?
    {
        if field.file_name().is_none() && field.name() != Some("file") {
            continue;
        }
        let content_type = field.content_type().unwrap_or("").to_string();
        let bytes = field.bytes().await.map_err(|err| {
            error_response(StatusCode::BAD_REQUEST, format!("Failed to read upload: {err}"))
        })?;
        let url = state
            .engine
            .persist(
                ImageSource::Buffer {
                    bytes,
                    content_type,
                },
                &owner.id,
            )
            .await
            .map_err(|err| image_error_response("photo upload failed", &err))?;
        return Ok(Json(json!({
            "image_url": url,
            "image_kind": ImageKind::Uploaded,
        }))
        .into_response());
    }
    Err(error_response(
        StatusCode::BAD_REQUEST,
        "Attach an image file to upload.",
    ))
}
