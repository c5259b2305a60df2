// Route-level flows over fake upstreams: auth, category/item CRUD, photo
// upload, and the generate → save sketch pipeline with its failure handling.
mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use common::build_env;
use pictora_server::api;
use pictora_server::images::UrlClass;
use pictora_server::storage::RecordStore;
use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use tower::util::ServiceExt;

fn app(env: &common::TestEnv) -> Router {
    api::build_router(env.state.clone()).with_state(env.state.clone())
}

async fn send(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

fn multipart_body(boundary: &str, filename: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

#[tokio::test]
async fn requests_without_a_valid_token_get_401() {
    let env = build_env().await;
    let app = app(&env);
    let (status, _) = send(&app, "GET", "/api/items", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send(&app, "GET", "/api/items", Some("bogus"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn category_create_list_duplicate_delete() {
    let env = build_env().await;
    let app = app(&env);
    let token = Some("tok-user-1");

    let (status, body) = send(
        &app,
        "POST",
        "/api/categories",
        token,
        Some(json!({ "name": "  books  " })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["category"]["name"], json!("books"));
    let category_id = body["category"]["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        "POST",
        "/api/categories",
        token,
        Some(json!({ "name": "books" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &app,
        "POST",
        "/api/categories",
        token,
        Some(json!({ "name": "x".repeat(51) })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, "GET", "/api/categories", token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], json!(1));

    // Another owner sees nothing and cannot delete it.
    let (_, body) = send(&app, "GET", "/api/categories", Some("tok-user-2"), None).await;
    assert_eq!(body["count"], json!(0));
    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/api/categories/{category_id}"),
        Some("tok-user-2"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/api/categories/{category_id}"),
        token,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn item_crud_with_validation() {
    let env = build_env().await;
    let app = app(&env);
    let token = Some("tok-user-1");

    let (_, body) = send(
        &app,
        "POST",
        "/api/categories",
        token,
        Some(json!({ "name": "bags" })),
    )
    .await;
    let category_id = body["category"]["id"].as_str().unwrap().to_string();

    // Category is mandatory and must belong to the owner.
    let (status, _) = send(&app, "POST", "/api/items", token, Some(json!({ "name": "bag" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(
        &app,
        "POST",
        "/api/items",
        Some("tok-user-2"),
        Some(json!({ "name": "bag", "category_id": category_id })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "POST",
        "/api/items",
        token,
        Some(json!({ "name": "bag", "category_id": category_id, "quantity": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "POST",
        "/api/items",
        token,
        Some(json!({ "name": "bag", "category_id": category_id, "image_kind": "fancy" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        "POST",
        "/api/items",
        token,
        Some(json!({
            "name": "red bag",
            "description": "  leather  ",
            "category_id": category_id,
            "quantity": 2,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let item_id = body["item"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["item"]["description"], json!("leather"));
    assert_eq!(body["item"]["image_kind"], json!("default"));

    let (status, body) = send(
        &app,
        "GET",
        &format!("/api/items?category_id={category_id}"),
        token,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], json!(1));

    // Empty update set is rejected.
    let (status, _) = send(
        &app,
        "PUT",
        &format!("/api/items/{item_id}"),
        token,
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Nulling the description is a real update.
    let (status, body) = send(
        &app,
        "PUT",
        &format!("/api/items/{item_id}"),
        token,
        Some(json!({ "description": null, "quantity": 3 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["item"]["description"], Value::Null);
    assert_eq!(body["item"]["quantity"], json!(3));

    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/api/items/{item_id}"),
        token,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, "GET", &format!("/api/items/{item_id}"), token, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn photo_upload_persists_and_item_delete_cleans_up() {
    let env = build_env().await;
    let app = app(&env);
    let boundary = "XUPLOADBOUNDARY";
    let png = [0x89u8, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 0, 0, 0];

    let request = Request::builder()
        .method("POST")
        .uri("/api/items/image")
        .header("authorization", "Bearer tok-user-1")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(multipart_body(boundary, "photo.png", "image/png", &png)))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    let image_url = body["image_url"].as_str().unwrap().to_string();
    assert!(image_url.starts_with(&env.config.bucket.public_prefix()));
    assert_eq!(body["image_kind"], json!("uploaded"));
    assert_eq!(env.store.object_count(), 1);

    // Attach the photo to an item, then delete the item: the object goes too.
    let (_, body) = send(
        &app,
        "POST",
        "/api/categories",
        Some("tok-user-1"),
        Some(json!({ "name": "photos" })),
    )
    .await;
    let category_id = body["category"]["id"].as_str().unwrap().to_string();
    let (status, body) = send(
        &app,
        "POST",
        "/api/items",
        Some("tok-user-1"),
        Some(json!({
            "name": "framed photo",
            "category_id": category_id,
            "image_url": image_url,
            "image_kind": "uploaded",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let item_id = body["item"]["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/api/items/{item_id}"),
        Some("tok-user-1"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(env.store.object_count(), 0);
}

#[tokio::test]
async fn non_image_upload_is_rejected() {
    let env = build_env().await;
    let app = app(&env);
    let boundary = "XUPLOADBOUNDARY";

    let request = Request::builder()
        .method("POST")
        .uri("/api/items/image")
        .header("authorization", "Bearer tok-user-1")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(multipart_body(
            boundary,
            "notes.txt",
            "text/plain",
            b"not an image",
        )))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(env.store.object_count(), 0);
}

#[tokio::test]
async fn icon_search_and_recommended_sets() {
    let env = build_env().await;
    let app = app(&env);

    let (status, _) = send(&app, "GET", "/api/sketches/search?q=a", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, "GET", "/api/sketches/search?q=laptop", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], json!(1));
    assert_eq!(body["sketches"][0]["id"], json!("mdi:laptop"));
    assert!(body["sketches"][0]["svg"]
        .as_str()
        .unwrap()
        .starts_with("<svg"));

    let (status, body) = send(&app, "GET", "/api/sketches?category=clothing", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["category"], json!("clothing"));
    assert_eq!(body["categories"].as_array().unwrap().len(), 6);
}

#[tokio::test]
async fn korean_prompt_generates_translates_and_persists() {
    let env = build_env().await;
    let app = app(&env);
    let token = Some("tok-user-1");

    // Over-long prompts are rejected before the backend is invoked.
    let (status, _) = send(
        &app,
        "POST",
        "/api/sketches/generate",
        token,
        Some(json!({ "prompt": "a".repeat(501) })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(env.generation.prompts.lock().unwrap().is_empty());

    let (status, body) = send(
        &app,
        "POST",
        "/api/sketches/generate",
        token,
        Some(json!({ "prompt": "빨간 가방" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["prompt"], json!("빨간 가방"));
    let ephemeral_url = body["image_url"].as_str().unwrap().to_string();
    assert_eq!(
        env.state.engine.classifier().classify(&ephemeral_url),
        UrlClass::GeneratedEphemeral
    );

    // The backend saw the translated, style-wrapped prompt.
    let prompts = env.generation.prompts.lock().unwrap().clone();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].starts_with("red bag"));
    assert!(prompts[0].contains("ink line art"));

    // Saving transfers the ephemeral image into the bucket before the record
    // is written; the record never sees the delivery URL.
    let (status, body) = send(
        &app,
        "POST",
        "/api/sketches/custom",
        token,
        Some(json!({ "image_url": ephemeral_url, "prompt": "빨간 가방" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let stored_url = body["sketch"]["image_url"].as_str().unwrap().to_string();
    assert!(stored_url.starts_with(&env.config.bucket.public_prefix()));
    assert!(stored_url.ends_with(".webp"));
    assert_eq!(env.store.object_count(), 1);

    for record in env.records.list_image_records().unwrap() {
        assert_ne!(
            env.state.engine.classifier().classify(&record.image_url),
            UrlClass::GeneratedEphemeral
        );
    }

    let (status, body) = send(&app, "GET", "/api/sketches/custom", token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], json!(1));
    let sketch_id = body["sketches"][0]["id"].as_str().unwrap().to_string();

    // Foreign owners cannot delete; the owner can, and the object goes too.
    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/api/sketches/custom/{sketch_id}"),
        Some("tok-user-2"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(env.store.object_count(), 1);

    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/api/sketches/custom/{sketch_id}"),
        token,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(env.store.object_count(), 0);
}

#[tokio::test]
async fn failed_record_write_rolls_back_the_upload() {
    let env = build_env().await;
    let app = app(&env);
    env.records.fail_sketch_inserts.store(true, Ordering::SeqCst);

    let (status, _) = send(
        &app,
        "POST",
        "/api/sketches/custom",
        Some("tok-user-1"),
        Some(json!({
            "image_url": env.source.image_url("doomed"),
            "prompt": "red bag",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    // The image was uploaded and then compensated away: no orphan, no record.
    assert_eq!(env.store.uploads(), 1);
    assert_eq!(env.store.object_count(), 0);

    env.records
        .fail_sketch_inserts
        .store(false, Ordering::SeqCst);
    let (_, body) = send(&app, "GET", "/api/sketches/custom", Some("tok-user-1"), None).await;
    assert_eq!(body["count"], json!(0));
}

#[tokio::test]
async fn invalid_save_payloads_are_rejected() {
    let env = build_env().await;
    let app = app(&env);
    let token = Some("tok-user-1");

    let (status, _) = send(
        &app,
        "POST",
        "/api/sketches/custom",
        token,
        Some(json!({ "prompt": "red bag" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "POST",
        "/api/sketches/custom",
        token,
        Some(json!({ "image_url": "not a url", "prompt": "red bag" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "POST",
        "/api/sketches/custom",
        token,
        Some(json!({ "image_url": "https://example.com/x.webp" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(env.store.uploads(), 0);
}
