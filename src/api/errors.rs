// Unified error envelope. Internal detail goes to the log; the body carries
// a code, a safe message, and a trace id to correlate the two.
use crate::images::ImageError;
use axum::http::header::HeaderName;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;
use uuid::Uuid;

pub(crate) const TRACE_HEADER: &str = "x-trace-id";

pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let message = message.into();
    let trace_id = format!("err_{}", Uuid::new_v4().simple());
    let payload = json!({
        "error": {
            "code": default_error_code(status),
            "message": message,
            "status": status.as_u16(),
            "trace_id": trace_id,
        }
    });
    let mut response = (status, Json(payload)).into_response();
    if let Ok(value) = HeaderValue::from_str(&trace_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(TRACE_HEADER), value);
    }
    response
}

/// Collapse a pipeline failure to what the user may see. The original error
/// carries URLs and backend responses, which stay server-side.
pub fn image_error_response(context: &str, err: &ImageError) -> Response {
    error!("{context}: {err}");
    match err {
        ImageError::Validation(_) => error_response(
            StatusCode::BAD_REQUEST,
            "The image could not be saved. Check the file type and size (max 5 MiB).",
        ),
        ImageError::Generation(_) => error_response(
            StatusCode::BAD_GATEWAY,
            "Image generation failed. Please try again shortly.",
        ),
        ImageError::Fetch(_) | ImageError::Storage(_) => error_response(
            StatusCode::BAD_GATEWAY,
            "The image could not be saved. Please try again shortly.",
        ),
    }
}

fn default_error_code(status: StatusCode) -> &'static str {
    match status {
        StatusCode::BAD_REQUEST => "BAD_REQUEST",
        StatusCode::UNAUTHORIZED => "UNAUTHORIZED",
        StatusCode::FORBIDDEN => "FORBIDDEN",
        StatusCode::NOT_FOUND => "NOT_FOUND",
        StatusCode::CONFLICT => "CONFLICT",
        StatusCode::PAYLOAD_TOO_LARGE => "PAYLOAD_TOO_LARGE",
        StatusCode::BAD_GATEWAY => "UPSTREAM_ERROR",
        _ if status.is_server_error() => "INTERNAL_ERROR",
        _ => "REQUEST_ERROR",
    }
}
