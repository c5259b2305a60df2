use crate::api::errors::error_response;
use crate::auth::{self, AuthUser};
use crate::state::AppState;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use tracing::warn;

/// Resolve the authenticated owner for a request, or produce the 401 the
/// handler should return as-is.
pub async fn resolve_owner(state: &AppState, headers: &HeaderMap) -> Result<AuthUser, Response> {
    let Some(token) = auth::extract_bearer_token(headers) else {
        return Err(unauthorized());
    };
    match state.identity.resolve(&token).await {
        Ok(Some(user)) => Ok(user),
        Ok(None) => Err(unauthorized()),
        Err(err) => {
            warn!("owner resolution failed: {err}");
            Err(unauthorized())
        }
    }
}

fn unauthorized() -> Response {
    error_response(StatusCode::UNAUTHORIZED, "Authentication required.")
}
