// Owner resolution. Tokens are opaque here: the identity provider verifies
// them and hands back the owner id this service trusts for path scoping.
use crate::config::AuthConfig;
use anyhow::{anyhow, Result};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Clone)]
pub struct IdentityClient {
    http: Client,
    endpoint: String,
    anon_key: String,
}

impl IdentityClient {
    pub fn new(http: Client, config: &AuthConfig) -> Self {
        Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
        }
    }

    /// Ask the provider who this token belongs to. `Ok(None)` means the
    /// token was rejected; transport errors bubble up.
    pub async fn resolve(&self, token: &str) -> Result<Option<AuthUser>> {
        let response = self
            .http
            .get(format!("{}/auth/v1/user", self.endpoint))
            .bearer_auth(token)
            .header("apikey", &self.anon_key)
            .send()
            .await
            .map_err(|err| anyhow!("identity provider unreachable: {err}"))?;
        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
            status if status.is_success() => {
                let user: AuthUser = response
                    .json()
                    .await
                    .map_err(|err| anyhow!("invalid identity payload: {err}"))?;
                if user.id.trim().is_empty() {
                    return Ok(None);
                }
                Ok(Some(user))
            }
            status => Err(anyhow!("identity provider returned {status}")),
        }
    }
}

pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?;
    let text = value.to_str().ok()?.trim();
    let prefix = text.get(..7)?;
    if !prefix.eq_ignore_ascii_case("bearer ") {
        return None;
    }
    let token = text.get(7..)?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
