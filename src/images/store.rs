// Object storage backend. A single fixed bucket holds every image; the REST
// protocol matches the storage service's `/storage/v1/object` API.
use crate::config::BucketConfig;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode};

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload with upsert disabled: a path collision is an error, never a
    /// silent overwrite.
    async fn upload(&self, path: &str, bytes: Bytes, content_type: &str) -> Result<()>;
    async fn remove(&self, paths: &[String]) -> Result<()>;
    /// Public URL for an object path. A pure string template; no round trip.
    fn public_url(&self, path: &str) -> String;
}

pub struct BucketClient {
    http: Client,
    endpoint: String,
    bucket: String,
    service_key: String,
}

impl BucketClient {
    pub fn new(http: Client, config: &BucketConfig) -> Self {
        Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            bucket: config.name.clone(),
            service_key: config.service_key.clone(),
        }
    }

    fn object_endpoint(&self, path: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.endpoint, self.bucket, path)
    }
}

#[async_trait]
impl ObjectStore for BucketClient {
    async fn upload(&self, path: &str, bytes: Bytes, content_type: &str) -> Result<()> {
        let response = self
            .http
            .post(self.object_endpoint(path))
            .bearer_auth(&self.service_key)
            .header("x-upsert", "false")
            .header("cache-control", "3600")
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|err| anyhow!("upload request failed: {err}"))?;
        let status = response.status();
        if status == StatusCode::CONFLICT {
            return Err(anyhow!("object already exists at {path}"));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("upload rejected: {status} {body}"));
        }
        Ok(())
    }

    async fn remove(&self, paths: &[String]) -> Result<()> {
        let response = self
            .http
            .delete(format!("{}/storage/v1/object/{}", self.endpoint, self.bucket))
            .bearer_auth(&self.service_key)
            .json(&serde_json::json!({ "prefixes": paths }))
            .send()
            .await
            .map_err(|err| anyhow!("remove request failed: {err}"))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("remove rejected: {status} {body}"));
        }
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.endpoint, self.bucket, path
        )
    }
}
