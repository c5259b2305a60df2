// Storage transfer engine: move image bytes from wherever they currently are
// (ephemeral generator URL, foreign asset URL, uploaded buffer) into the
// owner-scoped bucket and hand back a stable public URL.
//
// The contract callers rely on: `persist` either returns a URL whose object
// exists in the bucket, or an error with nothing uploaded. Compensation
// across the upload/record boundary is the caller's job.
use crate::images::classify::{UrlClass, UrlClassifier};
use crate::images::error::ImageError;
use crate::images::store::ObjectStore;
use bytes::Bytes;
use chrono::Utc;
use mime::Mime;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Hard cap on any single image payload, enforced before upload.
pub const MAX_IMAGE_BYTES: u64 = 5 * 1024 * 1024;

#[derive(Debug, Clone)]
pub enum ImageSource {
    /// A fetchable URL, possibly short-lived.
    Remote(String),
    /// An in-memory payload with the content type the sender declared.
    Buffer { bytes: Bytes, content_type: String },
}

/// Result of a best-effort delete. Never an `Err`: deletion must not block
/// whatever primary operation it accompanies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Removed,
    /// Not one of our storage URLs (inline markup, foreign host). Correct
    /// no-op, not a failure.
    Skipped,
    Failed(String),
}

impl DeleteOutcome {
    pub fn warning(&self) -> Option<&str> {
        match self {
            DeleteOutcome::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

pub struct TransferEngine {
    http: Client,
    store: Arc<dyn ObjectStore>,
    classifier: UrlClassifier,
}

impl TransferEngine {
    pub fn new(http: Client, store: Arc<dyn ObjectStore>, classifier: UrlClassifier) -> Self {
        Self {
            http,
            store,
            classifier,
        }
    }

    pub fn classifier(&self) -> &UrlClassifier {
        &self.classifier
    }

    pub async fn persist(&self, source: ImageSource, owner_id: &str) -> Result<String, ImageError> {
        let owner_id = owner_id.trim();
        if owner_id.is_empty() {
            return Err(ImageError::Validation("owner id is empty".to_string()));
        }
        match source {
            ImageSource::Remote(url) => self.persist_remote(&url, owner_id).await,
            ImageSource::Buffer {
                bytes,
                content_type,
            } => {
                let content_type = resolve_buffer_content_type(&bytes, &content_type)?;
                self.store_bytes(bytes, &content_type, owner_id).await
            }
        }
    }

    async fn persist_remote(&self, url: &str, owner_id: &str) -> Result<String, ImageError> {
        // Already ours: return unchanged without touching the network. This
        // is what makes re-running persist (and the migration job) converge.
        if self.classifier.classify(url) == UrlClass::StoragePersisted {
            debug!("persist skipped, already in bucket: {url}");
            return Ok(url.to_string());
        }

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| ImageError::Fetch(format!("{url}: {err}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ImageError::Fetch(format!("{url}: {status}")));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("image/webp")
            .to_string();
        if !is_image_content_type(&content_type) {
            return Err(ImageError::Validation(format!(
                "content type {content_type} is not an image"
            )));
        }
        // Declared size first so an oversized body is rejected without
        // buffering it.
        if let Some(declared) = response.content_length() {
            if declared > MAX_IMAGE_BYTES {
                return Err(ImageError::Validation(format!(
                    "declared size {declared} exceeds {MAX_IMAGE_BYTES} bytes"
                )));
            }
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|err| ImageError::Fetch(format!("{url}: {err}")))?;
        self.store_bytes(bytes, &content_type, owner_id).await
    }

    async fn store_bytes(
        &self,
        bytes: Bytes,
        content_type: &str,
        owner_id: &str,
    ) -> Result<String, ImageError> {
        if bytes.len() as u64 > MAX_IMAGE_BYTES {
            return Err(ImageError::Validation(format!(
                "payload of {} bytes exceeds {MAX_IMAGE_BYTES} bytes",
                bytes.len()
            )));
        }
        if bytes.is_empty() {
            return Err(ImageError::Validation("payload is empty".to_string()));
        }
        let path = storage_path(owner_id, extension_for(content_type));
        self.store
            .upload(&path, bytes, content_type)
            .await
            .map_err(|err| ImageError::Storage(format!("{path}: {err}")))?;
        Ok(self.store.public_url(&path))
    }

    /// Remove the object behind one of our public URLs, if it is one.
    pub async fn delete(&self, url: &str) -> DeleteOutcome {
        let Some(path) = self.classifier.object_path(url) else {
            return DeleteOutcome::Skipped;
        };
        match self.store.remove(std::slice::from_ref(&path)).await {
            Ok(()) => DeleteOutcome::Removed,
            Err(err) => {
                warn!("failed to remove storage object {path}: {err}");
                DeleteOutcome::Failed(err.to_string())
            }
        }
    }
}

/// `{owner}/{timestamp}_{token}.{ext}` — owner-scoped and collision-resistant
/// without coordination, so concurrent uploads never contend on a path.
fn storage_path(owner_id: &str, extension: &str) -> String {
    let timestamp = Utc::now().timestamp_millis();
    let token = Uuid::new_v4().simple().to_string();
    format!("{owner_id}/{timestamp}_{}.{extension}", &token[..6])
}

fn is_image_content_type(content_type: &str) -> bool {
    content_type
        .parse::<Mime>()
        .map(|mime| mime.type_() == mime::IMAGE)
        .unwrap_or(false)
}

// Content-type-derived, never filename-derived: source URLs rarely carry a
// meaningful extension.
fn extension_for(content_type: &str) -> &'static str {
    match content_type.parse::<Mime>() {
        Ok(mime) if mime.type_() == mime::IMAGE => match mime.subtype().as_str() {
            "png" => "png",
            "jpeg" | "jpg" => "jpg",
            "webp" => "webp",
            _ => "webp",
        },
        _ => "webp",
    }
}

fn resolve_buffer_content_type(bytes: &Bytes, declared: &str) -> Result<String, ImageError> {
    let declared = declared.trim();
    if let Ok(mime) = declared.parse::<Mime>() {
        if mime.type_() == mime::IMAGE {
            return Ok(declared.to_string());
        }
        if mime != mime::APPLICATION_OCTET_STREAM {
            return Err(ImageError::Validation(format!(
                "content type {declared} is not an image"
            )));
        }
    } else if !declared.is_empty() {
        return Err(ImageError::Validation(format!(
            "unparseable content type {declared}"
        )));
    }
    // No usable declaration: sniff the magic bytes before giving up.
    match image::guess_format(bytes) {
        Ok(image::ImageFormat::Png) => Ok("image/png".to_string()),
        Ok(image::ImageFormat::Jpeg) => Ok("image/jpeg".to_string()),
        Ok(image::ImageFormat::WebP) => Ok("image/webp".to_string()),
        Ok(image::ImageFormat::Gif) => Ok("image/gif".to_string()),
        _ => Err(ImageError::Validation(
            "payload is not a recognizable image".to_string(),
        )),
    }
}
