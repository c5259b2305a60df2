// URL classification: decide from the URL's shape alone where an image
// currently lives. Both the transfer engine and the migration job key their
// idempotence off this, so the function stays pure and deterministic.
use crate::config::{BucketConfig, GenerationConfig};
use percent_encoding::percent_decode_str;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlClass {
    /// Points into this deployment's own bucket; nothing to do.
    StoragePersisted,
    /// Served by a known generator delivery host; assumed to expire.
    GeneratedEphemeral,
    /// Anything else. Treated conservatively as needs-migration.
    Unknown,
}

#[derive(Debug, Clone)]
pub struct UrlClassifier {
    public_prefix: String,
    ephemeral_hosts: Vec<String>,
}

impl UrlClassifier {
    pub fn new(bucket: &BucketConfig, generation: &GenerationConfig) -> Self {
        Self {
            public_prefix: bucket.public_prefix(),
            ephemeral_hosts: generation
                .delivery_hosts
                .iter()
                .map(|host| host.trim().to_ascii_lowercase())
                .filter(|host| !host.is_empty())
                .collect(),
        }
    }

    pub fn classify(&self, url: &str) -> UrlClass {
        if url.starts_with(&self.public_prefix) {
            return UrlClass::StoragePersisted;
        }
        let Ok(parsed) = Url::parse(url) else {
            // Inline SVG markup and other non-URL values land here.
            return UrlClass::Unknown;
        };
        let Some(host) = parsed.host_str() else {
            return UrlClass::Unknown;
        };
        let host = host.to_ascii_lowercase();
        let ephemeral = self
            .ephemeral_hosts
            .iter()
            .any(|known| host == *known || host.ends_with(&format!(".{known}")));
        if ephemeral {
            UrlClass::GeneratedEphemeral
        } else {
            UrlClass::Unknown
        }
    }

    /// Extract the object path from one of our own public URLs. Returns
    /// `None` for foreign URLs, which callers treat as "nothing to delete".
    pub fn object_path(&self, url: &str) -> Option<String> {
        let encoded = url.strip_prefix(&self.public_prefix)?;
        let encoded = encoded.split(['?', '#']).next().unwrap_or(encoded);
        if encoded.is_empty() {
            return None;
        }
        let decoded = percent_decode_str(encoded).decode_utf8().ok()?;
        Some(decoded.into_owned())
    }
}
