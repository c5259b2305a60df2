// Client for the text-to-image backend. The interesting part is output
// normalization: depending on backend version the prediction response carries
// a bare URL string, a list of outputs, an object with a `url` field, or only
// a handle that must be polled. Extraction is an explicit ordered strategy
// chain, not property probing.
use crate::config::GenerationConfig;
use crate::images::error::ImageError;
use crate::images::translate::Translator;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

const STYLE_SUFFIX: &str = ", highly detailed ink line art, vintage storybook \
illustration style, meticulous cross-hatching for shading, cream-colored paper \
background, clean outlines, whimsical atmosphere, monochromatic with warm tones.";

const MAX_POLLS: usize = 10;
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// What a successful generation hands back. The URL is ephemeral by contract:
/// it must go through the transfer engine before any record references it.
#[derive(Debug, Clone)]
pub struct GeneratedSketch {
    pub url: String,
    /// Set when prompt translation fell back to the original text.
    pub warning: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Extracted {
    /// A URL usable as-is.
    Url(String),
    /// A prediction handle whose `get` endpoint yields the final output.
    Handle(String),
}

type Strategy = fn(&Value) -> Option<Extracted>;

// Tried in order; first hit wins.
const STRATEGIES: &[(&str, Strategy)] = &[
    ("direct", extract_direct),
    ("handle", extract_handle),
    ("url-field", extract_url_field),
];

pub struct SketchGenerator {
    http: Client,
    config: GenerationConfig,
    translator: Translator,
}

impl SketchGenerator {
    pub fn new(http: Client, config: GenerationConfig, translator: Translator) -> Self {
        Self {
            http,
            config,
            translator,
        }
    }

    pub async fn generate(&self, prompt: &str) -> Result<GeneratedSketch, ImageError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(ImageError::Validation("prompt is empty".to_string()));
        }
        let translated = self.translator.to_english(prompt).await;
        let styled = format!("{}{STYLE_SUFFIX}", translated.text);
        debug!("generating sketch: {styled}");

        let endpoint = format!(
            "{}/v1/models/{}/predictions",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model
        );
        let response = self
            .http
            .post(endpoint)
            .bearer_auth(&self.config.api_token)
            .header("Prefer", "wait")
            .timeout(Duration::from_secs(self.config.timeout_s.max(1)))
            .json(&json!({
                "input": {
                    "prompt": styled,
                    "num_outputs": 1,
                    "aspect_ratio": "1:1",
                    "output_format": "webp",
                }
            }))
            .send()
            .await
            .map_err(|err| ImageError::Generation(err.to_string()))?;
        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            return Err(ImageError::Generation(format!(
                "generation backend returned {status}: {body}"
            )));
        }

        let url = match extract_output(&body) {
            Some(Extracted::Url(url)) => url,
            Some(Extracted::Handle(get_url)) => self.poll_for_output(&get_url).await?,
            None => {
                return Err(ImageError::Generation(format!(
                    "no extraction strategy matched output: {body}"
                )))
            }
        };
        Ok(GeneratedSketch {
            url,
            warning: translated.warning,
        })
    }

    async fn poll_for_output(&self, get_url: &str) -> Result<String, ImageError> {
        for _ in 0..MAX_POLLS {
            let response = self
                .http
                .get(get_url)
                .bearer_auth(&self.config.api_token)
                .send()
                .await
                .map_err(|err| ImageError::Generation(err.to_string()))?;
            let body: Value = response
                .json()
                .await
                .map_err(|err| ImageError::Generation(err.to_string()))?;
            match body.get("status").and_then(Value::as_str) {
                Some("succeeded") => {
                    return match extract_output(&body) {
                        Some(Extracted::Url(url)) => Ok(url),
                        _ => Err(ImageError::Generation(format!(
                            "prediction succeeded without extractable output: {body}"
                        ))),
                    };
                }
                Some("failed") | Some("canceled") => {
                    let detail = body
                        .get("error")
                        .and_then(Value::as_str)
                        .unwrap_or("no detail");
                    return Err(ImageError::Generation(format!(
                        "prediction did not succeed: {detail}"
                    )));
                }
                _ => tokio::time::sleep(POLL_INTERVAL).await,
            }
        }
        Err(ImageError::Generation(
            "timed out waiting for prediction output".to_string(),
        ))
    }
}

fn extract_output(body: &Value) -> Option<Extracted> {
    for (name, strategy) in STRATEGIES {
        if let Some(extracted) = strategy(body) {
            debug!("output extracted via {name} strategy");
            return Some(extracted);
        }
    }
    None
}

// `output` is a string, or a list whose first element is a string.
fn extract_direct(body: &Value) -> Option<Extracted> {
    let output = body.get("output")?;
    let candidate = match output {
        Value::String(text) => Some(text.as_str()),
        Value::Array(items) => items.first().and_then(Value::as_str),
        _ => None,
    }?;
    let trimmed = candidate.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(Extracted::Url(trimmed.to_string()))
    }
}

// No usable `output`, but the response is a handle carrying `urls.get`.
fn extract_handle(body: &Value) -> Option<Extracted> {
    let get_url = body.get("urls")?.get("get")?.as_str()?;
    if get_url.trim().is_empty() {
        return None;
    }
    Some(Extracted::Handle(get_url.to_string()))
}

// `output` (or its first element) is an object with a string `url` field.
fn extract_url_field(body: &Value) -> Option<Extracted> {
    let output = body.get("output")?;
    let object = match output {
        Value::Object(_) => Some(output),
        Value::Array(items) => items.first(),
        _ => None,
    }?;
    let url = object.get("url")?.as_str()?.trim();
    if url.is_empty() {
        None
    } else {
        Some(Extracted::Url(url.to_string()))
    }
}
