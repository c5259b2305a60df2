// Best-effort Korean-to-English translation for generation prompts.
// Translation is an enhancement: every failure path falls back to the
// original text and surfaces as a warning, never an error.
use crate::config::TranslationConfig;
use regex::Regex;
use reqwest::Client;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct Translated {
    pub text: String,
    pub warning: Option<String>,
}

impl Translated {
    fn unchanged(text: &str) -> Self {
        Self {
            text: text.to_string(),
            warning: None,
        }
    }
}

#[derive(Clone)]
pub struct Translator {
    http: Client,
    config: TranslationConfig,
}

impl Translator {
    pub fn new(http: Client, config: TranslationConfig) -> Self {
        Self { http, config }
    }

    /// Translate Korean text to English. Text without Hangul passes through
    /// untouched.
    pub async fn to_english(&self, text: &str) -> Translated {
        if !self.config.enabled || !contains_hangul(text) {
            return Translated::unchanged(text);
        }
        match self.request_translation(text).await {
            Ok(translated) if !translated.trim().is_empty() => Translated {
                text: translated,
                warning: None,
            },
            Ok(_) => fallback(text, "translation returned empty text"),
            Err(reason) => fallback(text, &reason),
        }
    }

    async fn request_translation(&self, text: &str) -> Result<String, String> {
        let endpoint = format!(
            "{}/translate_a/single",
            self.config.endpoint.trim_end_matches('/')
        );
        let response = self
            .http
            .get(endpoint)
            .query(&[
                ("client", "gtx"),
                ("sl", "ko"),
                ("tl", "en"),
                ("dt", "t"),
                ("q", text),
            ])
            .send()
            .await
            .map_err(|err| err.to_string())?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("translation backend returned {status}"));
        }
        let body: Value = response.json().await.map_err(|err| err.to_string())?;
        extract_translation(&body).ok_or_else(|| "unexpected translation payload".to_string())
    }
}

fn fallback(text: &str, reason: &str) -> Translated {
    warn!("prompt translation failed, using original text: {reason}");
    Translated {
        text: text.to_string(),
        warning: Some(reason.to_string()),
    }
}

pub fn contains_hangul(text: &str) -> bool {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX
        .get_or_init(|| Regex::new("[가-힣]").expect("invalid hangul regex"))
        .is_match(text)
}

// The backend answers `[[["translated","original",...],...],...]`; the
// first-level array carries one segment per source sentence.
fn extract_translation(body: &Value) -> Option<String> {
    let segments = body.get(0)?.as_array()?;
    let mut output = String::new();
    for segment in segments {
        if let Some(piece) = segment.get(0).and_then(Value::as_str) {
            output.push_str(piece);
        }
    }
    if output.trim().is_empty() {
        None
    } else {
        Some(output)
    }
}
