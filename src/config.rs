// Configuration: one struct built at process start and passed into every
// component constructor. No ambient env lookups inside core logic.
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::env;
use std::fs;
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub bucket: BucketConfig,
    #[serde(default)]
    pub records: RecordsConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub translation: TranslationConfig,
    #[serde(default)]
    pub icons: IconsConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CorsConfig {
    pub allow_origins: Option<Vec<String>>,
    pub allow_methods: Option<Vec<String>>,
    pub allow_headers: Option<Vec<String>>,
    pub allow_credentials: Option<bool>,
}

// Identity provider. Tokens are verified by the provider, never locally.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub anon_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketConfig {
    pub endpoint: String,
    pub name: String,
    pub service_key: String,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            name: "custom-pictograms".to_string(),
            service_key: String::new(),
        }
    }
}

impl BucketConfig {
    /// Prefix of every public object URL served from this deployment's
    /// bucket. Classification and path extraction both key off this string.
    pub fn public_prefix(&self) -> String {
        format!(
            "{}/storage/v1/object/public/{}/",
            self.endpoint.trim_end_matches('/'),
            self.name
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordsConfig {
    pub db_path: String,
}

impl Default for RecordsConfig {
    fn default() -> Self {
        Self {
            db_path: "./data/pictora.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub endpoint: String,
    pub model: String,
    pub api_token: String,
    pub timeout_s: u64,
    /// Hosts whose URLs are known to expire shortly after generation.
    #[serde(default = "default_delivery_hosts")]
    pub delivery_hosts: Vec<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.replicate.com".to_string(),
            model: "black-forest-labs/flux-schnell".to_string(),
            api_token: String::new(),
            timeout_s: 60,
            delivery_hosts: default_delivery_hosts(),
        }
    }
}

fn default_delivery_hosts() -> Vec<String> {
    vec!["replicate.delivery".to_string()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationConfig {
    pub endpoint: String,
    pub enabled: bool,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://translate.googleapis.com".to_string(),
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IconsConfig {
    pub endpoint: String,
    #[serde(default = "default_icon_collections")]
    pub collections: Vec<String>,
}

impl Default for IconsConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.iconify.design".to_string(),
            collections: default_icon_collections(),
        }
    }
}

fn default_icon_collections() -> Vec<String> {
    ["mdi", "heroicons", "lucide", "carbon", "tabler"]
        .iter()
        .map(|prefix| prefix.to_string())
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub log_level: String,
}

pub fn load_config() -> Config {
    let path =
        env::var("PICTORA_CONFIG_PATH").unwrap_or_else(|_| "config/pictora.yaml".to_string());
    let mut value = read_yaml(&path);
    expand_yaml_env(&mut value);
    serde_yaml::from_value::<Config>(value).unwrap_or_else(|err| {
        warn!("failed to parse config, falling back to defaults: {err}");
        Config::default()
    })
}

fn read_yaml(path: &str) -> Value {
    // The config file is allowed to be absent so a fresh checkout can boot.
    let content = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) => {
            warn!("failed to read config {path}: {err}");
            return Value::Null;
        }
    };
    serde_yaml::from_str(&content).unwrap_or_else(|err| {
        warn!("failed to parse yaml {path}: {err}");
        Value::Null
    })
}

fn expand_yaml_env(value: &mut Value) {
    match value {
        Value::String(text) => {
            *text = expand_env_placeholders(text);
        }
        Value::Sequence(items) => {
            for item in items {
                expand_yaml_env(item);
            }
        }
        Value::Mapping(map) => {
            for (_, value) in map.iter_mut() {
                expand_yaml_env(value);
            }
        }
        _ => {}
    }
}

// `${NAME}` and `${NAME:-default}` substitution inside string values.
fn expand_env_placeholders(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        rest = &rest[start + 2..];
        let Some(end) = rest.find('}') else {
            output.push_str("${");
            output.push_str(rest);
            return output;
        };
        let inner = &rest[..end];
        rest = &rest[end + 1..];
        let (name, default_value) = match inner.split_once(":-") {
            Some((name, default_value)) => (name.trim(), Some(default_value)),
            None => (inner.trim(), None),
        };
        if name.is_empty() {
            output.push_str("${");
            output.push_str(inner);
            output.push('}');
            continue;
        }
        let resolved = env::var(name).ok().filter(|value| !value.is_empty());
        match (resolved, default_value) {
            (Some(value), _) => output.push_str(&value),
            (None, Some(default_value)) => output.push_str(default_value),
            (None, None) => {}
        }
    }
    output.push_str(rest);
    output
}
