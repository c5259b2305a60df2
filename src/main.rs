use anyhow::Result;
use axum::http::{HeaderValue, Method};
use pictora_server::api;
use pictora_server::config::{load_config, Config, CorsConfig};
use pictora_server::shutdown::shutdown_signal;
use pictora_server::state::AppState;
use std::sync::Arc;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config: Config = load_config();
    init_tracing(&config);
    let state = Arc::new(AppState::new(config.clone())?);

    let app = api::build_router(state.clone())
        .layer(build_cors(&config.cors))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = bind_address(&config);
    let listener = tokio::net::TcpListener::bind(addr.as_str()).await?;
    info!("pictora server listening on http://{addr}");

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());
    if let Err(err) = server.await {
        warn!("server exited with error: {err}");
    }
    Ok(())
}

fn init_tracing(config: &Config) {
    let default_level = config.observability.log_level.trim();
    let default_level = if default_level.is_empty() {
        "info".to_string()
    } else {
        default_level.to_lowercase()
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn bind_address(config: &Config) -> String {
    // Env overrides keep container deployments simple.
    let host = std::env::var("PICTORA_HOST").unwrap_or_else(|_| config.server.host.clone());
    let port = std::env::var("PICTORA_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(config.server.port);
    format!("{host}:{port}")
}

fn build_cors(config: &CorsConfig) -> CorsLayer {
    fn parsed<T: std::str::FromStr>(values: &[String]) -> Vec<T> {
        values.iter().filter_map(|value| value.parse().ok()).collect()
    }
    fn is_wildcard(values: &Option<Vec<String>>) -> bool {
        values
            .as_ref()
            .is_none_or(|list| list.iter().any(|value| value == "*"))
    }

    let mut cors = CorsLayer::new();
    cors = if is_wildcard(&config.allow_origins) {
        cors.allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = parsed(config.allow_origins.as_deref().unwrap_or(&[]));
        cors.allow_origin(AllowOrigin::list(origins))
    };
    cors = if is_wildcard(&config.allow_methods) {
        cors.allow_methods(Any)
    } else {
        let methods: Vec<Method> = parsed(config.allow_methods.as_deref().unwrap_or(&[]));
        cors.allow_methods(AllowMethods::list(methods))
    };
    cors = if is_wildcard(&config.allow_headers) {
        cors.allow_headers(Any)
    } else {
        let headers = parsed(config.allow_headers.as_deref().unwrap_or(&[]));
        cors.allow_headers(AllowHeaders::list(headers))
    };
    if config.allow_credentials.unwrap_or(false) {
        cors = cors.allow_credentials(true);
    }
    cors
}
