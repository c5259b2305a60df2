#![allow(dead_code)]
// Shared fixtures: an in-memory object store, fake upstream services bound to
// ephemeral ports, and a fully wired AppState over a temp database.
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::extract::Query;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use pictora_server::auth::IdentityClient;
use pictora_server::config::Config;
use pictora_server::images::{
    IconCatalog, ObjectStore, SketchGenerator, TransferEngine, Translator, UrlClassifier,
};
use pictora_server::state::AppState;
use pictora_server::storage::{
    CategoryRecord, ImageRecordRef, ItemChanges, ItemRecord, NewItem, RecordStore, SketchRecord,
    SqliteStore,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const BUCKET_ENDPOINT: &str = "https://bucket.test";

pub fn test_config(db_path: &str) -> Config {
    let mut config = Config::default();
    config.records.db_path = db_path.to_string();
    config.bucket.endpoint = BUCKET_ENDPOINT.to_string();
    config.bucket.service_key = "service-key".to_string();
    config
}

// ---------------------------------------------------------------------------
// In-memory object store

pub struct MemoryObjectStore {
    pub objects: Mutex<HashMap<String, (String, usize)>>,
    pub upload_calls: AtomicUsize,
    fail_uploads: AtomicBool,
    prefix: String,
}

impl MemoryObjectStore {
    pub fn new(config: &Config) -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            upload_calls: AtomicUsize::new(0),
            fail_uploads: AtomicBool::new(false),
            prefix: config.bucket.public_prefix(),
        }
    }

    pub fn set_fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.objects.lock().unwrap().contains_key(path)
    }

    pub fn uploads(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(&self, path: &str, bytes: Bytes, content_type: &str) -> Result<()> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(anyhow!("upload rejected: 503 backend unavailable"));
        }
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(path) {
            return Err(anyhow!("object already exists at {path}"));
        }
        objects.insert(path.to_string(), (content_type.to_string(), bytes.len()));
        Ok(())
    }

    async fn remove(&self, paths: &[String]) -> Result<()> {
        let mut objects = self.objects.lock().unwrap();
        for path in paths {
            objects.remove(path);
        }
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}{}", self.prefix, path)
    }
}

// ---------------------------------------------------------------------------
// Record store wrapper with injectable failures

pub struct FailingRecordStore {
    inner: Arc<dyn RecordStore>,
    pub fail_sketch_inserts: AtomicBool,
    pub fail_image_updates: AtomicBool,
}

impl FailingRecordStore {
    pub fn new(inner: Arc<dyn RecordStore>) -> Self {
        Self {
            inner,
            fail_sketch_inserts: AtomicBool::new(false),
            fail_image_updates: AtomicBool::new(false),
        }
    }
}

impl RecordStore for FailingRecordStore {
    fn ensure_initialized(&self) -> Result<()> {
        self.inner.ensure_initialized()
    }

    fn list_categories(&self, owner_id: &str) -> Result<Vec<CategoryRecord>> {
        self.inner.list_categories(owner_id)
    }

    fn get_category(&self, owner_id: &str, id: &str) -> Result<Option<CategoryRecord>> {
        self.inner.get_category(owner_id, id)
    }

    fn find_category_by_name(&self, owner_id: &str, name: &str) -> Result<Option<CategoryRecord>> {
        self.inner.find_category_by_name(owner_id, name)
    }

    fn insert_category(&self, owner_id: &str, name: &str) -> Result<Option<CategoryRecord>> {
        self.inner.insert_category(owner_id, name)
    }

    fn delete_category(&self, owner_id: &str, id: &str) -> Result<bool> {
        self.inner.delete_category(owner_id, id)
    }

    fn list_items(&self, owner_id: &str, category_id: Option<&str>) -> Result<Vec<ItemRecord>> {
        self.inner.list_items(owner_id, category_id)
    }

    fn get_item(&self, owner_id: &str, id: &str) -> Result<Option<ItemRecord>> {
        self.inner.get_item(owner_id, id)
    }

    fn insert_item(&self, item: NewItem) -> Result<ItemRecord> {
        self.inner.insert_item(item)
    }

    fn update_item(
        &self,
        owner_id: &str,
        id: &str,
        changes: ItemChanges,
    ) -> Result<Option<ItemRecord>> {
        self.inner.update_item(owner_id, id, changes)
    }

    fn delete_item(&self, owner_id: &str, id: &str) -> Result<bool> {
        self.inner.delete_item(owner_id, id)
    }

    fn list_sketches(&self, owner_id: &str) -> Result<Vec<SketchRecord>> {
        self.inner.list_sketches(owner_id)
    }

    fn get_sketch(&self, id: &str) -> Result<Option<SketchRecord>> {
        self.inner.get_sketch(id)
    }

    fn insert_sketch(
        &self,
        owner_id: &str,
        prompt: &str,
        image_url: &str,
    ) -> Result<SketchRecord> {
        if self.fail_sketch_inserts.load(Ordering::SeqCst) {
            return Err(anyhow!("database is read-only"));
        }
        self.inner.insert_sketch(owner_id, prompt, image_url)
    }

    fn delete_sketch(&self, id: &str) -> Result<bool> {
        self.inner.delete_sketch(id)
    }

    fn list_image_records(&self) -> Result<Vec<ImageRecordRef>> {
        self.inner.list_image_records()
    }

    fn update_image_url(&self, record: &ImageRecordRef, url: &str) -> Result<()> {
        if self.fail_image_updates.load(Ordering::SeqCst) {
            return Err(anyhow!("database is read-only"));
        }
        self.inner.update_image_url(record, url)
    }
}

// ---------------------------------------------------------------------------
// Fake upstream services

pub async fn spawn_http(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

pub struct SourceServer {
    pub base: String,
    pub hits: Arc<AtomicUsize>,
}

impl SourceServer {
    pub fn image_url(&self, tag: &str) -> String {
        format!("{}/img.webp?tag={tag}", self.base)
    }

    pub fn missing_url(&self, tag: &str) -> String {
        format!("{}/missing.webp?tag={tag}", self.base)
    }

    pub fn fetches(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

/// Serves image bytes the way an external delivery host would.
pub async fn spawn_source_server() -> SourceServer {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let router = Router::new()
        .route(
            "/img.webp",
            get(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    ([("content-type", "image/webp")], Bytes::from_static(b"RIFFxxxxWEBPVP8 "))
                }
            }),
        )
        .route(
            "/img.png",
            get(|| async {
                (
                    [("content-type", "image/png")],
                    Bytes::from_static(&[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a]),
                )
            }),
        )
        .route(
            "/huge.webp",
            get(|| async {
                (
                    [("content-type", "image/webp")],
                    Bytes::from(vec![0u8; 6 * 1024 * 1024]),
                )
            }),
        )
        .route(
            "/text.html",
            get(|| async { ([("content-type", "text/html")], "<html></html>") }),
        )
        .route(
            "/missing.webp",
            get(|| async { StatusCode::NOT_FOUND.into_response() }),
        );
    let base = spawn_http(router).await;
    SourceServer { base, hits }
}

/// Identity provider double: `Bearer tok-<id>` resolves to owner `<id>`.
pub async fn spawn_identity_server() -> String {
    let router = Router::new().route(
        "/auth/v1/user",
        get(|headers: HeaderMap| async move {
            let token = headers
                .get(AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.strip_prefix("Bearer "))
                .unwrap_or("");
            match token.strip_prefix("tok-") {
                Some(id) if !id.is_empty() => Json(json!({
                    "id": id,
                    "email": format!("{id}@example.com"),
                }))
                .into_response(),
                _ => StatusCode::UNAUTHORIZED.into_response(),
            }
        }),
    );
    spawn_http(router).await
}

pub struct GenerationServer {
    pub base: String,
    pub prompts: Arc<Mutex<Vec<String>>>,
}

/// Generation backend double: records the submitted prompt and answers with
/// the configured output payload.
pub async fn spawn_generation_server(output: Value) -> GenerationServer {
    let prompts = Arc::new(Mutex::new(Vec::new()));
    let seen = prompts.clone();
    let router = Router::new().route(
        "/v1/models/{*model}",
        post(move |Json(body): Json<Value>| {
            let seen = seen.clone();
            let output = output.clone();
            async move {
                if let Some(prompt) = body
                    .get("input")
                    .and_then(|input| input.get("prompt"))
                    .and_then(Value::as_str)
                {
                    seen.lock().unwrap().push(prompt.to_string());
                }
                Json(output)
            }
        }),
    );
    let base = spawn_http(router).await;
    GenerationServer { base, prompts }
}

/// Translation backend double: any Korean query comes back as "red bag".
pub async fn spawn_translation_server() -> String {
    #[derive(serde::Deserialize)]
    struct TranslateQuery {
        q: String,
    }
    let router = Router::new().route(
        "/translate_a/single",
        get(|Query(query): Query<TranslateQuery>| async move {
            Json(json!([[["red bag", query.q, null]], null, "ko"]))
        }),
    );
    spawn_http(router).await
}

/// Icon API double with a single known icon.
pub async fn spawn_icon_server() -> String {
    let router = Router::new()
        .route(
            "/search",
            get(|| async { Json(json!({ "icons": ["mdi:laptop"], "total": 1 })) }),
        )
        .route(
            "/mdi.json",
            get(|| async {
                Json(json!({
                    "icons": { "laptop": { "body": "<path d=\"M4 6h16\"/>" } },
                    "width": 24,
                    "height": 24,
                }))
            }),
        );
    spawn_http(router).await
}

// ---------------------------------------------------------------------------
// Wired-up environment

pub struct TestEnv {
    pub state: Arc<AppState>,
    pub store: Arc<MemoryObjectStore>,
    pub records: Arc<FailingRecordStore>,
    pub source: SourceServer,
    pub generation: GenerationServer,
    pub config: Config,
    _db_dir: tempfile::TempDir,
}

pub async fn build_env() -> TestEnv {
    let db_dir = tempfile::tempdir().unwrap();
    let db_path = db_dir.path().join("records.db");
    let mut config = test_config(&db_path.to_string_lossy());

    let source = spawn_source_server().await;
    let generation_output = json!({ "output": [source.image_url("generated")] });
    let generation = spawn_generation_server(generation_output).await;
    config.generation.endpoint = generation.base.clone();
    config.generation.api_token = "test-token".to_string();
    // The fake delivery host must classify as ephemeral for the flow tests.
    config.generation.delivery_hosts = vec!["127.0.0.1".to_string()];
    config.translation.endpoint = spawn_translation_server().await;
    config.icons.endpoint = spawn_icon_server().await;
    config.auth.endpoint = spawn_identity_server().await;

    let records = Arc::new(FailingRecordStore::new(Arc::new(SqliteStore::new(
        db_path.to_string_lossy().to_string(),
    ))));
    records.ensure_initialized().unwrap();

    let store = Arc::new(MemoryObjectStore::new(&config));
    let http = reqwest::Client::new();
    let classifier = UrlClassifier::new(&config.bucket, &config.generation);
    let engine = Arc::new(TransferEngine::new(
        http.clone(),
        store.clone(),
        classifier,
    ));
    let translator = Translator::new(http.clone(), config.translation.clone());
    let generator = Arc::new(SketchGenerator::new(
        http.clone(),
        config.generation.clone(),
        translator,
    ));
    let icons = IconCatalog::new(http.clone(), &config.icons);
    let identity = IdentityClient::new(http, &config.auth);

    let record_store: Arc<dyn RecordStore> = records.clone();
    let state = Arc::new(AppState {
        config: config.clone(),
        records: record_store,
        engine,
        generator,
        icons,
        identity,
    });

    TestEnv {
        state,
        store,
        records,
        source,
        generation,
        config,
        _db_dir: db_dir,
    }
}
