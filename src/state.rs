// Shared application state: every component is constructed once from the
// config and injected here.
use crate::auth::IdentityClient;
use crate::config::Config;
use crate::images::{
    BucketClient, IconCatalog, SketchGenerator, TransferEngine, Translator, UrlClassifier,
};
use crate::storage::{RecordStore, SqliteStore};
use anyhow::Result;
use reqwest::Client;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub records: Arc<dyn RecordStore>,
    pub engine: Arc<TransferEngine>,
    pub generator: Arc<SketchGenerator>,
    pub icons: IconCatalog,
    pub identity: IdentityClient,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let http = Client::new();
        let records: Arc<dyn RecordStore> =
            Arc::new(SqliteStore::new(config.records.db_path.clone()));
        records.ensure_initialized()?;

        let objects = Arc::new(BucketClient::new(http.clone(), &config.bucket));
        let classifier = UrlClassifier::new(&config.bucket, &config.generation);
        let engine = Arc::new(TransferEngine::new(http.clone(), objects, classifier));

        let translator = Translator::new(http.clone(), config.translation.clone());
        let generator = Arc::new(SketchGenerator::new(
            http.clone(),
            config.generation.clone(),
            translator,
        ));
        let icons = IconCatalog::new(http.clone(), &config.icons);
        let identity = IdentityClient::new(http, &config.auth);

        Ok(Self {
            config,
            records,
            engine,
            generator,
            icons,
            identity,
        })
    }
}
