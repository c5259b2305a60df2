// One-shot migration of legacy image URLs into the storage bucket.
//
// Requires a privileged storage credential from the environment, which is
// why it is a separate binary rather than a server endpoint:
//   PICTORA_BUCKET_ENDPOINT  storage endpoint, e.g. https://abc.supabase.co
//   PICTORA_SERVICE_KEY      service-role credential for the bucket
//
// Exits non-zero when any record fails to migrate, so a scheduler can alert.
// Run one instance at a time; concurrent runs are unsupported.
use anyhow::Result;
use clap::Parser;
use pictora_server::config::load_config;
use pictora_server::images::{BucketClient, TransferEngine, UrlClassifier};
use pictora_server::migrate::{run_migration, MigrationOptions, MigrationReport};
use pictora_server::storage::{RecordStore, SqliteStore};
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "migrate-images",
    about = "Move legacy image URLs into the storage bucket"
)]
struct Args {
    /// Records transferred concurrently per batch.
    #[arg(long, default_value_t = 10)]
    batch_size: usize,
    /// Classify and report only; transfer nothing.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    match run(args).await {
        Ok(report) => {
            print_summary(&report);
            if report.has_failures() {
                std::process::exit(1);
            }
        }
        Err(err) => {
            eprintln!("migration aborted: {err}");
            std::process::exit(1);
        }
    }
}

async fn run(args: Args) -> Result<MigrationReport> {
    let endpoint = required_env("PICTORA_BUCKET_ENDPOINT");
    let service_key = required_env("PICTORA_SERVICE_KEY");
    let (Some(endpoint), Some(service_key)) = (endpoint, service_key) else {
        eprintln!("missing required environment values:");
        eprintln!("  - PICTORA_BUCKET_ENDPOINT");
        eprintln!("  - PICTORA_SERVICE_KEY");
        std::process::exit(1);
    };

    let mut config = load_config();
    config.bucket.endpoint = endpoint;
    config.bucket.service_key = service_key;

    let records: Arc<dyn RecordStore> = Arc::new(SqliteStore::new(config.records.db_path.clone()));
    records.ensure_initialized()?;

    let http = reqwest::Client::new();
    let objects = Arc::new(BucketClient::new(http.clone(), &config.bucket));
    let classifier = UrlClassifier::new(&config.bucket, &config.generation);
    let engine = Arc::new(TransferEngine::new(http, objects, classifier));

    let options = MigrationOptions {
        batch_size: args.batch_size,
        dry_run: args.dry_run,
    };
    run_migration(records, engine, &options).await
}

fn required_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn print_summary(report: &MigrationReport) {
    println!("migration finished");
    println!("  migrated: {}", report.migrated);
    println!("  skipped:  {}", report.skipped);
    println!("  failed:   {}", report.failed);
    for failure in report.failures() {
        let detail = failure.detail.as_deref().unwrap_or("no detail");
        println!(
            "  failed {} {}: {detail}",
            failure.record.kind.as_str(),
            failure.record.id
        );
    }
}
