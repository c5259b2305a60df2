// Offline reconciliation over every image-bearing record: anything not yet
// in our bucket gets transferred, batch by batch. One record's failure never
// aborts the run; a failed record simply stays eligible for the next run.
use crate::images::{ImageSource, TransferEngine, UrlClass};
use crate::storage::{ImageRecordRef, RecordStore};
use anyhow::Result;
use futures::future::join_all;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone)]
pub struct MigrationOptions {
    /// Records transferred concurrently per batch. Batches run sequentially,
    /// so this is the job's only backpressure knob.
    pub batch_size: usize,
    pub dry_run: bool,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            batch_size: 10,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Migrated,
    Skipped,
    Failed,
}

#[derive(Debug, Clone)]
pub struct RecordOutcome {
    pub record: ImageRecordRef,
    pub outcome: Outcome,
    pub detail: Option<String>,
}

#[derive(Debug)]
pub struct MigrationReport {
    pub outcomes: Vec<RecordOutcome>,
    pub migrated: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl MigrationReport {
    fn from_outcomes(outcomes: Vec<RecordOutcome>) -> Self {
        let mut migrated = 0;
        let mut skipped = 0;
        let mut failed = 0;
        for entry in &outcomes {
            match entry.outcome {
                Outcome::Migrated => migrated += 1,
                Outcome::Skipped => skipped += 1,
                Outcome::Failed => failed += 1,
            }
        }
        Self {
            outcomes,
            migrated,
            skipped,
            failed,
        }
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &RecordOutcome> {
        self.outcomes
            .iter()
            .filter(|entry| entry.outcome == Outcome::Failed)
    }
}

pub async fn run_migration(
    records: Arc<dyn RecordStore>,
    engine: Arc<TransferEngine>,
    options: &MigrationOptions,
) -> Result<MigrationReport> {
    let all = records.list_image_records()?;
    info!("checking {} image records", all.len());

    let mut outcomes = Vec::with_capacity(all.len());
    let mut candidates = Vec::new();
    for record in all {
        match engine.classifier().classify(&record.image_url) {
            UrlClass::StoragePersisted => outcomes.push(RecordOutcome {
                record,
                outcome: Outcome::Skipped,
                detail: None,
            }),
            // Unknown is conservatively migrated: an unrecognized URL may
            // still be short-lived.
            UrlClass::GeneratedEphemeral | UrlClass::Unknown => candidates.push(record),
        }
    }
    info!(
        "{} already persisted, {} to migrate",
        outcomes.len(),
        candidates.len()
    );

    if options.dry_run {
        for record in candidates {
            outcomes.push(RecordOutcome {
                record,
                outcome: Outcome::Skipped,
                detail: Some("dry run, would migrate".to_string()),
            });
        }
        return Ok(MigrationReport::from_outcomes(outcomes));
    }

    let batch_size = options.batch_size.max(1);
    let total_batches = candidates.len().div_ceil(batch_size);
    for (index, batch) in candidates.chunks(batch_size).enumerate() {
        info!("batch {}/{total_batches}", index + 1);
        let results = join_all(
            batch
                .iter()
                .map(|record| migrate_record(records.as_ref(), &engine, record)),
        )
        .await;
        outcomes.extend(results);
    }

    Ok(MigrationReport::from_outcomes(outcomes))
}

async fn migrate_record(
    records: &dyn RecordStore,
    engine: &TransferEngine,
    record: &ImageRecordRef,
) -> RecordOutcome {
    let stored_url = match engine
        .persist(
            ImageSource::Remote(record.image_url.clone()),
            &record.owner_id,
        )
        .await
    {
        Ok(url) => url,
        Err(err) => {
            return RecordOutcome {
                record: record.clone(),
                outcome: Outcome::Failed,
                detail: Some(err.to_string()),
            }
        }
    };
    if let Err(err) = records.update_image_url(record, &stored_url) {
        // The object was uploaded this round, so it is safe to take back.
        let mut detail = format!("record update failed: {err}");
        if let Some(warning) = engine.delete(&stored_url).await.warning() {
            detail.push_str(&format!("; compensating delete failed: {warning}"));
        }
        return RecordOutcome {
            record: record.clone(),
            outcome: Outcome::Failed,
            detail: Some(detail),
        };
    }
    RecordOutcome {
        record: record.clone(),
        outcome: Outcome::Migrated,
        detail: Some(stored_url),
    }
}
