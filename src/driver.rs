//! One enrichment run: read the catalogue, run the pipeline, write back,
//! then retire the checkpoint.

use chrono::{SecondsFormat, Utc};
use tracing::{error, info, warn};

use crate::catalogue::Catalogue;
use crate::checkpoint::CheckpointStore;
use crate::error::Error;
use crate::extract::RecordExtractor;
use crate::metrics::RunSummary;
use crate::payload;
use crate::pipeline::{Pipeline, PipelineOptions, RunOutcome};
use crate::store::TableStore;

#[derive(Debug, Clone)]
pub struct RunPlan {
    pub identifier_column: String,
    pub options: PipelineOptions,
}

/// Runs one enrichment pass over `table`.
///
/// The checkpoint is removed only after the write has been issued (or when
/// there is nothing left to do). Any error returned before that leaves it in
/// place for the next run.
pub fn enrich<S, E, F>(
    store: &S,
    table: &str,
    checkpoint: &CheckpointStore,
    plan: &RunPlan,
    open: F,
) -> Result<RunSummary, Error>
where
    S: TableStore + ?Sized,
    E: RecordExtractor,
    F: FnOnce() -> Result<E, Error>,
{
    let mut summary = RunSummary::default();

    let records = store.fetch_all_rows(table)?;
    let catalogue = Catalogue::from_records(records, &plan.identifier_column);
    let identifiers = catalogue.identifiers();
    summary.catalogue_rows = catalogue.len();
    summary.identifiers = identifiers.len();
    if catalogue.is_empty() {
        warn!(table, "Catalogue is empty");
    } else if identifiers.is_empty() {
        warn!(
            table,
            rows = catalogue.len(),
            column = %plan.identifier_column,
            "No identifiers found in catalogue"
        );
    } else {
        info!(
            rows = catalogue.len(),
            with_identifier = catalogue.identified_rows(),
            unique = identifiers.len(),
            "Catalogue loaded"
        );
    }

    let done = checkpoint.load()?;
    summary.already_done = identifiers.iter().filter(|id| done.contains(*id)).count();

    let attempts = match Pipeline::new(checkpoint, done, plan.options).run(&identifiers, open)? {
        RunOutcome::NothingToDo => {
            checkpoint.clear()?;
            info!("All identifiers already processed; stale checkpoint cleared");
            return Ok(summary);
        }
        RunOutcome::Completed(attempts) => attempts,
    };
    summary.record_attempts(&attempts);

    let enriched_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    let rows = payload::build(&attempts, &catalogue, &enriched_at);
    info!(
        identifiers = attempts.len(),
        rows = rows.len(),
        "Writing enrichment results"
    );
    let report = store.batch_upsert(table, &rows);
    summary.record_write(&report);
    if report.success() {
        info!(rows = report.rows_written, chunks = report.chunks, "Store updated");
    } else {
        error!(
            failed = report.failed_chunks,
            chunks = report.chunks,
            "Some chunks were not written"
        );
    }

    checkpoint.clear()?;
    info!(path = %checkpoint.path().display(), "Run complete; checkpoint removed");
    Ok(summary)
}
