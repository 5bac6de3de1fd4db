//! Two-pass, checkpointed enrichment.
//!
//! Pass 1 tries every pending identifier once, in input order. Identifiers
//! that fault (or come back without a title) are tried once more in pass 2.
//! An identifier joins the checkpoint as soon as its pass-1 attempt ends,
//! whatever the result, and is not re-added in pass 2. An identifier that
//! fails both passes and is then lost to a crash before the write goes out
//! stays in the checkpoint and is not retried on resume.

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error, info, warn};

use crate::catalogue::Identifier;
use crate::checkpoint::{CheckpointSet, CheckpointStore};
use crate::error::{CheckpointError, Error, ExtractionFault};
use crate::extract::{ExtractionResult, ProductRecord, RecordExtractor, Session};

/// Final verdict for one identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnrichmentOutcome {
    Success,
    SuccessOnRetry,
    NotFound,
    ScrapeFailed,
}

impl EnrichmentOutcome {
    /// Value written to the enrichment status column.
    pub fn label(self) -> &'static str {
        match self {
            EnrichmentOutcome::Success => "Success",
            EnrichmentOutcome::SuccessOnRetry => "Success (on retry)",
            EnrichmentOutcome::NotFound => "ASIN Not Found",
            EnrichmentOutcome::ScrapeFailed => "Scrape Failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    pub identifier: Identifier,
    pub outcome: EnrichmentOutcome,
    /// Present for successful outcomes only.
    pub record: Option<ProductRecord>,
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    /// First `limit` pending identifiers only; 0 = all.
    pub limit: usize,
    /// Persist the checkpoint after this many pass-1 attempts.
    pub save_every: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            limit: 0,
            save_every: 50,
        }
    }
}

#[derive(Debug)]
pub enum RunOutcome {
    /// Every identifier is already in the checkpoint (or there were none).
    NothingToDo,
    /// Attempts in order: all pass-1 verdicts, then pass-2 verdicts.
    Completed(Vec<Attempt>),
}

pub struct Pipeline<'a> {
    checkpoint: &'a CheckpointStore,
    done: CheckpointSet,
    options: PipelineOptions,
}

impl<'a> Pipeline<'a> {
    pub fn new(checkpoint: &'a CheckpointStore, done: CheckpointSet, options: PipelineOptions) -> Self {
        Pipeline {
            checkpoint,
            done,
            options,
        }
    }

    /// Identifiers not yet in the checkpoint, in input order, capped.
    pub fn pending(&self, identifiers: &[Identifier]) -> Vec<Identifier> {
        let remaining = identifiers
            .iter()
            .filter(|id| !self.done.contains(id.as_str()))
            .cloned();
        match self.options.limit {
            0 => remaining.collect(),
            n => remaining.take(n).collect(),
        }
    }

    /// Runs both passes. `open` is called at most once, and only when there
    /// is work; the extractor it returns is released on every exit path.
    pub fn run<E, F>(self, identifiers: &[Identifier], open: F) -> Result<RunOutcome, Error>
    where
        E: RecordExtractor,
        F: FnOnce() -> Result<E, Error>,
    {
        let pending = self.pending(identifiers);
        if pending.is_empty() {
            info!(
                already_done = self.done.len(),
                "No pending identifiers; nothing to do"
            );
            return Ok(RunOutcome::NothingToDo);
        }
        if self.options.limit > 0 {
            info!(limit = self.options.limit, "Limiting run to the first items");
        }
        info!(
            pending = pending.len(),
            skipped = self.done.len(),
            "Processing listings"
        );

        let mut progress = Progress::new(self.checkpoint, self.done, self.options.save_every);
        let mut session = Session::new(open()?);

        let mut attempts = Vec::with_capacity(pending.len());
        let retry = first_pass(&mut *session, &pending, &mut progress, &mut attempts)?;
        if !retry.is_empty() {
            retry_pass(&mut *session, &retry, &mut attempts);
        }

        drop(session);
        progress.finish()?;
        Ok(RunOutcome::Completed(attempts))
    }
}

/// Checkpoint set being grown by pass 1. Saved every `save_every` marks, on
/// `finish`, and on drop if `finish` was never reached.
struct Progress<'a> {
    store: &'a CheckpointStore,
    done: CheckpointSet,
    marked: usize,
    save_every: usize,
    finished: bool,
}

impl<'a> Progress<'a> {
    fn new(store: &'a CheckpointStore, done: CheckpointSet, save_every: usize) -> Self {
        Progress {
            store,
            done,
            marked: 0,
            save_every: save_every.max(1),
            finished: false,
        }
    }

    fn mark(&mut self, identifier: &str) -> Result<(), CheckpointError> {
        self.done.insert(identifier.to_string());
        self.marked += 1;
        if self.marked % self.save_every == 0 {
            self.store.save(&self.done)?;
            info!(
                processed = self.marked,
                total = self.done.len(),
                "Checkpoint saved"
            );
        }
        Ok(())
    }

    fn finish(mut self) -> Result<(), CheckpointError> {
        self.finished = true;
        self.store.save(&self.done)
    }
}

impl Drop for Progress<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        match self.store.save(&self.done) {
            Ok(()) => warn!(
                total = self.done.len(),
                "Run interrupted; checkpoint saved for resume"
            ),
            Err(e) => error!(error = %e, "Run interrupted and checkpoint could not be saved"),
        }
    }
}

/// `Ok(Some)` for a titled page, `Ok(None)` for not-found.
fn attempt<E: RecordExtractor>(
    extractor: &mut E,
    identifier: &str,
) -> Result<Option<ProductRecord>, ExtractionFault> {
    match extractor.extract(identifier)? {
        ExtractionResult::NotFound { .. } => Ok(None),
        ExtractionResult::Found { record, .. } if record.title().is_some() => Ok(Some(record)),
        ExtractionResult::Found { .. } => Err(ExtractionFault::MissingTitle),
    }
}

fn first_pass<E: RecordExtractor>(
    extractor: &mut E,
    pending: &[Identifier],
    progress: &mut Progress<'_>,
    attempts: &mut Vec<Attempt>,
) -> Result<Vec<Identifier>, CheckpointError> {
    let total = pending.len();
    let pb = progress_bar(total, "pass 1");
    let mut retry = Vec::new();

    for (i, id) in pending.iter().enumerate() {
        debug!(pass = 1, asin = %id, "Scraping [{}/{}]", i + 1, total);
        match attempt(extractor, id) {
            Ok(Some(record)) => attempts.push(Attempt {
                identifier: id.clone(),
                outcome: EnrichmentOutcome::Success,
                record: Some(record),
            }),
            Ok(None) => attempts.push(Attempt {
                identifier: id.clone(),
                outcome: EnrichmentOutcome::NotFound,
                record: None,
            }),
            Err(fault) => {
                warn!(asin = %id, error = %fault, "Could not scrape on first pass; queued for retry");
                retry.push(id.clone());
            }
        }
        progress.mark(id)?;
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!(
        attempted = total,
        queued_for_retry = retry.len(),
        "First pass done"
    );
    Ok(retry)
}

fn retry_pass<E: RecordExtractor>(extractor: &mut E, retry: &[Identifier], attempts: &mut Vec<Attempt>) {
    let total = retry.len();
    info!(count = total, "Retrying failed identifiers");
    let pb = progress_bar(total, "pass 2");

    for (i, id) in retry.iter().enumerate() {
        debug!(pass = 2, asin = %id, "Scraping [{}/{}]", i + 1, total);
        let (outcome, record) = match attempt(extractor, id) {
            Ok(Some(record)) => (EnrichmentOutcome::SuccessOnRetry, Some(record)),
            Ok(None) => (EnrichmentOutcome::NotFound, None),
            Err(fault) => {
                error!(asin = %id, error = %fault, "Failed to scrape on second pass");
                (EnrichmentOutcome::ScrapeFailed, None)
            }
        };
        attempts.push(Attempt {
            identifier: id.clone(),
            outcome,
            record,
        });
        pb.inc(1);
    }

    pb.finish_and_clear();
}

fn progress_bar(len: usize, label: &'static str) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) =
        ProgressStyle::default_bar().template("{prefix} [{elapsed_precise}] {bar:40} {pos}/{len} (eta {eta})")
    {
        pb.set_style(style.progress_chars("=> "));
    }
    pb.set_prefix(label);
    pb
}
