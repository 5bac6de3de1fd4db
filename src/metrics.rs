use std::time::Duration;

use crate::pipeline::{Attempt, EnrichmentOutcome};
use crate::store::UpsertReport;

/// Per-run tallies, printed at the end of `run`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub catalogue_rows: usize,
    pub identifiers: usize,
    pub already_done: usize,
    pub success: usize,
    pub success_on_retry: usize,
    pub not_found: usize,
    pub scrape_failed: usize,
    pub rows_updated: usize,
    pub failed_chunks: usize,
}

impl RunSummary {
    pub fn record_attempts(&mut self, attempts: &[Attempt]) {
        for attempt in attempts {
            match attempt.outcome {
                EnrichmentOutcome::Success => self.success += 1,
                EnrichmentOutcome::SuccessOnRetry => self.success_on_retry += 1,
                EnrichmentOutcome::NotFound => self.not_found += 1,
                EnrichmentOutcome::ScrapeFailed => self.scrape_failed += 1,
            }
        }
    }

    pub fn record_write(&mut self, report: &UpsertReport) {
        self.rows_updated += report.rows_written;
        self.failed_chunks += report.failed_chunks;
    }

    pub fn attempted(&self) -> usize {
        self.success + self.success_on_retry + self.not_found + self.scrape_failed
    }

    pub fn print(&self) {
        println!(
            "Catalogue: {} rows, {} unique identifiers ({} already done).",
            self.catalogue_rows, self.identifiers, self.already_done
        );
        println!(
            "Enriched {} identifiers: {} ok, {} ok on retry, {} not found, {} failed.",
            self.attempted(),
            self.success,
            self.success_on_retry,
            self.not_found,
            self.scrape_failed,
        );
        if self.failed_chunks > 0 {
            println!(
                "Updated {} rows ({} chunks failed, see log).",
                self.rows_updated, self.failed_chunks
            );
        } else {
            println!("Updated {} rows.", self.rows_updated);
        }
    }
}

/// Wall-clock runtime as `12.3s`, `4m 05s` or `1h 02m 05s`.
pub fn format_duration(d: Duration) -> String {
    let total = d.as_secs();
    let (hours, minutes, seconds) = (total / 3600, total / 60 % 60, total % 60);
    match (hours, minutes) {
        (0, 0) => format!("{:.1}s", d.as_secs_f64()),
        (0, m) => format!("{m}m {seconds:02}s"),
        (h, m) => format!("{h}h {m:02}m {seconds:02}s"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(id: &str, outcome: EnrichmentOutcome) -> Attempt {
        Attempt {
            identifier: id.into(),
            outcome,
            record: None,
        }
    }

    #[test]
    fn tallies_each_outcome() {
        let mut summary = RunSummary::default();
        summary.record_attempts(&[
            attempt("a", EnrichmentOutcome::Success),
            attempt("b", EnrichmentOutcome::Success),
            attempt("c", EnrichmentOutcome::NotFound),
            attempt("d", EnrichmentOutcome::SuccessOnRetry),
            attempt("e", EnrichmentOutcome::ScrapeFailed),
        ]);
        summary.record_write(&UpsertReport {
            chunks: 2,
            failed_chunks: 1,
            rows_written: 200,
        });
        assert_eq!(summary.success, 2);
        assert_eq!(summary.not_found, 1);
        assert_eq!(summary.attempted(), 5);
        assert_eq!(summary.rows_updated, 200);
        assert_eq!(summary.failed_chunks, 1);
    }

    #[test]
    fn durations() {
        assert_eq!(format_duration(Duration::from_millis(2500)), "2.5s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 05s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 02m 05s");
        assert_eq!(format_duration(Duration::from_secs(7200)), "2h 00m 00s");
    }
}
