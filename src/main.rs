mod catalogue;
mod checkpoint;
mod driver;
mod error;
mod extract;
mod logging;
mod metrics;
mod payload;
mod pipeline;
mod settings;
mod store;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use checkpoint::CheckpointStore;
use driver::RunPlan;
use extract::amazon::AmazonExtractor;
use pipeline::PipelineOptions;
use settings::{LoggingSettings, Settings};

#[derive(Parser)]
#[command(
    name = "catalog_enricher",
    about = "Enrich a product catalogue table with marketplace listing data"
)]
struct Cli {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(short, long, global = true, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape pending identifiers and write results back to the catalogue
    Run {
        /// Max identifiers to scrape (default: scraper.max_items_to_scrape)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Show checkpoint state
    Status,
    /// Delete the checkpoint so the next run starts over
    Reset,
}

fn main() -> anyhow::Result<()> {
    let t0 = Instant::now();
    let cli = Cli::parse();

    let loaded = Settings::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()));

    match cli.command {
        Commands::Status => {
            let checkpoint = CheckpointStore::new(&loaded?.checkpoint.path);
            let done = checkpoint.load()?;
            println!("Checkpoint: {}", checkpoint.path().display());
            if checkpoint.exists() {
                println!("Processed: {} identifiers", done.len());
            } else {
                println!("No checkpoint; next run starts from the beginning.");
            }
            Ok(())
        }
        Commands::Reset => {
            let checkpoint = CheckpointStore::new(&loaded?.checkpoint.path);
            checkpoint.clear()?;
            println!("Removed {}", checkpoint.path().display());
            Ok(())
        }
        Commands::Run { limit } => {
            let (_guard, log_path) = logging::init(&log_settings(&loaded))?;
            info!(log_file = %log_path.display(), "Enrichment run starting");

            let result = loaded.and_then(|settings| run(&settings, limit));
            if let Err(e) = &result {
                error!(error = %format!("{e:#}"), "Enrichment run aborted");
            }
            let summary = result?;
            summary.print();

            let elapsed = t0.elapsed();
            info!(elapsed_secs = elapsed.as_secs_f64(), "Enrichment run finished");
            if elapsed.as_secs() >= 1 {
                println!("\nDone in {}", metrics::format_duration(elapsed));
            }
            Ok(())
        }
    }
}

/// Logging stays up even when the config file is unusable, so the failure
/// lands in the run log.
fn log_settings(loaded: &anyhow::Result<Settings>) -> LoggingSettings {
    loaded
        .as_ref()
        .map(|settings| settings.logging.clone())
        .unwrap_or_default()
}

fn run(settings: &Settings, limit: Option<usize>) -> anyhow::Result<metrics::RunSummary> {
    settings.validate()?;
    let checkpoint = CheckpointStore::new(&settings.checkpoint.path);
    let target = settings.store_target()?;
    let (store, table) = store::open(&target)?;

    let plan = RunPlan {
        identifier_column: settings.catalogue.identifier_column.clone(),
        options: PipelineOptions {
            limit: limit.unwrap_or(settings.scraper.max_items_to_scrape),
            save_every: settings.checkpoint.save_every,
        },
    };
    let summary = driver::enrich(store.as_ref(), &table, &checkpoint, &plan, || {
        AmazonExtractor::open(&settings.scraper)
    })?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_settings_fall_back_when_config_fails() {
        let failed: anyhow::Result<Settings> = Err(anyhow::anyhow!("no such file"));
        let fallback = log_settings(&failed);
        assert_eq!(fallback.dir, PathBuf::from("logs"));
        assert_eq!(fallback.level, "info");

        let mut settings = Settings::default();
        settings.logging.dir = PathBuf::from("run-logs");
        settings.logging.level = "debug".into();
        let chosen = log_settings(&Ok(settings));
        assert_eq!(chosen.dir, PathBuf::from("run-logs"));
        assert_eq!(chosen.level, "debug");
    }
}
