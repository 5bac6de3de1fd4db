use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use crate::settings::LoggingSettings;

/// Installs the global subscriber: JSON lines to a per-run file plus a
/// compact console layer. Keep the guard alive until exit or the file loses
/// its tail.
pub fn init(settings: &LoggingSettings) -> Result<(WorkerGuard, PathBuf)> {
    fs::create_dir_all(&settings.dir)
        .with_context(|| format!("creating log directory {}", settings.dir.display()))?;

    let file_name = format!(
        "enrichment_run_{}.json",
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let path = settings.dir.join(&file_name);
    let appender = tracing_appender::rolling::never(&settings.dir, &file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .with_context(|| format!("invalid log level {:?}", settings.level))?;

    Registry::default()
        .with(filter)
        .with(
            fmt::layer()
                .json()
                .with_current_span(false)
                .with_writer(writer)
                .with_ansi(false),
        )
        .with(fmt::layer().compact().with_target(false))
        .try_init()
        .context("installing tracing subscriber")?;

    Ok((guard, path))
}
