use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::AppConfig;

const LOG_FILE_PREFIX: &str = "ironward.log";

fn env_filter(filter: &str) -> EnvFilter {
    EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new(crate::config::DEFAULT_LOG_FILTER))
}

/// Install the JSON subscriber on stderr. `log` records (sqlx) are bridged in.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging(filter: &str) {
    let _ = tracing_subscriber::registry()
        .with(env_filter(filter))
        .with(
            fmt::layer()
                .json()
                .with_target(true)
                .with_timer(UtcTime::rfc_3339())
                .with_writer(std::io::stderr),
        )
        .try_init();
}

/// Install stderr plus a daily-rolling file sink under `<data_dir>/logs`.
///
/// Keep the returned guard alive for the life of the process or buffered lines
/// are lost on exit.
pub fn init_with_file(config: &AppConfig) -> anyhow::Result<WorkerGuard> {
    let dir = config.log_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("create log directory {}", dir.display()))?;
    let guard = init_file_sink(&dir, &config.log_filter)?;
    tracing::info!(target: "ironward", event = "logging_ready", dir = %dir.display());
    Ok(guard)
}

fn init_file_sink(dir: &Path, filter: &str) -> anyhow::Result<WorkerGuard> {
    let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(env_filter(filter))
        .with(
            fmt::layer()
                .json()
                .with_target(true)
                .with_timer(UtcTime::rfc_3339())
                .with_writer(std::io::stderr),
        )
        .with(
            fmt::layer()
                .json()
                .with_target(true)
                .with_ansi(false)
                .with_timer(UtcTime::rfc_3339())
                .with_writer(writer),
        )
        .try_init()
        .context("install tracing subscriber")?;

    Ok(guard)
}
