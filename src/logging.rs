//! Tracing setup for the `snapsweep` binary.
//!
//! Library code only emits `tracing` events. The binary picks where they go:
//! the systemd journal when one is reachable, otherwise a daily rolling file.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable holding the filter directive, e.g. `snapsweep=debug`.
pub const LOG_ENV: &str = "SNAPSWEEP_LOG";

const LOG_FILE_PREFIX: &str = "snapsweep.log";

/// Flushes buffered file output when dropped, so it lives as long as the process.
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Where log events ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogBackend {
    Journald,
    File(PathBuf),
}

/// `$XDG_DATA_HOME/snapsweep/logs`, or `./snapsweep/logs` without a data dir.
pub fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("snapsweep")
        .join("logs")
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Call once, from `main`.
///
/// Tests and library callers should not call this; a second call fails
/// because the global subscriber is already set.
pub fn init(log_dir: Option<PathBuf>) -> Result<LogBackend> {
    #[cfg(target_os = "linux")]
    {
        if let Ok(journald) = tracing_journald::layer() {
            tracing_subscriber::registry()
                .with(env_filter())
                .with(journald)
                .try_init()
                .context("Failed to install journald subscriber")?;
            tracing::info!("Logging to journald");
            return Ok(LogBackend::Journald);
        }
    }

    let log_dir = log_dir.unwrap_or_else(default_log_dir);
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(&log_dir, LOG_FILE_PREFIX));
    if FILE_GUARD.set(guard).is_err() {
        anyhow::bail!("Logging already initialized");
    }

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .try_init()
        .context("Failed to install file subscriber")?;

    tracing::info!(dir = %log_dir.display(), "Logging to file");
    Ok(LogBackend::File(log_dir))
}
