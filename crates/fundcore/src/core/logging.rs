//! Logging initialization
//!
//! Console + file output through `tracing-subscriber`. Application code logs
//! with the `log` macros; `tracing-log` forwards those records.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::core::config;

/// Initialize logger for both console and file output
///
/// The filter comes from `RUST_LOG` when set, otherwise from `LOG_LEVEL`
/// (default `info`). The log file is appended to and its parent directory
/// is created when missing.
///
/// # Arguments
/// * `log_file_path` - Path to the log file
pub fn init_logger(log_file_path: &str) -> Result<()> {
    if let Some(parent) = Path::new(log_file_path).parent() {
        if !parent.as_os_str().is_empty() {
            fs_err::create_dir_all(parent).context("create log directory")?;
        }
    }

    let log_file = fs_err::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path)
        .context("open log file")?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config::LOG_LEVEL.as_str()));

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(log_file)));

    tracing_log::LogTracer::init().context("bridge log records")?;
    tracing::subscriber::set_global_default(subscriber).context("install tracing subscriber")?;

    Ok(())
}

/// Logs the deployment variables at startup without exposing the token.
pub fn log_env_configuration(report: &config::EnvReport) {
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    log::info!("Environment check");
    for (name, state) in &report.entries {
        match state {
            config::EnvVarState::Set => log::info!("✅ {}: set", name),
            config::EnvVarState::Defaulted(value) => log::warn!("⚠️  {}: not set, using default {:?}", name, value),
            config::EnvVarState::Missing => log::error!("❌ {}: NOT SET (required)", name),
        }
    }
    log::info!("Database: {}", *config::DATABASE_PATH);
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_init_logger_creates_nested_log_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs").join("bot.log");

        // A global subscriber may already be installed by another test;
        // the file must exist either way.
        let _ = init_logger(path.to_str().unwrap());

        assert!(path.exists());
    }
}
