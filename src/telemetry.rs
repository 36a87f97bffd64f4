use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use tracing_subscriber::EnvFilter;

use crate::config::{Config, TelemetryConfig};

/// Initialize telemetry logging
///
/// `RUST_LOG` takes precedence over the configured filter.
///
/// # Errors
/// Returns error if the log file cannot be opened or a subscriber is
/// already installed
pub fn init(config: &TelemetryConfig) -> Result<()> {
    let filter = build_filter(&config.filter);

    if !config.enabled {
        // Basic stdout logging only
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to install subscriber: {e}"))?;
        return Ok(());
    }

    let expanded_path = Config::expand_path(&config.log_path)?;

    if let Some(parent) = expanded_path.parent() {
        fs::create_dir_all(parent).context("failed to create log directory")?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&expanded_path)
        .context("failed to open log file")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(file)
        .with_target(false)
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install subscriber: {e}"))?;

    tracing::info!("telemetry initialized: {}", expanded_path.display());

    Ok(())
}

fn build_filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}
