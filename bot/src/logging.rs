//! Process-wide tracing setup
//!
//! `RUST_LOG` filters both destinations (default `info`). The terminal
//! layer writes to stdout; the file layer writes one file per run without
//! ANSI colors.

use anyhow::Context;
use chrono::{DateTime, Utc};
use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use usageguard_engine::config::OutputConfig;

const DEFAULT_FILTER: &str = "info";

/// `usageguard_<YYYYMMDD_HHMMSS>.log`
pub fn log_file_name(started_at: DateTime<Utc>) -> String {
    format!("usageguard_{}.log", started_at.format("%Y%m%d_%H%M%S"))
}

/// Install the global subscriber. Returns the log file path when file
/// logging is enabled.
pub fn init(output: &OutputConfig, started_at: DateTime<Utc>) -> anyhow::Result<Option<PathBuf>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let terminal = output
        .log_to_terminal
        .then(|| fmt::layer().with_target(false).with_writer(std::io::stdout));

    let (file_layer, path) = if output.log_to_file {
        std::fs::create_dir_all(&output.log_dir).with_context(|| {
            format!("failed to create log directory {}", output.log_dir.display())
        })?;
        let path = output.log_dir.join(log_file_name(started_at));
        let file = File::create(&path)
            .with_context(|| format!("failed to create log file {}", path.display()))?;
        let layer = fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_writer(Mutex::new(file));
        (Some(layer), Some(path))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(terminal)
        .with(file_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_log_file_name_uses_run_start() {
        let started = Utc
            .with_ymd_and_hms(2024, 3, 7, 4, 5, 9)
            .single()
            .expect("valid timestamp");
        assert_eq!(log_file_name(started), "usageguard_20240307_040509.log");
    }
}
