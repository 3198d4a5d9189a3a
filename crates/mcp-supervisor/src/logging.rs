//! Logging setup with file rotation.

use std::path::{Path, PathBuf};

use mcp_config::LoggingConfig;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, prelude::__tracing_subscriber_SubscriberExt};

/// Setup logging with console and rotating file output.
///
/// # Log Layers
/// - Console: human-readable, colored when `config.colored` is set
/// - File: plain text, daily rotation, 7-day retention
///
/// `RUST_LOG` takes precedence over the configured level. Records emitted
/// through the `log` facade are forwarded into tracing. Calling this a
/// second time returns an error.
pub fn setup_logging(
    base_dir: &Path,
    config: &LoggingConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let logs_dir = base_dir.join(&config.dir);
    std::fs::create_dir_all(&logs_dir)?;

    let console_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_ansi(config.colored);

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(7) // Keep 7 days of logs
        .filename_prefix(&config.file_prefix)
        .filename_suffix("log")
        .build(&logs_dir)?;

    let file_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_ansi(false)
        .with_writer(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_directive()));

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer);
    tracing::subscriber::set_global_default(subscriber)?;

    // Bridge log to tracing
    tracing_log::LogTracer::init().ok();

    tracing::info!(
        "Logging initialized: level={}, dir={}",
        config.level,
        logs_dir.display()
    );

    Ok(())
}

/// Get path to current log file (for diagnostics export).
pub fn current_log_path(base_dir: &Path, config: &LoggingConfig) -> PathBuf {
    let today = chrono::Utc::now().format("%Y-%m-%d");
    base_dir
        .join(&config.dir)
        .join(format!("{}.{}.log", config.file_prefix, today))
}
