//! Logging configuration using tracing

use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::Result;

const LOG_ENV_VAR: &str = "DEVDECK_LOG";
const LOG_FILE_PREFIX: &str = "devdeck.log";
const DEFAULT_FILTER: &str =
    "devdeck=info,devdeck_core=info,devdeck_device=info,devdeck_app=info,warn";

/// Initialize the logging subsystem
///
/// Logs are written to `~/.local/share/devdeck/logs/` (or the platform's
/// local data directory). Stdout is reserved for run output and NDJSON events,
/// so nothing is ever logged to the terminal.
/// Log level is controlled by the `DEVDECK_LOG` environment variable.
///
/// # Examples
/// ```bash
/// DEVDECK_LOG=debug devdeck run "pull logs"
/// DEVDECK_LOG=devdeck_device=trace devdeck watch
/// ```
pub fn init() -> Result<()> {
    let log_dir = get_log_directory()?;
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, LOG_FILE_PREFIX);

    let env_filter =
        EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(true)
                .with_line_number(true)
                .with_timer(fmt::time::ChronoLocal::new(
                    "%Y-%m-%d %H:%M:%S%.3f".to_string(),
                )),
        )
        .init();

    tracing::info!("═══════════════════════════════════════════════════════");
    tracing::info!("devdeck starting");
    tracing::info!("Log directory: {}", log_dir.display());
    tracing::info!("═══════════════════════════════════════════════════════");

    Ok(())
}

/// Get the log directory path
fn get_log_directory() -> Result<PathBuf> {
    let base = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    Ok(base.join("devdeck").join("logs"))
}
