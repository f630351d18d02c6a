use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::error::AppError;

pub const LOG_FILE_NAME: &str = "app.log";
const VERBOSE_FILTER: &str = "info,vodgrab=debug,vodgrab_engine=debug";
const DEFAULT_FILTER: &str = "info";

/// Log to stdout and to `<log_dir>/app.log`.
///
/// `RUST_LOG` overrides the default filter unless `verbose` is set. Keep the
/// returned guard alive until exit so buffered file output is flushed.
pub fn init_logging(log_dir: &Path, verbose: bool) -> Result<WorkerGuard, AppError> {
    std::fs::create_dir_all(log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, LOG_FILE_NAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(true))
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .try_init()
        .map_err(|e| {
            AppError::Initialization(format!("Failed to set global default subscriber: {e}"))
        })?;

    Ok(guard)
}
