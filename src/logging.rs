//! Log set-up: stderr (shown in Alfred's debugger) plus a log file in the
//! workflow's cache directory.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::Result;

/// Environment variable overriding the log filter.
pub const LOG_ENV: &str = "ALFRED_UTILS_LOG";

pub const LOG_FILE: &str = "workflow.log";

/// Install the global subscriber.
///
/// Keep the returned guard alive until exit so buffered file output is
/// flushed.
pub fn init(log_dir: &Path, debug: bool) -> Result<WorkerGuard> {
  std::fs::create_dir_all(log_dir)?;

  let file_appender = tracing_appender::rolling::never(log_dir, LOG_FILE);
  let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

  let default_level = if debug { "debug" } else { "info" };
  let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));

  tracing_subscriber::registry()
    .with(filter)
    .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
    .with(fmt::layer().with_writer(file_writer).with_ansi(false))
    .try_init()?;

  Ok(guard)
}
