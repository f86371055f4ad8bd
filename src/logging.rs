//! Tracing setup: stderr output plus an optional daily rolling log file.

use color_eyre::{eyre::eyre, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Initialize the global subscriber.
///
/// RUST_LOG wins over the configured level; `verbose` raises the default to debug.
/// The returned guard flushes the file writer on drop and must outlive the process work.
pub fn init(config: &LoggingConfig, verbose: bool) -> Result<Option<WorkerGuard>> {
  let default_level = match (&config.level, verbose) {
    (_, true) => "debug".to_string(),
    (Some(level), false) => level.clone(),
    (None, false) => "info".to_string(),
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

  // stdout carries command output, logs go to stderr
  let stderr_layer = fmt::layer().with_target(true).with_writer(std::io::stderr);

  let Some(log_path) = &config.file else {
    tracing_subscriber::registry()
      .with(filter)
      .with(stderr_layer)
      .try_init()
      .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;
    return Ok(None);
  };

  let dir = log_path
    .parent()
    .filter(|p| !p.as_os_str().is_empty())
    .unwrap_or(std::path::Path::new("."));
  std::fs::create_dir_all(dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;
  let file_name = log_path
    .file_name()
    .ok_or_else(|| eyre!("Log file path has no file name: {}", log_path.display()))?;

  let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, file_name));
  let file_layer = fmt::layer().with_ansi(false).with_writer(writer);

  tracing_subscriber::registry()
    .with(filter)
    .with(stderr_layer)
    .with(file_layer)
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  Ok(Some(guard))
}
