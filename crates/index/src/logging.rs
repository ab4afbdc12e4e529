//! Logging setup for processes embedding the indexer

use symdex_core::{LogConfig, LogRotation};
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const LOG_FILE: &str = "symdex.log";

/// Parse log level from config string
fn parse_log_level(level: &str) -> LevelFilter {
  match level.to_lowercase().as_str() {
    "off" => LevelFilter::OFF,
    "error" => LevelFilter::ERROR,
    "warn" => LevelFilter::WARN,
    "info" => LevelFilter::INFO,
    "debug" => LevelFilter::DEBUG,
    "trace" => LevelFilter::TRACE,
    _ => LevelFilter::INFO,
  }
}

/// Initialize logging with config-driven settings.
///
/// In foreground mode: Logs to console only with colors
/// In background mode: Logs to a rolling file only (no ANSI)
///
/// `RUST_LOG` overrides the configured level. Returns the guard that must be
/// kept alive for as long as file logging should flush. A subscriber that is
/// already installed is left in place.
pub fn init_logging(config: &LogConfig, foreground: bool) -> Option<WorkerGuard> {
  let env_filter = EnvFilter::builder()
    .with_default_directive(parse_log_level(&config.level).into())
    .from_env_lossy();

  if foreground {
    let _ = tracing_subscriber::fmt()
      .with_env_filter(env_filter)
      .with_target(true)
      .with_ansi(true)
      .try_init();
    return None;
  }

  let log_dir = config.log_dir();
  if std::fs::create_dir_all(&log_dir).is_err() {
    // Fall back to console-only logging
    let _ = tracing_subscriber::fmt().with_env_filter(env_filter).try_init();
    return None;
  }

  let file_appender = match config.rotation {
    LogRotation::Hourly => tracing_appender::rolling::hourly(&log_dir, LOG_FILE),
    LogRotation::Daily => tracing_appender::rolling::daily(&log_dir, LOG_FILE),
    LogRotation::Never => tracing_appender::rolling::never(&log_dir, LOG_FILE),
  };
  let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

  let _ = tracing_subscriber::fmt()
    .with_env_filter(env_filter)
    .with_target(true)
    .with_ansi(false)
    .with_writer(file_writer)
    .try_init();

  Some(guard)
}
