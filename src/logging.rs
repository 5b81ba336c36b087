//! Tracing setup: human-readable lines on stderr plus a daily log file.

use std::io::{stderr, IsTerminal};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, Layer};

/// Filter for the log file, e.g. `SHIFTSYNC_LOG=shiftsync=debug`.
const LOG_ENV: &str = "SHIFTSYNC_LOG";

/// Initialise logging. Keep the returned guard alive until exit so buffered
/// file output is flushed.
pub fn init(verbose: bool) -> Option<WorkerGuard> {
  let console_filter = EnvFilter::new(if verbose { "shiftsync=debug" } else { "warn" });
  let console = fmt::layer()
    .with_ansi(stderr().is_terminal())
    .with_writer(std::io::stderr)
    .with_target(false)
    .with_filter(console_filter);

  let (file, guard) = match file_appender() {
    Some(appender) => {
      let (writer, guard) = tracing_appender::non_blocking(appender);
      let file_filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("shiftsync=info"));
      let layer = fmt::layer()
        .with_ansi(false)
        .with_writer(writer)
        .with_filter(file_filter);
      (Some(layer), Some(guard))
    }
    None => (None, None),
  };

  if tracing_subscriber::registry()
    .with(console)
    .with(file)
    .try_init()
    .is_err()
  {
    eprintln!("Logging registry already initialized");
  }

  guard
}

fn log_dir() -> Option<PathBuf> {
  dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .map(|dir| dir.join("shiftsync").join("logs"))
}

fn file_appender() -> Option<RollingFileAppender> {
  let dir = log_dir()?;
  RollingFileAppender::builder()
    .rotation(Rotation::DAILY)
    .filename_prefix("shiftsync")
    .filename_suffix("log")
    .max_log_files(7)
    .build(&dir)
    .map_err(|e| eprintln!("File logging disabled ({}): {}", dir.display(), e))
    .ok()
}
