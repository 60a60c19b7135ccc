//! Tracing subscriber setup.

use std::fs;

use tracing::metadata::LevelFilter;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

use crate::config::LoggingConfig;

const LOG_ENV_VAR: &str = "APISTATE_LOG";
const LOG_FILE_PREFIX: &str = "apistate.log";

/// Keeps the non-blocking file writer flushing until dropped.
pub struct LoggingGuard {
  _guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

/// Install the global subscriber. `verbosity` from the command line raises
/// the configured level.
pub fn init(config: &LoggingConfig, verbosity: u8) -> LoggingGuard {
  let filter = build_filter(&config.level, verbosity);

  let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
  layers.push(Box::new(
    tracing_subscriber::fmt::layer()
      .compact()
      .with_writer(std::io::stderr)
      .with_target(true),
  ));

  let mut guard = None;
  let mut file_setup_error = None;
  if config.file.enabled {
    let dir = config.file.resolved_dir();
    match fs::create_dir_all(&dir) {
      Ok(()) => {
        let appender = tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX);
        let (writer, worker) = tracing_appender::non_blocking(appender);
        layers.push(Box::new(
          tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(writer)
            .with_target(true),
        ));
        guard = Some(worker);
      }
      Err(err) => {
        file_setup_error = Some(format!("log dir init failed for {}: {err}", dir.display()));
      }
    }
  }

  layers.push(Box::new(filter));
  Registry::default().with(layers).init();

  if let Some(error) = file_setup_error {
    tracing::warn!("{error}");
  }

  LoggingGuard { _guard: guard }
}

fn build_filter(level: &str, verbosity: u8) -> EnvFilter {
  if let Ok(filter) = EnvFilter::try_from_env(LOG_ENV_VAR) {
    return filter;
  }
  EnvFilter::try_new(directive(level, verbosity))
    .unwrap_or_else(|_| EnvFilter::default().add_directive(LevelFilter::WARN.into()))
}

fn directive(level: &str, verbosity: u8) -> String {
  match verbosity {
    0 => level.to_string(),
    1 => LevelFilter::INFO.to_string(),
    2 => LevelFilter::DEBUG.to_string(),
    _ => LevelFilter::TRACE.to_string(),
  }
}
