//! Tracing subscriber setup.
//!
//! Logs go to stderr through a `fmt` layer, and optionally to a file through
//! a non-blocking writer. `RUST_LOG` overrides the configured filter.

use crate::config::LoggingConfig;
use crate::error::{PypeError, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Install the global subscriber.
///
/// The returned guard flushes the file writer when dropped, so keep it alive
/// for the lifetime of the program. Fails if a subscriber is already set.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .map_err(|e| PypeError::Logging(format!("Invalid log filter {:?}: {}", config.filter, e)))?;

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(config.ansi)
        .with_thread_names(true);

    let (file_layer, guard) = match &config.file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path.file_name().ok_or_else(|| {
                PypeError::Logging(format!("Log file path {:?} has no file name", path))
            })?;
            std::fs::create_dir_all(dir)?;

            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_thread_names(true)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| PypeError::Logging(format!("Failed to install subscriber: {}", e)))?;

    tracing::debug!("Logging initialized with filter {:?}", config.filter);
    Ok(guard)
}
