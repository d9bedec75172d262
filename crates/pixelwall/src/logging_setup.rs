use anyhow::{Context, Result};
use pixelwall_core::logging::LogConfig;
use std::fs::File;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter}, fmt, layer::SubscriberExt, util::SubscriberInitExt, Layer,
};

/// Handle to keep the logging worker thread alive
pub struct LogGuard {
    // Kept alive until dropped
    _guard: WorkerGuard,
}

/// Initialize the logging system
///
/// Console lines carry the thread name so producer threads (`producer-blm`)
/// and the `tpm2net` listener can be told apart.
pub fn init(config: &LogConfig) -> Result<Option<LogGuard>> {
    config
        .ensure_log_directory()
        .context("Failed to create log directory")?;

    // Housekeeping results are reported once the subscriber exists
    let cleanup = config.cleanup_old_logs();

    // RUST_LOG takes precedence over the configured level
    let level = config.parse_level();
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    // stdout may carry the terminal preview, so logs go to stderr
    let console_layer = config.console_output.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(false)
            .with_thread_names(true)
            .with_filter(filter.clone())
    });

    let (file_layer, guard, log_path) = if config.file_output {
        let log_path = config.current_log_path();
        let file = File::create(&log_path)
            .with_context(|| format!("Failed to create log file: {:?}", log_path))?;
        let (non_blocking, worker_guard) = tracing_appender::non_blocking(file);

        let layer = fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_thread_names(true)
            .with_filter(filter);
        (
            Some(layer),
            Some(LogGuard {
                _guard: worker_guard,
            }),
            Some(log_path),
        )
    } else {
        (None, None, None)
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();

    tracing::info!("Logging initialized at level: {}", level);
    if config.level.parse::<LevelFilter>().is_err() {
        tracing::warn!("Unknown log level {:?}, using {}", config.level, level);
    }
    if let Some(path) = log_path {
        tracing::info!("Logging to file: {}", path.display());
    }
    match cleanup {
        Ok(0) => {}
        Ok(removed) => tracing::debug!("Removed {} old log files", removed),
        Err(e) => tracing::warn!("Failed to clean up old log files: {}", e),
    }
    Ok(guard)
}
