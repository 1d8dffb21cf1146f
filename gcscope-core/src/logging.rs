//! Log output for gcscope
//!
//! Diagnostic events go to a daily-rolling file under
//! `$XDG_STATE_HOME/gcscope/`. Nothing is written to the terminal, so report
//! output on stdout stays machine-readable.

use crate::config::{Config, LoggingConfig};
use crate::error::{Error, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// File name prefix of the rolling log files; rotation appends the date.
pub const LOG_FILE_PREFIX: &str = "gcscope.log";

/// Flushes buffered log lines when dropped. Hold it until the process exits.
pub struct LoggingGuard {
    _guard: WorkerGuard,
}

/// Install the global subscriber.
///
/// Fails with [`Error::Config`] when the appender cannot be built or a
/// subscriber is already installed.
pub fn init(config: &LoggingConfig) -> Result<LoggingGuard> {
    let log_dir = Config::state_dir();
    std::fs::create_dir_all(&log_dir)?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .max_log_files(config.max_files.max(1))
        .build(&log_dir)
        .map_err(|e| Error::Config(format!("failed to create log appender: {e}")))?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let from_env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::registry()
        .with(env_filter(from_env.as_deref(), &config.level))
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true),
        )
        .try_init()
        .map_err(|e| Error::Config(format!("failed to install logger: {e}")))?;

    tracing::info!(
        log_dir = %log_dir.display(),
        level = %config.level,
        max_files = config.max_files,
        "Logging initialized"
    );
    Ok(LoggingGuard { _guard: guard })
}

/// `RUST_LOG` wins over the configured level. Unparsable directives fall
/// back to `info`.
fn env_filter(from_env: Option<&str>, level: &str) -> EnvFilter {
    from_env
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_new(level).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}
