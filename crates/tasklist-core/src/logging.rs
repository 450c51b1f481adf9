//! Tracing subscriber setup.
//!
//! Logs go to stderr so they never mix with command output. The filter comes
//! from `TASKLIST_LOG` when set, otherwise from `[logging] level`.

use std::fs;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::{LoggingConfig, paths};

pub const LOG_ENV: &str = "TASKLIST_LOG";
const LOG_FILE: &str = "tasklist.log";

/// Keeps the file writer flushing; hold it until the process exits.
#[must_use]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

/// Installs the global subscriber. Calling it twice is harmless.
pub fn init(config: &LoggingConfig) -> LoggingGuard {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    let (file_layer, guard) = if config.file {
        match file_writer() {
            Ok((writer, guard)) => (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            ),
            Err(err) => {
                eprintln!("Warning: file logging disabled: {err}");
                (None, None)
            }
        }
    } else {
        (None, None)
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init();

    LoggingGuard { _file: guard }
}

fn file_writer() -> anyhow::Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let dir = paths::logs_dir();
    fs::create_dir_all(&dir)?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(LOG_FILE)
        .build(&dir)?;
    Ok(tracing_appender::non_blocking(appender))
}
