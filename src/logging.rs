//! Tracing subscriber setup.
//!
//! stdout carries the turn output JSON, so all log output goes to stderr and,
//! optionally, to a daily rolling file.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the defaults (`warn`, or `info` when verbose). When
/// `log_dir` is set, events are also written there as JSON; keep the returned
/// guard alive until exit so the background writer flushes.
pub fn init_tracing(verbose: bool, json: bool, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let default_level = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let stderr_layer = if json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed()
    };

    let (file_layer, guard) = match log_dir.map(file_appender) {
        Some(Ok(appender)) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .boxed();
            (Some(layer), Some(guard))
        }
        Some(Err(e)) => {
            eprintln!("loopwarden: file logging disabled: {}", e);
            (None, None)
        }
        None => (None, None),
    };

    // A subscriber may already be installed (tests); keep that one.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init();

    guard
}

fn file_appender(dir: &Path) -> anyhow::Result<RollingFileAppender> {
    std::fs::create_dir_all(dir)?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("loopwarden")
        .filename_suffix("log")
        .build(dir)?;
    Ok(appender)
}
