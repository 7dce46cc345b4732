//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the filter:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `STAGEPIPE_LOG` environment variable (any `EnvFilter` directive)
//! 3. `RUST_LOG`
//! 4. default to `info`
//!
//! Logs go to stderr. When a log directory is given, a daily-rolling file
//! is written there as well.

use std::path::Path;

use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log file name prefix inside the log directory
pub const LOG_FILE_PREFIX: &str = "stagepipe.log";

fn build_filter(cli_level: Option<&str>) -> EnvFilter {
    if let Some(level) = cli_level {
        if let Ok(filter) = EnvFilter::try_new(level) {
            return filter;
        }
    }

    EnvFilter::try_from_env("STAGEPIPE_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialise the global subscriber.
///
/// The returned guard must be held for the life of the process so that
/// buffered file output is flushed.
pub fn init_logging(cli_level: Option<&str>, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);

            tracing_subscriber::registry()
                .with(build_filter(cli_level))
                .with(stderr_layer)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .try_init()?;

            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(build_filter(cli_level))
                .with(stderr_layer)
                .try_init()?;

            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_level_wins() {
        let filter = build_filter(Some("debug"));
        assert_eq!(filter.to_string(), "debug");
    }

    #[test]
    fn test_invalid_cli_level_falls_back() {
        std::env::remove_var("STAGEPIPE_LOG");
        std::env::remove_var("RUST_LOG");

        let filter = build_filter(Some("stagepipe=notalevel"));
        assert_eq!(filter.to_string(), "info");
    }
}
