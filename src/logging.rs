//! Subscriber setup
//!
//! Mutations log at `info` with `resource_id`, `request_id` or `user_id`
//! fields. Accepted inconsistencies (a counted download without a signed
//! URL, an orphaned blob) log at `warn` under `e_library::catalog`. Token
//! refresh and session teardown in the API client log under
//! `e_library::client`.

use crate::config::AppConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Dependencies that are chatty at `info`
const QUIET_TARGETS: [&str; 3] = ["sqlx", "hyper", "reqwest"];

/// Filter used when `RUST_LOG` is unset
fn default_directives(level: &str) -> String {
    let mut directives = level.to_string();
    for target in QUIET_TARGETS {
        directives.push_str(&format!(",{}=warn", target));
    }
    directives
}

/// Install the global subscriber. Keep the guard alive for the process
/// lifetime or buffered file output is lost.
///
/// JSON mode writes only to the rolling file, with targets kept for
/// queries. Text mode writes the file plus an ANSI stdout copy.
pub fn init_logging(config: &AppConfig) -> WorkerGuard {
    let file_appender = match config.rotation.as_str() {
        "hourly" => tracing_appender::rolling::hourly(&config.log_dir, &config.log_file),
        "daily" => tracing_appender::rolling::daily(&config.log_dir, &config.log_file),
        _ => tracing_appender::rolling::never(&config.log_dir, &config.log_file),
    };
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&config.log_level)));
    let registry = tracing_subscriber::registry().with(filter);

    if config.use_json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(false)
                    .with_writer(writer)
                    .with_ansi(false),
            )
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(writer).with_ansi(false))
            .with(fmt::layer().with_target(false).with_ansi(true))
            .init();
    }

    tracing::debug!(
        level = %config.log_level,
        dir = %config.log_dir,
        json = config.use_json,
        "Logging initialized"
    );
    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_quiet_dependencies() {
        let directives = default_directives("debug");
        assert_eq!(directives, "debug,sqlx=warn,hyper=warn,reqwest=warn");
        assert!(EnvFilter::try_new(&directives).is_ok());
    }
}
