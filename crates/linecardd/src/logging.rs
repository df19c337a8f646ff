//! Tracing subscriber setup.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::{LinecardError, LinecardResult};

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `log_level`. JSON output is meant for
/// production log collection, the pretty form for interactive use.
pub fn init_logging(log_level: &str, json: bool) -> LinecardResult<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(log_level).map_err(|e| {
            LinecardError::Configuration(format!("invalid log level '{}': {}", log_level, e))
        })?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if json {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .json(),
            )
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .try_init()
    };

    installed.map_err(|e| {
        LinecardError::Configuration(format!("failed to install tracing subscriber: {}", e))
    })
}
