//! Tracing subscriber setup

use crate::config::schema::GeneralConfig;
use crate::error::{GantryError, GantryResult};
use tracing_subscriber::EnvFilter;

/// Filter directive for a verbosity level: 0 = warn, 1 = info, 2+ = debug
pub fn filter_directive(verbose: u8) -> &'static str {
    match verbose {
        0 => "gantry=warn",
        1 => "gantry=info",
        _ => "gantry=debug",
    }
}

/// Install the global subscriber
///
/// `RUST_LOG` takes precedence over the configured verbosity. A subscriber
/// that is already installed is left in place.
pub fn init_logging(config: &GeneralConfig) -> GantryResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(config.verbose)));

    let result = match config.log_format.as_str() {
        "json" => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init(),
        "text" => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init(),
        other => {
            return Err(GantryError::Internal(format!(
                "unknown log format: {other}"
            )))
        }
    };

    if let Err(e) = result {
        tracing::debug!("Subscriber already installed: {}", e);
    }
    Ok(())
}
