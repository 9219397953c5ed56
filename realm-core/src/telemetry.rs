//! Tracing setup.

use tracing_subscriber::EnvFilter;

use crate::config::GeneralConfig;
use crate::error::{RealmError, Result};

/// Install a global `fmt` subscriber. `RUST_LOG` takes precedence over the
/// configured level.
///
/// # Errors
/// `RealmError::Config` if the level is not a valid filter or a global
/// subscriber is already installed.
pub fn init_tracing(config: &GeneralConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_level)
            .map_err(|e| RealmError::Config(format!("invalid log level {:?}: {e}", config.log_level)))?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    let installed = if config.json_logs {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| RealmError::Config(format!("tracing already initialized: {e}")))
}
