//! Tracing subscriber setup.
//!
//! `RUST_LOG` wins over the configured level when it is set, so a field engineer can turn
//! on `strato_pib::motion=trace` without editing the configuration file.

use tracing_subscriber::EnvFilter;

use crate::config::ApplicationConfig;

/// Filter used when `RUST_LOG` is unset.
pub fn default_filter(config: &ApplicationConfig) -> EnvFilter {
    EnvFilter::new(config.log_level.as_str())
}

/// Install the global fmt subscriber. Returns false if one was already installed.
pub fn init(config: &ApplicationConfig) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(config));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
