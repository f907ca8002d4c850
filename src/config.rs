//! Application configuration using Figment
//!
//! Configuration is loaded from, in increasing priority:
//! 1. built-in defaults
//! 2. the TOML file (`config/pib.toml` unless a path is given)
//! 3. environment variables prefixed with `PIB_`
//!
//! Nested keys are separated by a double underscore:
//!
//! ```text
//! PIB_APPLICATION__LOG_LEVEL=debug
//! PIB_APPLICATION__LOOP_PERIOD_MS=250
//! PIB_TELEMETRY__BUFFER_CAPACITY=4096
//! ```
//!
//! Instrument parameters (motion lengths, profile timing, dock state) are not part of this
//! file. They live in the parameter store named by `store.params_file`; see
//! [`crate::params`].

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{PibError, PibResult};
use crate::telemetry::MOTION_TM_SIZE;

/// Default location of the application configuration.
pub const DEFAULT_CONFIG_PATH: &str = "config/pib.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PibConfig {
    /// Process-wide settings.
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Outbound telemetry buffer.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    /// Where the parameter block lives.
    #[serde(default)]
    pub store: StoreConfig,
}

/// Application-level settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Name reported in the startup log.
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Control loop period in milliseconds
    #[serde(default = "default_loop_period")]
    pub loop_period_ms: u64,
}

/// Telemetry buffer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Outbound payload capacity in bytes
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
}

/// Parameter store settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// TOML file backing the parameter block.
    #[serde(default = "default_params_file")]
    pub params_file: PathBuf,
}

fn default_name() -> String {
    "StratoPIB".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_loop_period() -> u64 {
    100
}

fn default_buffer_capacity() -> usize {
    8192
}

fn default_params_file() -> PathBuf {
    PathBuf::from("config/pib_params.toml")
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            loop_period_ms: default_loop_period(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: default_buffer_capacity(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            params_file: default_params_file(),
        }
    }
}

impl PibConfig {
    /// Load from [`DEFAULT_CONFIG_PATH`].
    pub fn load() -> PibResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path and validate it.
    ///
    /// A missing file is not an error; defaults and environment overrides still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> PibResult<Self> {
        let config: Self = Figment::from(Serialized::defaults(PibConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("PIB_").split("__"))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    ///
    /// Checks:
    /// - Log level is valid (trace, debug, info, warn, error)
    /// - Loop period is non-zero
    /// - Telemetry buffer holds at least one framed motion record
    pub fn validate(&self) -> PibResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(PibError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.application.loop_period_ms == 0 {
            return Err(PibError::Configuration(
                "loop_period_ms must be greater than 0".to_string(),
            ));
        }

        // epoch header + sync/elapsed + one record
        let minimum = 4 + 3 + MOTION_TM_SIZE;
        if self.telemetry.buffer_capacity < minimum {
            return Err(PibError::Configuration(format!(
                "buffer_capacity {} is below the minimum of {}",
                self.telemetry.buffer_capacity, minimum
            )));
        }

        Ok(())
    }
}
