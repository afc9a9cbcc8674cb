//! # Resman Configuration System
//!
//! Layered configuration for the resource manager simulation.
//!
//! ## Layers
//! 1. Built-in defaults
//! 2. `config/resman.yaml`, then `config/<RESMAN_ENV>.yaml` when present
//! 3. `RESMAN_*` environment variables (`__` separates sections)
//!
//! Command-line overrides are applied by the caller and re-checked with
//! [`ResmanConfig::validated`].

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

mod core;
mod error;
mod simulator;
mod telemetry;
mod validation;

pub use core::CoreConfig;
pub use error::ConfigError;
pub use simulator::{SimulatorConfig, WorkerConfig, MAX_CONCURRENT_LIMIT};
pub use telemetry::TelemetryConfig;

const BASE_FILE: &str = "config/resman.yaml";
const ENV_PREFIX: &str = "RESMAN_";

/// Top-level configuration container.
#[derive(Debug, Serialize, Deserialize, Validate, Default, Clone)]
pub struct ResmanConfig {
    /// Resource catalogue and victim policy.
    #[validate(nested)]
    #[serde(default)]
    pub core: CoreConfig,

    /// Admission, cadences and worker behavior.
    #[validate(nested)]
    #[serde(default)]
    pub simulator: SimulatorConfig,

    /// Logging and periodic reports.
    #[validate(nested)]
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl ResmanConfig {
    /// Load configuration from default files and environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(ResmanConfig::default()));

        if Path::new(BASE_FILE).exists() {
            figment = figment.merge(Yaml::file(BASE_FILE));
        }

        if let Ok(env) = std::env::var("RESMAN_ENV") {
            let env_file = format!("config/{}.yaml", env);
            if Path::new(&env_file).exists() {
                figment = figment.merge(Yaml::file(env_file));
            }
        }

        Self::extract(figment)
    }

    /// Load configuration from a specific file on top of the defaults.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(PathBuf::from(path)));
        }

        let figment =
            Figment::from(Serialized::defaults(ResmanConfig::default())).merge(Yaml::file(path));
        Self::extract(figment)
    }

    /// Re-runs validation, typically after command-line overrides.
    pub fn validated(self) -> Result<Self, ConfigError> {
        self.validate()?;
        Ok(self)
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| config.validated())
    }
}
