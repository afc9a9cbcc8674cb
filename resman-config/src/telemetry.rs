//! Logging and reporting configuration.

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

use crate::validation;

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct TelemetryConfig {
    /// Default tracing level; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    #[validate(custom(function = validation::validate_log_level))]
    pub log_level: String,

    /// File that mirrors everything written to stdout.
    #[serde(default)]
    #[validate(custom(function = validation::validate_log_file))]
    pub log_file: Option<String>,

    /// Print the process and resource tables on the report cadence.
    #[serde(default = "default_true")]
    pub print_tables: bool,
}

fn default_log_level() -> String {
    "info".into()
}

fn default_true() -> bool {
    true
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_file: None,
            print_tables: default_true(),
        }
    }
}
