//! Resource catalogue configuration.
//!
//! Fixes the number of resource types, the instances of each, and how the
//! recovery driver picks deadlock victims.

use resman_core::deadlock::VictimStrategy;
use serde::{Deserialize, Serialize};
use validator::{self, Validate};

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct CoreConfig {
    /// Number of resource types (R).
    #[serde(default = "default_resource_types")]
    #[validate(range(min = 1, max = 64))]
    pub resource_types: usize,

    /// Instances of every resource type (C).
    #[serde(default = "default_instances")]
    #[validate(range(min = 1, max = 1000))]
    pub instances_per_type: u32,

    /// Victim selection used by deadlock recovery.
    #[serde(default)]
    pub victim_policy: VictimStrategy,
}

fn default_resource_types() -> usize {
    5
}

fn default_instances() -> u32 {
    10
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            resource_types: default_resource_types(),
            instances_per_type: default_instances(),
            victim_policy: VictimStrategy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_catalogue_is_rejected() {
        let mut config = CoreConfig::default();
        config.validate().expect("Default config should be valid");
        config.resource_types = 0;
        assert!(config.validate().is_err());
    }
}
