//! Simulation parameters: admission limits, cadences and worker behavior.
//!
//! All durations ending in `_ns` are simulated nanoseconds on the virtual
//! clock. `hard_timeout_ms` and `spawn_interval_ms` are the exceptions: the
//! first is wall-clock time, the second is converted to simulated time.

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

const MILLI: u64 = 1_000_000;
const SECOND: u64 = 1_000_000_000;

/// Hard ceiling on simultaneously resident workers.
pub const MAX_CONCURRENT_LIMIT: usize = 18;

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct SimulatorConfig {
    /// Processes to launch over the whole run.
    #[serde(default = "default_one")]
    #[validate(range(min = 1, max = 10000))]
    pub total_processes: usize,

    /// Processes allowed to be resident at once; also sizes the process table.
    #[serde(default = "default_one")]
    #[validate(range(min = 1, max = 18))]
    pub max_concurrent: usize,

    /// Minimum simulated gap between launches, in milliseconds.
    #[serde(default)]
    pub spawn_interval_ms: u64,

    /// Clock advance per coordinator iteration.
    #[serde(default = "default_tick")]
    #[validate(range(min = 1))]
    pub tick_ns: u64,

    /// Extra clock advance charged to each launch.
    #[serde(default = "default_overhead")]
    pub overhead_ns: u64,

    #[serde(default = "default_detection_interval")]
    #[validate(range(min = 1))]
    pub detection_interval_ns: u64,

    #[serde(default = "default_report_interval")]
    #[validate(range(min = 1))]
    pub report_interval_ns: u64,

    /// Real-time budget for the whole run.
    #[serde(default = "default_hard_timeout")]
    #[validate(range(min = 1))]
    pub hard_timeout_ms: u64,

    /// Seed for worker randomness; drawn from entropy when absent.
    #[serde(default)]
    pub seed: Option<u64>,

    #[serde(default)]
    #[validate(nested)]
    pub worker: WorkerConfig,
}

fn default_one() -> usize {
    1
}

fn default_tick() -> u64 {
    10 * MILLI
}

fn default_overhead() -> u64 {
    1000
}

fn default_detection_interval() -> u64 {
    SECOND
}

fn default_report_interval() -> u64 {
    SECOND / 2
}

fn default_hard_timeout() -> u64 {
    3000
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            total_processes: default_one(),
            max_concurrent: default_one(),
            spawn_interval_ms: 0,
            tick_ns: default_tick(),
            overhead_ns: default_overhead(),
            detection_interval_ns: default_detection_interval(),
            report_interval_ns: default_report_interval(),
            hard_timeout_ms: default_hard_timeout(),
            seed: None,
            worker: WorkerConfig::default(),
        }
    }
}

impl SimulatorConfig {
    pub fn spawn_interval_ns(&self) -> u64 {
        self.spawn_interval_ms.saturating_mul(MILLI)
    }
}

/// Behavior of a single simulated worker.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct WorkerConfig {
    /// Upper bound on the gap between two actions.
    #[serde(default = "default_action_bound")]
    #[validate(range(min = 1))]
    pub action_bound_ns: u64,

    /// How often the worker checks whether its lifetime is over.
    #[serde(default = "default_termination_check")]
    #[validate(range(min = 1))]
    pub termination_check_ns: u64,

    /// Minimum time alive before the worker may exit.
    #[serde(default = "default_lifetime")]
    pub lifetime_ns: u64,

    /// Chance that an action is a release rather than a request.
    #[serde(default = "default_release_probability")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub release_probability: f64,
}

fn default_action_bound() -> u64 {
    100 * MILLI
}

fn default_termination_check() -> u64 {
    250 * MILLI
}

fn default_lifetime() -> u64 {
    SECOND
}

fn default_release_probability() -> f64 {
    0.69
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            action_bound_ns: default_action_bound(),
            termination_check_ns: default_termination_check(),
            lifetime_ns: default_lifetime(),
            release_probability: default_release_probability(),
        }
    }
}
