//! # Resman Telemetry
//!
//! Logging, metrics and the text reports printed during and after a run.

pub mod logging;
pub mod metrics;
pub mod report;

pub use logging::{EventLogger, TelemetryError};
pub use metrics::MetricsRecorder;
