//! # resman-engine
//!
//! The coordinator: owns the allocation state, drives the virtual clock, admits
//! workers, applies their messages and runs detection and recovery on cadence.

pub mod engine;

pub use engine::{EngineError, RunSummary, SimulationRuntime};
