mod admission;
mod error;
mod reaper;
mod runtime;

pub use self::{
    admission::AdmissionControl,
    error::EngineError,
    reaper::WorkerRegistry,
    runtime::{RunSummary, SimulationRuntime},
};

pub mod prelude {
    pub use super::{AdmissionControl, EngineError, RunSummary, SimulationRuntime, WorkerRegistry};
}
