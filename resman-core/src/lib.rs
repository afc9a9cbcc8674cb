//! # resman-core
//!
//! Bookkeeping layer of the resource manager simulation.
//!
//! All allocation state lives in a single `SimulationState` owned by the
//! coordinator. Workers never touch it directly; they talk to the coordinator
//! through `protocol::Message` values and the coordinator applies the matching
//! operation.
//!
//! ### Key Submodules:
//! - `resources`: per-type totals, allocation and pending vectors, FIFO wait queues
//! - `process`: fixed-capacity process table with the held-units mirror
//! - `state`: request / release / termination operations over both tables
//! - `deadlock`: safety-algorithm detector and iterative victim recovery
//! - `events`: journal of allocation decisions drained by the coordinator

pub mod deadlock;
pub mod error;
pub mod events;
pub mod process;
pub mod protocol;
pub mod resources;
pub mod snapshot;
pub mod state;
pub mod stats;
pub mod types;

pub mod prelude {
    pub use crate::deadlock::*;
    pub use crate::error::*;
    pub use crate::events::*;
    pub use crate::protocol::*;
    pub use crate::snapshot::*;
    pub use crate::state::*;
    pub use crate::stats::*;
    pub use crate::types::*;
}

pub use error::ResourceError;
pub use state::SimulationState;
