use thiserror::Error;

use crate::types::{ProcessId, ResourceId, SlotIndex};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    #[error("Resource {resource} out of range (catalogue has {count} types)")]
    InvalidResource { resource: ResourceId, count: usize },

    #[error("Slot {slot} out of range (table has {capacity} slots)")]
    InvalidSlot { slot: SlotIndex, capacity: usize },

    #[error("Slot {0} is not occupied")]
    VacantSlot(SlotIndex),

    #[error("Process table is full ({0} slots occupied)")]
    TableFull(usize),

    #[error("{0} already occupies a slot")]
    DuplicateIdentity(ProcessId),

    #[error("{slot} holds no instance of {resource}")]
    NothingHeld { slot: SlotIndex, resource: ResourceId },

    #[error("Deadlock recovery found no victim among {0} stuck processes")]
    NoVictim(usize),

    #[error("Deadlock recovery made {0} terminations without clearing the deadlock")]
    RecoveryStalled(usize),

    #[error("Failed to terminate {identity}: {reason}")]
    Termination { identity: ProcessId, reason: String },

    #[error("Invariant violated: {0}")]
    Invariant(String),
}

pub type Result<T, E = ResourceError> = std::result::Result<T, E>;
