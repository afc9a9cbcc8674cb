//! Read-only view of both tables for the periodic report.

use serde::Serialize;

use crate::types::{ProcessId, ResourceId, SimTime, SlotIndex};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessView {
    pub slot: SlotIndex,
    pub identity: ProcessId,
    pub start_time: SimTime,
    pub held: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceView {
    pub resource: ResourceId,
    pub total: u32,
    pub available: u32,
    /// Units held, indexed by slot.
    pub allocation: Vec<u32>,
    pub waiting: Vec<SlotIndex>,
}

/// Point-in-time copy of the process table (occupied slots only) and the resource table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemSnapshot {
    pub processes: Vec<ProcessView>,
    pub resources: Vec<ResourceView>,
}

impl SystemSnapshot {
    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    /// True when every instance of every type is available.
    pub fn is_idle(&self) -> bool {
        self.resources.iter().all(|r| r.available == r.total)
    }
}
