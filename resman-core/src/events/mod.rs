//! ## resman-core::events
//! **Structured allocation events**
//!
//! Every observable state change is recorded in the journal in the order it was
//! applied. The coordinator drains the journal after each operation to route
//! replies to workers and to hand the events to the logger.

use std::collections::VecDeque;

use serde::Serialize;

use crate::protocol::Message;
use crate::types::{ProcessId, ResourceId, SimTime, SlotIndex};

/// Units of one resource type returned when a process leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReleasedUnits {
    pub resource: ResourceId,
    pub units: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AllocationEvent {
    Admitted {
        slot: SlotIndex,
        identity: ProcessId,
        start_time: SimTime,
    },
    RequestObserved {
        slot: SlotIndex,
        identity: ProcessId,
        resource: ResourceId,
    },
    /// One unit handed out; `after_wait` is set for grants served from a wait queue.
    Granted {
        slot: SlotIndex,
        identity: ProcessId,
        resource: ResourceId,
        after_wait: bool,
    },
    Enqueued {
        slot: SlotIndex,
        identity: ProcessId,
        resource: ResourceId,
    },
    ReleaseAcknowledged {
        slot: SlotIndex,
        identity: ProcessId,
        resource: ResourceId,
    },
    Terminated {
        slot: SlotIndex,
        identity: ProcessId,
        reclaimed: Vec<ReleasedUnits>,
    },
    DeadlockDetected {
        stuck: Vec<SlotIndex>,
    },
    VictimTerminated {
        slot: SlotIndex,
        identity: ProcessId,
        released: Vec<ReleasedUnits>,
    },
}

impl AllocationEvent {
    /// Reply owed to a worker for this event, if the worker is waiting on one.
    pub fn reply(&self) -> Option<Message> {
        match *self {
            AllocationEvent::Granted {
                identity, resource, ..
            } => Some(Message::request(identity, resource).reply()),
            AllocationEvent::ReleaseAcknowledged {
                identity, resource, ..
            } => Some(Message::release(identity, resource).reply()),
            _ => None,
        }
    }
}

/// Ordered, unbounded buffer of events waiting to be drained.
#[derive(Debug, Default)]
pub struct EventJournal {
    events: VecDeque<AllocationEvent>,
}

impl EventJournal {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record(&mut self, event: AllocationEvent) {
        self.events.push_back(event);
    }

    pub fn drain(&mut self) -> Vec<AllocationEvent> {
        self.events.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_preserves_order() {
        let mut journal = EventJournal::new();
        for i in 0..4 {
            journal.record(AllocationEvent::Enqueued {
                slot: SlotIndex(i),
                identity: ProcessId(i as u64),
                resource: ResourceId(0),
            });
        }
        let drained = journal.drain();
        assert!(journal.is_empty());
        let slots: Vec<_> = drained
            .iter()
            .map(|e| match e {
                AllocationEvent::Enqueued { slot, .. } => slot.as_usize(),
                _ => usize::MAX,
            })
            .collect();
        assert_eq!(slots, vec![0, 1, 2, 3]);
    }

    #[test]
    fn only_grants_and_acks_expect_replies() {
        let grant = AllocationEvent::Granted {
            slot: SlotIndex(1),
            identity: ProcessId(7),
            resource: ResourceId(2),
            after_wait: true,
        };
        let queued = AllocationEvent::Enqueued {
            slot: SlotIndex(1),
            identity: ProcessId(7),
            resource: ResourceId(2),
        };
        let reply = grant.reply().unwrap();
        assert_eq!(reply.sender, ProcessId(7));
        assert_eq!(reply.resource, ResourceId(2));
        assert!(reply.granted && !reply.is_release());
        assert_eq!(queued.reply(), None);
    }
}
