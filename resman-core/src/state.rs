//! ## resman-core::state
//! **Allocation engine over the resource and process tables**
//!
//! `SimulationState` is the single owner of both tables. Every mutation goes
//! through the operations below, which update the resource allocation and the
//! per-slot held mirror together, record the matching events and bump the
//! statistics counters.

use tracing::debug;

use crate::error::{ResourceError, Result};
use crate::events::{AllocationEvent, EventJournal, ReleasedUnits};
use crate::process::{Occupant, ProcessTable};
use crate::resources::ResourceTable;
use crate::snapshot::{ProcessView, ResourceView, SystemSnapshot};
use crate::stats::AllocationStats;
use crate::types::{ProcessId, ResourceId, SimTime, SlotIndex};

/// Result of a request as seen by the requesting worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// A unit was handed out; the worker gets a reply right away.
    Granted,
    /// No unit was free; the worker stays blocked until a grant is replayed.
    Enqueued,
}

pub struct SimulationState {
    resources: ResourceTable,
    processes: ProcessTable,
    journal: EventJournal,
    stats: AllocationStats,
}

impl SimulationState {
    /// Creates `resource_types` types of `instances` units each, for a table of `slots` processes.
    pub fn new(resource_types: usize, instances: u32, slots: usize) -> Self {
        Self {
            resources: ResourceTable::new(resource_types, instances, slots),
            processes: ProcessTable::with_capacity(slots, resource_types),
            journal: EventJournal::new(),
            stats: AllocationStats::new(),
        }
    }

    pub fn resources(&self) -> &ResourceTable {
        &self.resources
    }

    pub fn processes(&self) -> &ProcessTable {
        &self.processes
    }

    pub fn stats(&self) -> &AllocationStats {
        &self.stats
    }

    /// Number of occupied slots.
    pub fn running(&self) -> usize {
        self.processes.running()
    }

    pub fn slot_of(&self, identity: ProcessId) -> Option<SlotIndex> {
        self.processes.find(identity)
    }

    /// Takes every event recorded since the last drain, oldest first.
    pub fn drain_events(&mut self) -> Vec<AllocationEvent> {
        self.journal.drain()
    }

    /// Places a newly spawned worker in the lowest vacant slot.
    pub fn admit(&mut self, identity: ProcessId, start_time: SimTime) -> Result<SlotIndex> {
        let slot = self.processes.occupy(identity, start_time)?;
        debug!(%slot, %identity, %start_time, "process admitted");
        self.journal.record(AllocationEvent::Admitted {
            slot,
            identity,
            start_time,
        });
        Ok(slot)
    }

    /// Grants one unit of `resource` to `slot` if one is free, otherwise queues the demand.
    pub fn request(&mut self, slot: SlotIndex, resource: ResourceId) -> Result<RequestOutcome> {
        let Occupant { identity, .. } = self.processes.occupant(slot)?;
        self.resources.check(resource)?;
        self.journal.record(AllocationEvent::RequestObserved {
            slot,
            identity,
            resource,
        });

        if self.resources.get_mut(resource)?.try_take(slot) {
            *self.processes.get_mut(slot)?.held_mut(resource) += 1;
            self.stats.increment_immediate_grants();
            debug!(%slot, %resource, "request granted");
            self.journal.record(AllocationEvent::Granted {
                slot,
                identity,
                resource,
                after_wait: false,
            });
            Ok(RequestOutcome::Granted)
        } else {
            self.resources.get_mut(resource)?.enqueue(slot);
            debug!(%slot, %resource, "no instance free, request queued");
            self.journal.record(AllocationEvent::Enqueued {
                slot,
                identity,
                resource,
            });
            Ok(RequestOutcome::Enqueued)
        }
    }

    /// Returns one unit of `resource` held by `slot` and serves the wait queue.
    pub fn release(&mut self, slot: SlotIndex, resource: ResourceId) -> Result<()> {
        let Occupant { identity, .. } = self.processes.occupant(slot)?;
        self.resources.check(resource)?;

        let held = self.processes.get_mut(slot)?.held_mut(resource);
        if *held == 0 {
            return Err(ResourceError::NothingHeld { slot, resource });
        }
        *held -= 1;
        self.resources.get_mut(resource)?.give_back(slot);
        debug!(%slot, %resource, "release acknowledged");
        self.journal.record(AllocationEvent::ReleaseAcknowledged {
            slot,
            identity,
            resource,
        });

        self.serve_waiters(resource)?;
        Ok(())
    }

    /// Removes a process that exited on its own.
    ///
    /// Pending requests and queue entries are dropped, and any units still held
    /// go back to `available` before the wait queues are replayed.
    pub fn terminate_normally(&mut self, slot: SlotIndex) -> Result<Vec<ReleasedUnits>> {
        let Occupant { identity, .. } = self.processes.occupant(slot)?;
        let reclaimed = self.retire(slot)?;
        self.stats.increment_normal_terminations();
        debug!(%slot, %identity, ?reclaimed, "process terminated normally");
        self.journal.record(AllocationEvent::Terminated {
            slot,
            identity,
            reclaimed: reclaimed.clone(),
        });
        self.serve_all_waiters()?;
        Ok(reclaimed)
    }

    /// Reclaims everything a killed deadlock victim held and replays the wait queues.
    pub(crate) fn reclaim_victim(&mut self, slot: SlotIndex) -> Result<Vec<ReleasedUnits>> {
        let Occupant { identity, .. } = self.processes.occupant(slot)?;
        let released = self.retire(slot)?;
        self.stats.increment_victims_killed();
        self.journal.record(AllocationEvent::VictimTerminated {
            slot,
            identity,
            released: released.clone(),
        });
        self.serve_all_waiters()?;
        Ok(released)
    }

    /// Records a detector run in the statistics and the journal.
    pub fn record_detection(&mut self, stuck: &[SlotIndex]) {
        let identities: Vec<ProcessId> = stuck
            .iter()
            .filter_map(|&slot| self.processes.occupant(slot).ok())
            .map(|occupant| occupant.identity)
            .collect();
        self.stats.record_detection(identities);
        if !stuck.is_empty() {
            self.journal.record(AllocationEvent::DeadlockDetected {
                stuck: stuck.to_vec(),
            });
        }
    }

    /// Purges `slot` from every type and vacates it. Waiters are not served yet.
    fn retire(&mut self, slot: SlotIndex) -> Result<Vec<ReleasedUnits>> {
        let mut released = Vec::new();
        for (resource, kind) in self.resources.iter_mut() {
            let units = kind.purge(slot);
            if units > 0 {
                released.push(ReleasedUnits { resource, units });
            }
        }
        self.processes.vacate(slot)?;
        Ok(released)
    }

    fn serve_all_waiters(&mut self) -> Result<()> {
        for idx in 0..self.resources.len() {
            self.serve_waiters(ResourceId::new(idx))?;
        }
        Ok(())
    }

    /// Grants queued demand for `resource` in FIFO order while units are free.
    fn serve_waiters(&mut self, resource: ResourceId) -> Result<usize> {
        let mut served = 0;
        while let Some(waiter) = self.resources.get_mut(resource)?.serve_next() {
            let entry = self.processes.get_mut(waiter)?;
            *entry.held_mut(resource) += 1;
            let identity = entry
                .occupant()
                .map(|o| o.identity)
                .ok_or(ResourceError::VacantSlot(waiter))?;
            self.stats.increment_deferred_grants();
            debug!(slot = %waiter, %resource, "queued request granted");
            self.journal.record(AllocationEvent::Granted {
                slot: waiter,
                identity,
                resource,
                after_wait: true,
            });
            served += 1;
        }
        Ok(served)
    }

    pub fn snapshot(&self) -> SystemSnapshot {
        let processes = self
            .processes
            .iter_occupied()
            .filter_map(|(slot, entry)| {
                entry.occupant().map(|occupant| ProcessView {
                    slot,
                    identity: occupant.identity,
                    start_time: occupant.start_time,
                    held: entry.held().to_vec(),
                })
            })
            .collect();

        let resources = self
            .resources
            .iter()
            .map(|(resource, kind)| ResourceView {
                resource,
                total: kind.total(),
                available: kind.available(),
                allocation: kind.allocations().to_vec(),
                waiting: kind.waiters().collect(),
            })
            .collect();

        SystemSnapshot {
            processes,
            resources,
        }
    }

    /// Verifies conservation, the held mirror and queue/pending agreement.
    pub fn check_invariants(&self) -> Result<()> {
        for (resource, kind) in self.resources.iter() {
            let allocated: u64 = kind.allocations().iter().map(|&a| u64::from(a)).sum();
            if u64::from(kind.available()) + allocated != u64::from(kind.total()) {
                return Err(ResourceError::Invariant(format!(
                    "{resource}: available {} + allocated {allocated} != total {}",
                    kind.available(),
                    kind.total()
                )));
            }

            for (slot, entry) in self.processes.iter() {
                let held = entry.held_of(resource);
                if held != kind.allocation(slot) {
                    return Err(ResourceError::Invariant(format!(
                        "{slot} holds {held} of {resource} but the resource table says {}",
                        kind.allocation(slot)
                    )));
                }
                let queued = kind.waiters().filter(|&w| w == slot).count() as u64;
                if queued > u64::from(kind.pending(slot)) {
                    return Err(ResourceError::Invariant(format!(
                        "{slot} queued {queued} times on {resource} with {} pending",
                        kind.pending(slot)
                    )));
                }
                if !entry.is_occupied() && (queued > 0 || kind.pending(slot) > 0) {
                    return Err(ResourceError::Invariant(format!(
                        "vacant {slot} still has demand on {resource}"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(processes: u64, types: usize, instances: u32) -> SimulationState {
        let mut state = SimulationState::new(types, instances, 4);
        for pid in 0..processes {
            state.admit(ProcessId(100 + pid), SimTime(pid)).unwrap();
        }
        state.drain_events();
        state
    }

    #[test]
    fn immediate_grant_updates_both_tables() {
        let mut state = state_with(1, 2, 2);
        let outcome = state.request(SlotIndex(0), ResourceId(1)).unwrap();
        assert_eq!(outcome, RequestOutcome::Granted);
        assert_eq!(state.resources().get(ResourceId(1)).unwrap().available(), 1);
        assert_eq!(
            state.processes().get(SlotIndex(0)).unwrap().held(),
            &[0, 1]
        );
        assert_eq!(state.stats().immediate_grants(), 1);
        state.check_invariants().unwrap();
    }

    #[test]
    fn exhausted_request_blocks_without_reply() {
        let mut state = state_with(2, 1, 1);
        state.request(SlotIndex(0), ResourceId(0)).unwrap();
        state.drain_events();

        let outcome = state.request(SlotIndex(1), ResourceId(0)).unwrap();
        assert_eq!(outcome, RequestOutcome::Enqueued);
        let events = state.drain_events();
        assert!(events.iter().all(|e| e.reply().is_none()));
        assert_eq!(
            state
                .resources()
                .get(ResourceId(0))
                .unwrap()
                .pending(SlotIndex(1)),
            1
        );
    }

    #[test]
    fn release_cascades_to_waiters_in_fifo_order() {
        let mut state = state_with(3, 1, 1);
        state.request(SlotIndex(0), ResourceId(0)).unwrap();
        state.request(SlotIndex(1), ResourceId(0)).unwrap();
        state.request(SlotIndex(2), ResourceId(0)).unwrap();
        state.drain_events();

        state.release(SlotIndex(0), ResourceId(0)).unwrap();
        let grants: Vec<_> = state
            .drain_events()
            .into_iter()
            .filter_map(|e| match e {
                AllocationEvent::Granted {
                    slot, after_wait, ..
                } => Some((slot, after_wait)),
                _ => None,
            })
            .collect();
        assert_eq!(grants, vec![(SlotIndex(1), true)]);
        assert_eq!(state.stats().deferred_grants(), 1);
        assert_eq!(
            state
                .resources()
                .get(ResourceId(0))
                .unwrap()
                .waiters()
                .collect::<Vec<_>>(),
            vec![SlotIndex(2)]
        );
        state.check_invariants().unwrap();
    }

    #[test]
    fn release_without_holding_is_rejected() {
        let mut state = state_with(1, 1, 3);
        assert_eq!(
            state.release(SlotIndex(0), ResourceId(0)),
            Err(ResourceError::NothingHeld {
                slot: SlotIndex(0),
                resource: ResourceId(0)
            })
        );
        assert_eq!(state.resources().get(ResourceId(0)).unwrap().available(), 3);
    }

    #[test]
    fn operations_on_vacant_slot_or_bad_type_fail() {
        let mut state = state_with(1, 2, 1);
        assert_eq!(
            state.request(SlotIndex(3), ResourceId(0)),
            Err(ResourceError::VacantSlot(SlotIndex(3)))
        );
        assert!(matches!(
            state.request(SlotIndex(0), ResourceId(9)),
            Err(ResourceError::InvalidResource { .. })
        ));
        assert!(matches!(
            state.request(SlotIndex(8), ResourceId(0)),
            Err(ResourceError::InvalidSlot { .. })
        ));
    }

    #[test]
    fn normal_termination_drops_queue_entries_and_reclaims_holdings() {
        let mut state = state_with(3, 2, 1);
        state.request(SlotIndex(0), ResourceId(0)).unwrap();
        state.request(SlotIndex(1), ResourceId(1)).unwrap();
        state.request(SlotIndex(1), ResourceId(0)).unwrap();
        state.request(SlotIndex(2), ResourceId(0)).unwrap();
        state.drain_events();

        let reclaimed = state.terminate_normally(SlotIndex(1)).unwrap();
        assert_eq!(
            reclaimed,
            vec![ReleasedUnits {
                resource: ResourceId(1),
                units: 1
            }]
        );
        assert_eq!(state.running(), 2);
        assert_eq!(
            state
                .resources()
                .get(ResourceId(0))
                .unwrap()
                .waiters()
                .collect::<Vec<_>>(),
            vec![SlotIndex(2)]
        );

        // the exited process must never be granted later
        state.release(SlotIndex(0), ResourceId(0)).unwrap();
        let granted: Vec<_> = state
            .drain_events()
            .into_iter()
            .filter_map(|e| match e {
                AllocationEvent::Granted { slot, .. } => Some(slot),
                _ => None,
            })
            .collect();
        assert_eq!(granted, vec![SlotIndex(2)]);
        assert_eq!(state.stats().normal_terminations(), 1);
        state.check_invariants().unwrap();
    }

    #[test]
    fn termination_reclaim_wakes_waiters() {
        let mut state = state_with(2, 1, 1);
        state.request(SlotIndex(0), ResourceId(0)).unwrap();
        state.request(SlotIndex(1), ResourceId(0)).unwrap();
        state.drain_events();

        state.terminate_normally(SlotIndex(0)).unwrap();
        let events = state.drain_events();
        assert!(matches!(events[0], AllocationEvent::Terminated { .. }));
        assert!(matches!(
            events[1],
            AllocationEvent::Granted {
                slot: SlotIndex(1),
                after_wait: true,
                ..
            }
        ));
        assert_eq!(
            state.processes().get(SlotIndex(1)).unwrap().held(),
            &[1]
        );
        state.check_invariants().unwrap();
    }

    #[test]
    fn snapshot_lists_only_occupied_slots() {
        let mut state = state_with(2, 2, 3);
        state.request(SlotIndex(1), ResourceId(0)).unwrap();
        state.terminate_normally(SlotIndex(0)).unwrap();

        let snapshot = state.snapshot();
        assert_eq!(snapshot.processes.len(), 1);
        assert_eq!(snapshot.processes[0].slot, SlotIndex(1));
        assert_eq!(snapshot.processes[0].identity, ProcessId(101));
        assert_eq!(snapshot.processes[0].held, vec![1, 0]);
        assert_eq!(snapshot.resources[0].available, 2);
        assert_eq!(snapshot.resources[0].allocation, vec![0, 1, 0, 0]);
        assert_eq!(snapshot.resource_count(), 2);
    }

    #[test]
    fn end_to_end_queue_then_release() {
        // two types with two units each, three processes
        let mut state = SimulationState::new(2, 2, 3);
        for pid in 0..3 {
            state.admit(ProcessId(pid), SimTime(0)).unwrap();
        }
        state.request(SlotIndex(1), ResourceId(0)).unwrap();
        state.request(SlotIndex(0), ResourceId(0)).unwrap();
        assert_eq!(
            state.request(SlotIndex(0), ResourceId(0)).unwrap(),
            RequestOutcome::Enqueued
        );
        let immediate = state.stats().immediate_grants();
        let deferred = state.stats().deferred_grants();

        state.release(SlotIndex(1), ResourceId(0)).unwrap();
        assert_eq!(
            state.processes().get(SlotIndex(0)).unwrap().held(),
            &[2, 0]
        );
        assert_eq!(state.stats().immediate_grants(), immediate);
        assert_eq!(state.stats().deferred_grants(), deferred + 1);
        state.check_invariants().unwrap();
    }
}
