//! Work/finish safety test over the current allocation state.

use crate::state::SimulationState;
use crate::types::SlotIndex;

/// Occupied slots that cannot be shown to finish, in ascending order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectionReport {
    stuck: Vec<SlotIndex>,
}

impl DetectionReport {
    pub fn stuck(&self) -> &[SlotIndex] {
        &self.stuck
    }

    pub fn is_deadlocked(&self) -> bool {
        !self.stuck.is_empty()
    }
}

/// Runs the safety algorithm over every slot of the table.
///
/// Vacant slots count as finished. An occupied slot finishes when each of its
/// pending requests fits in `work`; its allocation is then added to `work` and
/// the scan restarts from slot 0. Each restart grows the finished set, so the
/// scan stops after at most N restarts.
pub fn detect(state: &SimulationState) -> DetectionReport {
    let finish = safety_scan(state);
    let stuck = state
        .processes()
        .iter_occupied()
        .filter(|(slot, _)| !finish[slot.as_usize()])
        .map(|(slot, _)| slot)
        .collect();
    DetectionReport { stuck }
}

fn safety_scan(state: &SimulationState) -> Vec<bool> {
    let resources = state.resources();
    let processes = state.processes();
    let slots = processes.capacity();

    let mut work = resources.available_vector();
    let mut finish = vec![false; slots];

    let mut i = 0;
    while i < slots {
        if finish[i] {
            i += 1;
            continue;
        }
        let slot = SlotIndex::new(i);
        let occupied = processes.get(slot).map(|s| s.is_occupied()).unwrap_or(false);
        if !occupied {
            finish[i] = true;
            i += 1;
            continue;
        }

        let satisfiable = resources
            .iter()
            .all(|(resource, kind)| kind.pending(slot) <= work[resource.as_usize()]);
        if satisfiable {
            finish[i] = true;
            for (resource, kind) in resources.iter() {
                work[resource.as_usize()] += kind.allocation(slot);
            }
            i = 0;
            continue;
        }
        i += 1;
    }
    finish
}
