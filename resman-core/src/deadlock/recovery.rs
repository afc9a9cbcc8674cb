//! Iterative deadlock recovery: pick a victim, kill it, reclaim, replay queues.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::detector::detect;
use crate::error::{ResourceError, Result};
use crate::events::ReleasedUnits;
use crate::state::SimulationState;
use crate::types::{ProcessId, SlotIndex};

/// Terminates a worker and waits until it has fully exited.
#[async_trait]
pub trait ProcessReaper: Send {
    async fn kill_and_wait(&mut self, slot: SlotIndex, identity: ProcessId) -> Result<()>;
}

/// Chooses exactly one victim from a non-empty stuck set.
///
/// Implementations must be deterministic for a given state and stuck set.
pub trait VictimPolicy: Send + Sync {
    fn select(&self, state: &SimulationState, stuck: &[SlotIndex]) -> Option<SlotIndex>;
}

/// Built-in victim selection strategies. Ties break toward the lowest slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VictimStrategy {
    /// First stuck slot in ascending index order.
    #[default]
    LowestSlot,
    /// Stuck process holding the fewest units overall.
    FewestHeld,
    /// Stuck process with the latest start time.
    Youngest,
}

impl VictimPolicy for VictimStrategy {
    fn select(&self, state: &SimulationState, stuck: &[SlotIndex]) -> Option<SlotIndex> {
        let processes = state.processes();
        let candidates = stuck
            .iter()
            .copied()
            .filter(|&slot| processes.occupant(slot).is_ok());

        match self {
            VictimStrategy::LowestSlot => candidates.min(),
            VictimStrategy::FewestHeld => candidates.min_by_key(|&slot| {
                let held = processes.get(slot).map(|s| s.total_held()).unwrap_or(0);
                (held, slot)
            }),
            VictimStrategy::Youngest => candidates.min_by_key(|&slot| {
                let started = processes
                    .occupant(slot)
                    .map(|o| o.start_time)
                    .unwrap_or_default();
                (std::cmp::Reverse(started), slot)
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Victim {
    pub slot: SlotIndex,
    pub identity: ProcessId,
    pub released: Vec<ReleasedUnits>,
}

/// Victims killed during one recovery episode, in kill order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub victims: Vec<Victim>,
}

impl RecoveryReport {
    pub fn kills(&self) -> usize {
        self.victims.len()
    }
}

/// Kills stuck processes one at a time until the detector reports none.
///
/// Each cycle is one [`recover_step`]. Killing a stuck process never makes a
/// finishable one stuck, so the number of cycles is bounded by the occupied
/// slot count at entry.
pub async fn recover<P, R>(
    state: &mut SimulationState,
    policy: &P,
    reaper: &mut R,
) -> Result<RecoveryReport>
where
    P: VictimPolicy + ?Sized,
    R: ProcessReaper + ?Sized,
{
    let budget = state.running();
    let mut report = RecoveryReport::default();

    loop {
        if report.kills() >= budget && detect(state).is_deadlocked() {
            return Err(ResourceError::RecoveryStalled(report.kills()));
        }
        match recover_step(state, policy, reaper).await? {
            Some(victim) => report.victims.push(victim),
            None => break,
        }
    }

    Ok(report)
}

/// Runs one detect, select, kill and reclaim cycle.
///
/// Returns `None` without touching the tables when nothing is stuck.
pub async fn recover_step<P, R>(
    state: &mut SimulationState,
    policy: &P,
    reaper: &mut R,
) -> Result<Option<Victim>>
where
    P: VictimPolicy + ?Sized,
    R: ProcessReaper + ?Sized,
{
    let detection = detect(state);
    if !detection.is_deadlocked() {
        return Ok(None);
    }

    let stuck = detection.stuck();
    let slot = policy
        .select(state, stuck)
        .ok_or(ResourceError::NoVictim(stuck.len()))?;
    if !stuck.contains(&slot) {
        warn!(%slot, "victim policy chose a process outside the stuck set");
        return Err(ResourceError::Invariant(format!(
            "victim {slot} is not among the stuck processes"
        )));
    }

    let identity = state.processes().occupant(slot)?.identity;
    info!(%slot, %identity, "terminating process to remove deadlock");
    reaper.kill_and_wait(slot, identity).await?;

    let released = state.reclaim_victim(slot)?;
    info!(%slot, ?released, "victim terminated, resources released");
    Ok(Some(Victim {
        slot,
        identity,
        released,
    }))
}
