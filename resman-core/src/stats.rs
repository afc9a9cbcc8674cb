//! ## resman-core::stats
//! **End-of-run allocation statistics**
//!
//! Counters are owned by `SimulationState` and only move forward. The engine
//! reads them for the final report and for metrics export.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::types::ProcessId;

#[derive(Debug, Clone, Default, Serialize)]
pub struct AllocationStats {
    immediate_grants: u64,
    deferred_grants: u64,
    normal_terminations: u64,
    detection_runs: u64,
    deadlock_detections: u64,
    victims_killed: u64,
    #[serde(skip)]
    stuck_identities: BTreeSet<ProcessId>,
}

impl AllocationStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn increment_immediate_grants(&mut self) {
        self.immediate_grants += 1;
    }

    #[inline]
    pub(crate) fn increment_deferred_grants(&mut self) {
        self.deferred_grants += 1;
    }

    #[inline]
    pub(crate) fn increment_normal_terminations(&mut self) {
        self.normal_terminations += 1;
    }

    #[inline]
    pub(crate) fn increment_victims_killed(&mut self) {
        self.victims_killed += 1;
    }

    /// Counts one detector run and, when it found a deadlock, the stuck identities.
    pub(crate) fn record_detection<I>(&mut self, stuck: I)
    where
        I: IntoIterator<Item = ProcessId>,
    {
        self.detection_runs += 1;
        let mut deadlocked = false;
        for identity in stuck {
            deadlocked = true;
            self.stuck_identities.insert(identity);
        }
        if deadlocked {
            self.deadlock_detections += 1;
        }
    }

    /// Requests granted on arrival.
    pub fn immediate_grants(&self) -> u64 {
        self.immediate_grants
    }

    /// Requests granted after waiting in a queue.
    pub fn deferred_grants(&self) -> u64 {
        self.deferred_grants
    }

    pub fn normal_terminations(&self) -> u64 {
        self.normal_terminations
    }

    /// All detector runs, deadlocked or not.
    pub fn detection_runs(&self) -> u64 {
        self.detection_runs
    }

    /// Detector runs that found at least one stuck process.
    pub fn deadlock_detections(&self) -> u64 {
        self.deadlock_detections
    }

    pub fn victims_killed(&self) -> u64 {
        self.victims_killed
    }

    /// Distinct processes ever reported stuck.
    pub fn stuck_processes(&self) -> u64 {
        self.stuck_identities.len() as u64
    }

    /// Percentage of stuck processes that recovery had to kill, 0.0 without deadlocks.
    pub fn kill_percentage(&self) -> f64 {
        match self.stuck_processes() {
            0 => 0.0,
            stuck => 100.0 * self.victims_killed as f64 / stuck as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection_counts_distinct_identities() {
        let mut stats = AllocationStats::new();
        stats.record_detection([ProcessId(1), ProcessId(2)]);
        stats.record_detection(std::iter::empty());
        stats.record_detection([ProcessId(2), ProcessId(3)]);

        assert_eq!(stats.detection_runs(), 3);
        assert_eq!(stats.deadlock_detections(), 2);
        assert_eq!(stats.stuck_processes(), 3);
    }

    #[test]
    fn kill_percentage_handles_empty_history() {
        let mut stats = AllocationStats::new();
        assert_eq!(stats.kill_percentage(), 0.0);

        stats.record_detection([ProcessId(1), ProcessId(2), ProcessId(3), ProcessId(4)]);
        stats.increment_victims_killed();
        assert!((stats.kill_percentage() - 25.0).abs() < f64::EPSILON);
    }
}
