//! Spawn gating: total budget, concurrency cap and minimum launch interval.

use resman_core::types::SimTime;

#[derive(Debug, Clone)]
pub struct AdmissionControl {
    total: usize,
    max_concurrent: usize,
    interval_ns: u64,
    launched: usize,
    next_spawn: SimTime,
}

impl AdmissionControl {
    pub fn new(total: usize, max_concurrent: usize, interval_ns: u64) -> Self {
        Self {
            total,
            max_concurrent,
            interval_ns,
            launched: 0,
            next_spawn: SimTime::default(),
        }
    }

    /// True when the interval has elapsed, the budget is not spent and a slot is free.
    pub fn should_spawn(&self, now: SimTime, running: usize) -> bool {
        now >= self.next_spawn && self.launched < self.total && running < self.max_concurrent
    }

    pub fn record_launch(&mut self, now: SimTime) {
        self.launched += 1;
        self.next_spawn = now.plus_nanos(self.interval_ns);
    }

    pub fn launched(&self) -> usize {
        self.launched
    }

    pub fn all_launched(&self) -> bool {
        self.launched >= self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn respects_interval_and_cap() {
        let mut admission = AdmissionControl::new(3, 2, 100);
        assert!(admission.should_spawn(SimTime(0), 0));
        admission.record_launch(SimTime(0));

        assert!(!admission.should_spawn(SimTime(50), 1));
        assert!(admission.should_spawn(SimTime(100), 1));
        admission.record_launch(SimTime(100));

        assert!(!admission.should_spawn(SimTime(500), 2));
        assert!(admission.should_spawn(SimTime(500), 1));
        admission.record_launch(SimTime(500));

        assert!(admission.all_launched());
        assert!(!admission.should_spawn(SimTime(10_000), 0));
        assert_eq!(admission.launched(), 3);
    }
}
