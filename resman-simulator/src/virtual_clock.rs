//! # Virtual Clock for Simulation
//!
//! Shared simulated clock. The coordinator is the only writer. Every advance
//! is published on a watch channel so workers sleep until time moves instead
//! of polling it.

use std::sync::Arc;

use resman_core::types::SimTime;
use tokio::sync::watch;

#[derive(Clone)]
pub struct VirtualClock {
    ticks: Arc<watch::Sender<u64>>,
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new(0)
    }
}

impl VirtualClock {
    /// Creates a clock starting at `start_ns`.
    pub fn new(start_ns: u64) -> Self {
        let (ticks, _) = watch::channel(start_ns);
        Self {
            ticks: Arc::new(ticks),
        }
    }

    #[inline]
    pub fn now_ns(&self) -> u64 {
        *self.ticks.borrow()
    }

    #[inline]
    pub fn now(&self) -> SimTime {
        SimTime::from_nanos(self.now_ns())
    }

    /// Advances the clock, wakes every subscriber and returns the new time.
    pub fn advance(&self, ns: u64) -> SimTime {
        let mut now = 0;
        self.ticks.send_modify(|t| {
            *t = t.saturating_add(ns);
            now = *t;
        });
        SimTime::from_nanos(now)
    }

    /// Receiver that resolves `changed()` on every later advance.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.ticks.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_initial_value() {
        let clock = VirtualClock::new(100);
        assert_eq!(clock.now_ns(), 100);
    }

    #[test]
    fn test_clock_advance() {
        let clock = VirtualClock::new(0);
        assert_eq!(clock.advance(500), SimTime::from_nanos(500));
        clock.advance(1_000_000_000);
        assert_eq!(clock.now().to_string(), "1:000000500");
    }

    #[test]
    fn clones_share_time() {
        let clock = VirtualClock::default();
        let reader = clock.clone();
        clock.advance(42);
        assert_eq!(reader.now_ns(), 42);
    }

    #[tokio::test]
    async fn subscribers_wake_on_advance() {
        let clock = VirtualClock::default();
        let mut ticks = clock.subscribe();
        assert!(!ticks.has_changed().unwrap());

        clock.advance(7);
        ticks.changed().await.unwrap();
        assert_eq!(*ticks.borrow_and_update(), 7);
    }
}
