//! Simulated worker unit.
//!
//! A worker picks a random instant within `action_bound_ns`, then either
//! releases something it holds or requests one more unit, and blocks until the
//! coordinator answers. Every `termination_check_ns` it checks whether its
//! lifetime is over; once it is, it hands back everything it holds and exits.
//!
//! Between ticks a worker sleeps on the clock. Its [`WorkerProgress`] tells the
//! coordinator which tick it has finished acting on.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use resman_config::WorkerConfig;
use resman_core::protocol::{Message, MessageKind};
use resman_core::types::{ProcessId, ResourceId, SimTime};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::virtual_clock::VirtualClock;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkerError {
    #[error("{0} lost its connection to the coordinator")]
    Disconnected(ProcessId),

    #[error("{identity} expected a reply for {expected:?} but got {got:?}")]
    UnexpectedReply {
        identity: ProcessId,
        expected: Message,
        got: Message,
    },
}

/// How a worker task ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// Lifetime elapsed and every held unit was released.
    Finished,
    /// Stopped through its cancellation token.
    Cancelled,
}

/// Latest simulated time a worker has fully acted on.
///
/// The coordinator holds the clock until every live worker has caught up. A
/// worker parked on a reply never holds it back.
#[derive(Debug, Clone, Default)]
pub struct WorkerProgress(Arc<AtomicU64>);

impl WorkerProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&self, now: SimTime) {
        self.0.store(now.as_nanos(), Ordering::Release);
    }

    /// Blocked on the coordinator; any tick may pass.
    pub fn park(&self) {
        self.0.store(u64::MAX, Ordering::Release);
    }

    /// Requires the worker to observe the current tick again, e.g. after a reply.
    pub fn reset(&self) {
        self.0.store(0, Ordering::Release);
    }

    pub fn caught_up(&self, now: SimTime) -> bool {
        self.0.load(Ordering::Acquire) >= now.as_nanos()
    }
}

/// Transport endpoints of one worker: a shared coordinator inbox, a private
/// reply queue and the progress watermark the coordinator paces against.
pub struct WorkerChannels {
    pub outbox: mpsc::Sender<Message>,
    pub replies: mpsc::Receiver<Message>,
    pub progress: WorkerProgress,
}

/// Identity and catalogue shape handed to a worker at spawn time.
#[derive(Debug, Clone, Copy)]
pub struct WorkerSpec {
    pub identity: ProcessId,
    /// Admission time recorded in the process table.
    pub start: SimTime,
    pub resource_types: usize,
    /// Largest number of units of one type the worker will ever hold.
    pub max_claim: u32,
    pub seed: u64,
}

pub struct Worker {
    identity: ProcessId,
    start: SimTime,
    config: WorkerConfig,
    clock: VirtualClock,
    channels: WorkerChannels,
    cancel: CancellationToken,
    rng: StdRng,
    max_claim: u32,
    held: Vec<u32>,
}

impl Worker {
    pub fn new(
        spec: WorkerSpec,
        config: WorkerConfig,
        clock: VirtualClock,
        channels: WorkerChannels,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            identity: spec.identity,
            start: spec.start,
            config,
            clock,
            channels,
            cancel,
            rng: StdRng::seed_from_u64(spec.seed),
            max_claim: spec.max_claim,
            held: vec![0; spec.resource_types],
        }
    }

    pub fn identity(&self) -> ProcessId {
        self.identity
    }

    pub async fn run(mut self) -> Result<WorkerExit, WorkerError> {
        let mut ticks = self.clock.subscribe();
        let start = self.start;
        let mut next_action = self.schedule(start);
        let mut next_check = start.plus_nanos(self.config.termination_check_ns);
        debug!(identity = %self.identity, %start, "worker started");

        loop {
            if self.cancel.is_cancelled() {
                return Ok(WorkerExit::Cancelled);
            }

            let now = SimTime::from_nanos(*ticks.borrow_and_update());

            // an action due in the same tick as the lifetime check still happens
            if now >= next_action {
                if let Some(message) = self.choose_action() {
                    if self.exchange(message).await? == Some(WorkerExit::Cancelled) {
                        return Ok(WorkerExit::Cancelled);
                    }
                }
                next_action = self.schedule(self.clock.now());
            }

            if now >= next_check {
                next_check = now.plus_nanos(self.config.termination_check_ns);
                if now.since(start) >= self.config.lifetime_ns {
                    return self.retire().await;
                }
            }

            self.channels.progress.mark(now);
            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(WorkerExit::Cancelled),
                changed = ticks.changed() => {
                    changed.map_err(|_| WorkerError::Disconnected(self.identity))?
                }
            }
        }
    }

    fn schedule(&mut self, from: SimTime) -> SimTime {
        let bound = self.config.action_bound_ns.max(1);
        from.plus_nanos(self.rng.random_range(1..=bound))
    }

    /// Release with `release_probability`, otherwise request. `None` when no type qualifies.
    fn choose_action(&mut self) -> Option<Message> {
        let releasing = self.rng.random_bool(self.config.release_probability);
        let candidates: Vec<usize> = self
            .held
            .iter()
            .enumerate()
            .filter(|&(_, &held)| {
                if releasing {
                    held > 0
                } else {
                    held < self.max_claim
                }
            })
            .map(|(idx, _)| idx)
            .collect();

        if candidates.is_empty() {
            trace!(identity = %self.identity, releasing, "no eligible resource, rescheduling");
            return None;
        }
        let resource = ResourceId::new(candidates[self.rng.random_range(0..candidates.len())]);
        Some(if releasing {
            Message::release(self.identity, resource)
        } else {
            Message::request(self.identity, resource)
        })
    }

    /// Sends `message` and blocks until the coordinator answers it.
    async fn exchange(&mut self, message: Message) -> Result<Option<WorkerExit>, WorkerError> {
        self.channels.progress.park();
        self.channels
            .outbox
            .send(message)
            .await
            .map_err(|_| WorkerError::Disconnected(self.identity))?;

        let reply = tokio::select! {
            _ = self.cancel.cancelled() => return Ok(Some(WorkerExit::Cancelled)),
            reply = self.channels.replies.recv() => {
                reply.ok_or(WorkerError::Disconnected(self.identity))?
            }
        };

        if !reply.granted || reply.resource != message.resource || reply.kind != message.kind {
            return Err(WorkerError::UnexpectedReply {
                identity: self.identity,
                expected: message,
                got: reply,
            });
        }

        let held = &mut self.held[message.resource.as_usize()];
        match message.kind {
            MessageKind::Request => *held += 1,
            MessageKind::Release => *held = held.saturating_sub(1),
        }
        Ok(None)
    }

    /// Releases every held unit one at a time, waiting for each acknowledgement.
    async fn retire(mut self) -> Result<WorkerExit, WorkerError> {
        debug!(identity = %self.identity, held = ?self.held, "lifetime over, releasing everything");
        for idx in 0..self.held.len() {
            while self.held[idx] > 0 {
                let message = Message::release(self.identity, ResourceId::new(idx));
                if self.exchange(message).await? == Some(WorkerExit::Cancelled) {
                    return Ok(WorkerExit::Cancelled);
                }
            }
        }
        Ok(WorkerExit::Finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    const LIFETIME: u64 = 1_000_000;

    fn requests_only() -> WorkerConfig {
        WorkerConfig {
            action_bound_ns: 10,
            termination_check_ns: 100,
            lifetime_ns: LIFETIME,
            release_probability: 0.0,
        }
    }

    struct Harness {
        inbox: mpsc::Receiver<Message>,
        replies: mpsc::Sender<Message>,
        clock: VirtualClock,
        cancel: CancellationToken,
        progress: WorkerProgress,
    }

    impl Harness {
        /// Ticks the clock until the worker sends something or exits.
        async fn next_message(&mut self) -> Option<Message> {
            loop {
                tokio::select! {
                    biased;
                    message = self.inbox.recv() => return message,
                    _ = tokio::task::yield_now() => {
                        self.clock.advance(5);
                    }
                }
            }
        }
    }

    fn spawn_worker(
        config: WorkerConfig,
        start: SimTime,
    ) -> (
        Harness,
        tokio::task::JoinHandle<Result<WorkerExit, WorkerError>>,
    ) {
        let (outbox, inbox) = mpsc::channel(8);
        let (reply_tx, reply_rx) = mpsc::channel(8);
        let clock = VirtualClock::new(start.as_nanos());
        let cancel = CancellationToken::new();
        let progress = WorkerProgress::new();
        let worker = Worker::new(
            WorkerSpec {
                identity: ProcessId(9),
                start,
                resource_types: 2,
                max_claim: 1,
                seed: 7,
            },
            config,
            clock.clone(),
            WorkerChannels {
                outbox,
                replies: reply_rx,
                progress: progress.clone(),
            },
            cancel.clone(),
        );
        let handle = tokio::spawn(worker.run());
        (
            Harness {
                inbox,
                replies: reply_tx,
                clock,
                cancel,
                progress,
            },
            handle,
        )
    }

    #[tokio::test]
    async fn blocked_worker_stops_on_cancel() {
        let (mut harness, handle) = spawn_worker(requests_only(), SimTime::default());

        let message = harness.next_message().await.unwrap();
        assert_eq!(message.sender, ProcessId(9));
        assert_eq!(message.kind, MessageKind::Request);
        assert!(message.resource.as_usize() < 2);
        assert!(harness.progress.caught_up(SimTime::from_nanos(u64::MAX)));

        harness.cancel.cancel();
        assert_eq!(handle.await.unwrap(), Ok(WorkerExit::Cancelled));
    }

    #[tokio::test]
    async fn releases_holdings_before_exiting() {
        let (mut harness, handle) = spawn_worker(requests_only(), SimTime::default());

        let first = harness.next_message().await.unwrap();
        assert_eq!(first.kind, MessageKind::Request);
        harness.replies.send(first.reply()).await.unwrap();
        let mut held = BTreeSet::from([first.resource]);

        // past the lifetime, at most one more due request precedes the release round
        harness.clock.advance(10 * LIFETIME);
        while let Some(message) = harness.next_message().await {
            match message.kind {
                MessageKind::Request => assert!(held.insert(message.resource)),
                MessageKind::Release => assert!(held.remove(&message.resource)),
            }
            harness.replies.send(message.reply()).await.unwrap();
        }

        assert!(held.is_empty());
        assert_eq!(handle.await.unwrap(), Ok(WorkerExit::Finished));
    }

    #[tokio::test]
    async fn due_action_runs_before_lifetime_check() {
        let start = SimTime::from_nanos(1_000);
        let (mut harness, handle) = spawn_worker(requests_only(), start);
        // the worker has not been polled yet and first sees a clock far past its lifetime
        harness.clock.advance(100 * LIFETIME);

        let first = harness.next_message().await.unwrap();
        assert_eq!(first.kind, MessageKind::Request);

        harness.cancel.cancel();
        assert_eq!(handle.await.unwrap(), Ok(WorkerExit::Cancelled));
    }

    #[tokio::test]
    async fn idle_worker_reports_the_tick_it_acted_on() {
        // releasing with nothing held never sends, so the worker never parks
        let config = WorkerConfig {
            release_probability: 1.0,
            ..requests_only()
        };
        let start = SimTime::from_nanos(40);
        let (harness, handle) = spawn_worker(config, start);

        let mut now = start;
        for _ in 0..3 {
            now = harness.clock.advance(1);
            while !harness.progress.caught_up(now) {
                tokio::task::yield_now().await;
            }
        }
        assert!(harness.progress.caught_up(now));
        assert!(!harness.progress.caught_up(now.plus_nanos(1)));

        harness.progress.reset();
        assert!(!harness.progress.caught_up(now));

        harness.cancel.cancel();
        assert_eq!(handle.await.unwrap(), Ok(WorkerExit::Cancelled));
    }

    #[tokio::test]
    async fn mismatched_reply_is_an_error() {
        let (mut harness, handle) = spawn_worker(requests_only(), SimTime::default());

        let request = harness.next_message().await.unwrap();
        let wrong = Message {
            resource: ResourceId::new(request.resource.as_usize() ^ 1),
            ..request.reply()
        };
        harness.replies.send(wrong).await.unwrap();

        assert!(matches!(
            handle.await.unwrap(),
            Err(WorkerError::UnexpectedReply { .. })
        ));
    }

    #[tokio::test]
    async fn dropped_coordinator_disconnects() {
        let (harness, handle) = spawn_worker(requests_only(), SimTime::default());
        drop(harness.inbox);

        while !handle.is_finished() {
            harness.clock.advance(5);
            tokio::task::yield_now().await;
        }
        assert_eq!(
            handle.await.unwrap(),
            Err(WorkerError::Disconnected(ProcessId(9)))
        );
    }
}
