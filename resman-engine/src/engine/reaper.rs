//! Bookkeeping for live worker tasks: reply routing, reaping and forced termination.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use resman_core::deadlock::ProcessReaper;
use resman_core::protocol::Message;
use resman_core::types::{ProcessId, SimTime, SlotIndex};
use resman_core::ResourceError;
use resman_simulator::{WorkerError, WorkerExit, WorkerProgress};

use super::error::EngineError;

pub type WorkerResult = Result<WorkerExit, WorkerError>;

struct WorkerHandle {
    task: JoinHandle<WorkerResult>,
    replies: mpsc::Sender<Message>,
    cancel: CancellationToken,
    progress: WorkerProgress,
}

#[derive(Default)]
pub struct WorkerRegistry {
    workers: BTreeMap<ProcessId, WorkerHandle>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        identity: ProcessId,
        task: JoinHandle<WorkerResult>,
        replies: mpsc::Sender<Message>,
        cancel: CancellationToken,
        progress: WorkerProgress,
    ) {
        self.workers.insert(
            identity,
            WorkerHandle {
                task,
                replies,
                cancel,
                progress,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn contains(&self, identity: ProcessId) -> bool {
        self.workers.contains_key(&identity)
    }

    /// True when every live worker has acted on `now` or is parked on a reply.
    pub fn caught_up(&self, now: SimTime) -> bool {
        self.workers
            .values()
            .all(|worker| worker.task.is_finished() || worker.progress.caught_up(now))
    }

    /// Queues `reply` for its addressee without waiting.
    ///
    /// The addressee must catch up again before the clock moves on.
    pub fn reply(&self, reply: Message) -> Result<(), EngineError> {
        let identity = reply.sender;
        let worker = self
            .workers
            .get(&identity)
            .ok_or_else(|| EngineError::Transport {
                identity,
                reason: "no worker task for reply".into(),
            })?;
        worker.progress.reset();
        worker.replies.try_send(reply).map_err(|e| {
            let reason = match e {
                TrySendError::Full(_) => "reply queue full",
                TrySendError::Closed(_) => "reply queue closed",
            };
            EngineError::Transport {
                identity,
                reason: reason.into(),
            }
        })
    }

    /// Removes and returns every worker whose task has already ended.
    pub async fn reap_finished(&mut self) -> Vec<(ProcessId, Result<WorkerResult, JoinError>)> {
        let finished: Vec<ProcessId> = self
            .workers
            .iter()
            .filter(|(_, worker)| worker.task.is_finished())
            .map(|(&identity, _)| identity)
            .collect();

        let mut reaped = Vec::with_capacity(finished.len());
        for identity in finished {
            if let Some(worker) = self.workers.remove(&identity) {
                reaped.push((identity, worker.task.await));
            }
        }
        reaped
    }

    /// Cancels and aborts every worker, then waits for all of them to exit.
    pub async fn shutdown_all(&mut self) {
        let workers = std::mem::take(&mut self.workers);
        for worker in workers.values() {
            worker.cancel.cancel();
            worker.task.abort();
        }
        for (identity, worker) in workers {
            if let Err(e) = worker.task.await {
                if !e.is_cancelled() {
                    warn!(%identity, "worker panicked during shutdown: {e}");
                }
            }
        }
    }
}

#[async_trait]
impl ProcessReaper for WorkerRegistry {
    async fn kill_and_wait(&mut self, slot: SlotIndex, identity: ProcessId) -> Result<(), ResourceError> {
        let worker = self
            .workers
            .remove(&identity)
            .ok_or_else(|| ResourceError::Termination {
                identity,
                reason: format!("no worker task for {slot}"),
            })?;

        worker.cancel.cancel();
        worker.task.abort();
        match worker.task.await {
            Err(e) if e.is_panic() => Err(ResourceError::Termination {
                identity,
                reason: e.to_string(),
            }),
            _ => {
                debug!(%slot, %identity, "worker task ended");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::pending;

    fn parked_worker(
        registry: &mut WorkerRegistry,
        identity: ProcessId,
    ) -> (mpsc::Receiver<Message>, WorkerProgress) {
        let (tx, rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let progress = WorkerProgress::new();
        progress.park();
        let task = tokio::spawn(async move {
            pending::<()>().await;
            Ok::<_, WorkerError>(WorkerExit::Finished)
        });
        registry.insert(identity, task, tx, cancel, progress.clone());
        (rx, progress)
    }

    #[tokio::test]
    async fn kill_waits_for_the_task() {
        let mut registry = WorkerRegistry::new();
        let _parked = parked_worker(&mut registry, ProcessId(3));

        registry
            .kill_and_wait(SlotIndex(0), ProcessId(3))
            .await
            .unwrap();
        assert!(registry.is_empty());

        let err = registry
            .kill_and_wait(SlotIndex(0), ProcessId(3))
            .await
            .unwrap_err();
        assert!(matches!(err, ResourceError::Termination { .. }));
    }

    #[tokio::test]
    async fn replies_reach_the_addressee() {
        let mut registry = WorkerRegistry::new();
        let (mut rx, progress) = parked_worker(&mut registry, ProcessId(5));
        assert!(registry.caught_up(SimTime::from_nanos(10)));

        let reply = Message::request(ProcessId(5), resman_core::types::ResourceId(1)).reply();
        registry.reply(reply).unwrap();
        assert_eq!(rx.recv().await, Some(reply));

        // the woken worker holds the clock until it acts on the current tick
        assert!(!registry.caught_up(SimTime::from_nanos(10)));
        progress.mark(SimTime::from_nanos(10));
        assert!(registry.caught_up(SimTime::from_nanos(10)));

        let stray = Message::request(ProcessId(6), resman_core::types::ResourceId(1)).reply();
        assert!(matches!(
            registry.reply(stray),
            Err(EngineError::Transport { .. })
        ));
        registry.shutdown_all().await;
    }

    #[tokio::test]
    async fn finished_tasks_are_reaped() {
        let mut registry = WorkerRegistry::new();
        let (tx, _rx) = mpsc::channel(1);
        let task = tokio::spawn(async { Ok::<_, WorkerError>(WorkerExit::Finished) });
        registry.insert(
            ProcessId(1),
            task,
            tx,
            CancellationToken::new(),
            WorkerProgress::new(),
        );
        let _parked = parked_worker(&mut registry, ProcessId(2));

        let mut reaped = Vec::new();
        while reaped.is_empty() {
            tokio::task::yield_now().await;
            reaped = registry.reap_finished().await;
        }
        assert_eq!(reaped.len(), 1);
        assert_eq!(reaped[0].0, ProcessId(1));
        assert!(matches!(reaped[0].1, Ok(Ok(WorkerExit::Finished))));
        assert!(registry.contains(ProcessId(2)));
        registry.shutdown_all().await;
    }
}
