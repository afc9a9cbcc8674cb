//! Coordinator loop - owns the allocation state and drives workers, detection and recovery
use std::sync::Arc;
use std::time::Duration;

use opentelemetry::KeyValue;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use resman_config::ResmanConfig;
use resman_core::deadlock::{detect, recover, VictimStrategy};
use resman_core::protocol::{Message, MessageKind};
use resman_core::snapshot::SystemSnapshot;
use resman_core::stats::AllocationStats;
use resman_core::types::{ProcessId, SimTime};
use resman_core::SimulationState;
use resman_simulator::{
    VirtualClock, Worker, WorkerChannels, WorkerExit, WorkerProgress, WorkerSpec,
};
use resman_telemetry::{logging::EventLogger, report, MetricsRecorder};

use super::admission::AdmissionControl;
use super::error::EngineError;
use super::reaper::WorkerRegistry;

const INBOX_CAPACITY: usize = 64;
const REPLY_CAPACITY: usize = 4;

/// Outcome of a run that ended with every process launched and gone.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub stats: AllocationStats,
    pub snapshot: SystemSnapshot,
    pub finished_at: SimTime,
    pub launched: usize,
}

/// Single-threaded coordinator. Worker tasks only reach it through the inbox.
pub struct SimulationRuntime {
    config: Arc<ResmanConfig>,
    state: SimulationState,
    clock: VirtualClock,
    registry: WorkerRegistry,
    admission: AdmissionControl,
    policy: VictimStrategy,
    metrics: MetricsRecorder,
    inbox_tx: mpsc::Sender<Message>,
    inbox: mpsc::Receiver<Message>,
    next_detection: SimTime,
    next_report: SimTime,
    next_identity: u64,
    seed: u64,
}

impl SimulationRuntime {
    /// Builds the tables from a validated configuration.
    pub fn new(config: ResmanConfig) -> Result<Self, EngineError> {
        let config = config.validated()?;
        info!("Initializing resource manager");
        debug!("Core config: {:?}", config.core);

        let sim = &config.simulator;
        let state = SimulationState::new(
            config.core.resource_types,
            config.core.instances_per_type,
            sim.max_concurrent,
        );
        let admission =
            AdmissionControl::new(sim.total_processes, sim.max_concurrent, sim.spawn_interval_ns());
        let metrics = MetricsRecorder::new().map_err(|e| EngineError::Telemetry(e.to_string()))?;
        let (inbox_tx, inbox) = mpsc::channel(INBOX_CAPACITY);
        let seed = sim.seed.unwrap_or_else(rand::random);
        let next_detection = SimTime::from_nanos(sim.detection_interval_ns);

        Ok(Self {
            policy: config.core.victim_policy,
            config: Arc::new(config),
            state,
            clock: VirtualClock::new(0),
            registry: WorkerRegistry::new(),
            admission,
            metrics,
            inbox_tx,
            inbox,
            next_detection,
            next_report: SimTime::default(),
            next_identity: 1,
            seed,
        })
    }

    pub fn metrics(&self) -> &MetricsRecorder {
        &self.metrics
    }

    /// Runs to completion, aborting after the configured wall-clock budget.
    pub async fn run(self) -> Result<RunSummary, EngineError> {
        let limit = Duration::from_millis(self.config.simulator.hard_timeout_ms);
        let token = CancellationToken::new();
        let alarm = tokio::spawn({
            let token = token.clone();
            async move {
                tokio::time::sleep(limit).await;
                token.cancel();
            }
        });

        let result = self.run_until(token).await;
        alarm.abort();
        result
    }

    /// Runs until every process has been launched and has left, or `token` fires.
    #[instrument(skip_all, fields(seed = self.seed))]
    pub async fn run_until(mut self, token: CancellationToken) -> Result<RunSummary, EngineError> {
        info!(
            "Starting run: {} processes, at most {} at once",
            self.config.simulator.total_processes, self.config.simulator.max_concurrent
        );

        if let Err(e) = self.drive(&token).await {
            match &e {
                EngineError::HardTimeout(_) => error!("{e}"),
                other => error!("Run aborted: {other}"),
            }
            self.registry.shutdown_all().await;
            return Err(e);
        }

        self.state.check_invariants()?;
        let finished_at = self.clock.now();
        info!("{}", report::render_final_statistics(self.state.stats()));
        self.metrics
            .update(self.state.stats(), self.state.running());

        Ok(RunSummary {
            stats: self.state.stats().clone(),
            snapshot: self.state.snapshot(),
            finished_at,
            launched: self.admission.launched(),
        })
    }

    async fn drive(&mut self, token: &CancellationToken) -> Result<(), EngineError> {
        let sim = self.config.simulator.clone();
        loop {
            if token.is_cancelled() {
                return Err(EngineError::HardTimeout(sim.hard_timeout_ms));
            }
            if self.admission.all_launched() && self.state.running() == 0 {
                return Ok(());
            }

            // time only moves once every live worker has acted on the current tick
            let now = if self.registry.caught_up(self.clock.now()) {
                self.clock.advance(sim.tick_ns)
            } else {
                self.clock.now()
            };

            self.reap_finished(now).await?;

            if now >= self.next_detection {
                self.next_detection = now.plus_nanos(sim.detection_interval_ns);
                self.detect_and_recover(now).await?;
            }

            if now >= self.next_report {
                self.next_report = now.plus_nanos(sim.report_interval_ns);
                self.report(now);
            }

            if self.admission.should_spawn(now, self.state.running()) {
                self.spawn_worker(token)?;
            }

            match self.inbox.try_recv() {
                Ok(message) => self.handle_message(message)?,
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => {
                    return Err(EngineError::Join("coordinator inbox closed".into()))
                }
            }

            tokio::task::yield_now().await;
        }
    }

    async fn reap_finished(&mut self, now: SimTime) -> Result<(), EngineError> {
        for (identity, outcome) in self.registry.reap_finished().await {
            match outcome? {
                Ok(WorkerExit::Finished) => {}
                Ok(WorkerExit::Cancelled) => {
                    warn!(%identity, "worker stopped through its token outside recovery")
                }
                Err(e) => return Err(e.into()),
            }
            if let Some(slot) = self.state.slot_of(identity) {
                self.state.terminate_normally(slot)?;
                self.flush_events(now)?;
            }
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn detect_and_recover(&mut self, now: SimTime) -> Result<(), EngineError> {
        let detection = detect(&self.state);
        self.state.record_detection(detection.stuck());
        if !detection.is_deadlocked() {
            info!("Master running deadlock detection at time {now}: No deadlocks detected");
            return Ok(());
        }

        info!("Master running deadlock detection at time {now}:");
        self.flush_events(now)?;

        let recovery = recover(&mut self.state, &self.policy, &mut self.registry).await?;
        self.metrics.observe_recovery(recovery.kills());
        self.flush_events(now)?;
        EventLogger::log_event(
            "deadlock_recovery",
            vec![
                KeyValue::new("victims", recovery.kills() as i64),
                KeyValue::new("time", now.to_string()),
            ],
        );
        info!("System is no longer in deadlock");
        Ok(())
    }

    fn report(&self, now: SimTime) {
        if self.config.telemetry.print_tables {
            info!("\n{}", report::render_tables(&self.state.snapshot(), now));
        }
        self.metrics
            .update(self.state.stats(), self.state.running());
    }

    fn spawn_worker(&mut self, token: &CancellationToken) -> Result<(), EngineError> {
        let identity = ProcessId(self.next_identity);
        self.next_identity += 1;

        let start = self.clock.advance(self.config.simulator.overhead_ns);
        self.state.admit(identity, start)?;

        let (reply_tx, replies) = mpsc::channel(REPLY_CAPACITY);
        let cancel = token.child_token();
        let progress = WorkerProgress::new();
        let worker = Worker::new(
            WorkerSpec {
                identity,
                start,
                resource_types: self.config.core.resource_types,
                max_claim: self.config.core.instances_per_type,
                seed: self.seed.wrapping_add(identity.0.wrapping_mul(0x9E37_79B9_7F4A_7C15)),
            },
            self.config.simulator.worker.clone(),
            self.clock.clone(),
            WorkerChannels {
                outbox: self.inbox_tx.clone(),
                replies,
                progress: progress.clone(),
            },
            cancel.clone(),
        );
        let task = tokio::spawn(worker.run());
        self.registry.insert(identity, task, reply_tx, cancel, progress);
        self.admission.record_launch(start);
        self.flush_events(start)
    }

    fn handle_message(&mut self, message: Message) -> Result<(), EngineError> {
        let now = self.clock.now();
        let Some(slot) = self.state.slot_of(message.sender) else {
            warn!(sender = %message.sender, "dropping message from a process that is no longer resident");
            return Ok(());
        };

        match message.kind {
            MessageKind::Request => {
                self.state.request(slot, message.resource)?;
            }
            MessageKind::Release => self.state.release(slot, message.resource)?,
        }
        self.flush_events(now)
    }

    /// Logs every pending event and routes the replies they owe.
    fn flush_events(&mut self, now: SimTime) -> Result<(), EngineError> {
        for event in self.state.drain_events() {
            EventLogger::log_allocation_event(&event, now);
            if let Some(reply) = event.reply() {
                // a waiter granted during recovery may have been killed afterwards
                if self.state.slot_of(reply.sender).is_none() {
                    debug!(identity = %reply.sender, "skipping reply to terminated process");
                    continue;
                }
                self.registry.reply(reply)?;
            }
        }
        Ok(())
    }
}
