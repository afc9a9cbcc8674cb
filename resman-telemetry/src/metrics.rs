//! ## resman-telemetry::metrics
//! **Prometheus gauges for the allocation counters**
//!
//! The gauges mirror `AllocationStats` and are refreshed on the report cadence;
//! the histogram records how many victims each recovery episode needed.

use prometheus::{Histogram, HistogramOpts, IntGauge, Registry};
use resman_core::stats::AllocationStats;

#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    pub registry: Registry,
    pub immediate_grants: IntGauge,
    pub deferred_grants: IntGauge,
    pub normal_terminations: IntGauge,
    pub detection_runs: IntGauge,
    pub deadlock_detections: IntGauge,
    pub victims_killed: IntGauge,
    pub running_processes: IntGauge,
    pub victims_per_recovery: Histogram,
}

impl MetricsRecorder {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let gauge = |name: &str, help: &str| -> Result<IntGauge, prometheus::Error> {
            let gauge = IntGauge::new(name, help)?;
            registry.register(Box::new(gauge.clone()))?;
            Ok(gauge)
        };

        let immediate_grants = gauge("resman_immediate_grants", "Requests granted on arrival")?;
        let deferred_grants = gauge(
            "resman_deferred_grants",
            "Requests granted after waiting in a queue",
        )?;
        let normal_terminations = gauge(
            "resman_normal_terminations",
            "Processes that exited on their own",
        )?;
        let detection_runs = gauge("resman_detection_runs", "Deadlock detector invocations")?;
        let deadlock_detections = gauge(
            "resman_deadlock_detections",
            "Detector runs that found a deadlock",
        )?;
        let victims_killed = gauge(
            "resman_victims_killed",
            "Processes terminated by deadlock recovery",
        )?;
        let running_processes = gauge("resman_running_processes", "Occupied process slots")?;

        let victims_per_recovery = Histogram::with_opts(
            HistogramOpts::new(
                "resman_victims_per_recovery",
                "Processes killed in one recovery episode",
            )
            .buckets(vec![1.0, 2.0, 4.0, 8.0, 18.0]),
        )?;
        registry.register(Box::new(victims_per_recovery.clone()))?;

        Ok(Self {
            registry,
            immediate_grants,
            deferred_grants,
            normal_terminations,
            detection_runs,
            deadlock_detections,
            victims_killed,
            running_processes,
            victims_per_recovery,
        })
    }

    pub fn update(&self, stats: &AllocationStats, running: usize) {
        self.immediate_grants.set(stats.immediate_grants() as i64);
        self.deferred_grants.set(stats.deferred_grants() as i64);
        self.normal_terminations
            .set(stats.normal_terminations() as i64);
        self.detection_runs.set(stats.detection_runs() as i64);
        self.deadlock_detections
            .set(stats.deadlock_detections() as i64);
        self.victims_killed.set(stats.victims_killed() as i64);
        self.running_processes.set(running as i64);
    }

    pub fn observe_recovery(&self, victims: usize) {
        self.victims_per_recovery.observe(victims as f64);
    }

    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
