//! ## resman-telemetry::logging
//! **Structured logging with tracing and OpenTelemetry attributes**
//!
//! Everything the coordinator reports goes through `tracing`, so the optional
//! log-file mirror receives exactly what stdout receives.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use opentelemetry::KeyValue;
use resman_core::events::{AllocationEvent, ReleasedUnits};
use resman_core::types::SimTime;
use thiserror::Error;
use tracing::info_span;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Failed to open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to install subscriber: {0}")]
    Subscriber(String),
}

#[derive(Clone)]
pub struct EventLogger;

impl EventLogger {
    /// Installs the global subscriber. `RUST_LOG` overrides `level` when set.
    ///
    /// With a `mirror` path every line is written to stdout and to the file.
    pub fn init(level: &str, mirror: Option<&Path>) -> Result<(), TelemetryError> {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        let writer = match mirror {
            Some(path) => {
                let file = File::create(path).map_err(|source| TelemetryError::LogFile {
                    path: path.to_path_buf(),
                    source,
                })?;
                BoxMakeWriter::new(std::io::stdout.and(Mutex::new(file)))
            }
            None => BoxMakeWriter::new(std::io::stdout),
        };

        fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(mirror.is_none())
            .with_target(false)
            .try_init()
            .map_err(|e| TelemetryError::Subscriber(e.to_string()))
    }

    #[inline]
    pub fn log_event(event_type: &str, metadata: Vec<KeyValue>) {
        let span = info_span!("allocation_event", event_type = event_type, otel.kind = "INTERNAL");
        span.in_scope(|| {
            tracing::info!(metadata = ?metadata, "{}", event_type);
        });
    }

    /// Writes one line per core event, stamped with the simulated time.
    pub fn log_allocation_event(event: &AllocationEvent, now: SimTime) {
        match event {
            AllocationEvent::Admitted {
                slot,
                identity,
                start_time,
            } => {
                tracing::info!("Master launched {slot} ({identity}) at time {start_time}");
            }
            AllocationEvent::RequestObserved { slot, resource, .. } => {
                tracing::info!("Master has detected Process {slot} requesting {resource} at time {now}");
            }
            AllocationEvent::Granted {
                slot,
                resource,
                after_wait: false,
                ..
            } => {
                tracing::info!("Master granting {slot} request {resource} at time {now}");
            }
            AllocationEvent::Granted {
                slot,
                resource,
                after_wait: true,
                ..
            } => {
                tracing::info!("Master granting {slot} waiting on {resource} at time {now}");
            }
            AllocationEvent::Enqueued { slot, resource, .. } => {
                tracing::info!(
                    "Master: no instances of {resource} available, {slot} added to wait queue at time {now}"
                );
            }
            AllocationEvent::ReleaseAcknowledged { slot, resource, .. } => {
                tracing::info!("Master has acknowledged Process {slot} releasing {resource} at time {now}");
                tracing::info!("    Resources released: {resource}:1");
            }
            AllocationEvent::Terminated {
                slot,
                identity,
                reclaimed,
            } => {
                tracing::info!("Process {slot} ({identity}) terminated normally at time {now}");
                if !reclaimed.is_empty() {
                    tracing::info!("    Resources released: {}", format_units(reclaimed));
                }
            }
            AllocationEvent::DeadlockDetected { stuck } => {
                let names: Vec<String> = stuck.iter().map(ToString::to_string).collect();
                tracing::info!("Processes {} deadlocked", names.join(", "));
            }
            AllocationEvent::VictimTerminated { slot, released, .. } => {
                tracing::info!("    Master terminating {slot} to remove deadlock");
                tracing::info!("    Process {slot} terminated");
                tracing::info!("    Resources released: {}", format_units(released));
            }
        }
    }
}

/// `R0:2, R3:1`, or `none` for an empty list.
pub fn format_units(units: &[ReleasedUnits]) -> String {
    if units.is_empty() {
        return "none".into();
    }
    units
        .iter()
        .map(|u| format!("{}:{}", u.resource, u.units))
        .collect::<Vec<_>>()
        .join(", ")
}
