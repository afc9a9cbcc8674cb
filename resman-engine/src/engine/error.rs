use thiserror::Error;
use tokio::task::JoinError;

use resman_config::ConfigError;
use resman_core::types::ProcessId;
use resman_core::ResourceError;
use resman_simulator::WorkerError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Resource manager error: {0}")]
    Resource(#[from] ResourceError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Transport error for {identity}: {reason}")]
    Transport { identity: ProcessId, reason: String },

    #[error("Worker task failed: {0}")]
    Join(String),

    #[error("Telemetry error: {0}")]
    Telemetry(String),

    #[error("Hard timeout of {0} ms expired, all processes terminated")]
    HardTimeout(u64),
}

impl From<JoinError> for EngineError {
    fn from(err: JoinError) -> Self {
        EngineError::Join(err.to_string())
    }
}
