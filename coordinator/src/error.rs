//! Coordinator-specific error types

use shared::SharedError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Utilization probe failed: {message}")]
    ProbeError { message: String },

    #[error("Snapshot persistence failed: {operation} on {path}: {message}")]
    PersistenceError {
        operation: String,
        path: String,
        message: String,
    },

    #[error("Failed to spawn worker {worker_id}: {message}")]
    WorkerSpawnFailed { worker_id: u32, message: String },

    #[error("Network communication error: {message}")]
    NetworkError { message: String },

    #[error("Shared component error: {0}")]
    SharedError(#[from] SharedError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl CoordinatorError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigurationError { message: message.into() }
    }

    pub fn communication(message: impl Into<String>) -> Self {
        Self::NetworkError { message: message.into() }
    }

    pub fn probe(message: impl Into<String>) -> Self {
        Self::ProbeError { message: message.into() }
    }
}

pub type CoordinatorResult<T> = Result<T, CoordinatorError>;
