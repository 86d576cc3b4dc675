//! Worker error types

use shared::SharedError;
use thiserror::Error;

/// Result type for provisioning operations
pub type ProvisionResult<T> = Result<T, ProvisionError>;

#[derive(Error, Debug)]
pub enum ProvisionError {
    /// Unknown datacenter, OS or network; raised before anything is mutated
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("No resource found: {message}")]
    ResourceUnavailable { message: String },

    #[error("No address available: {message}")]
    AddressExhausted { message: String },

    #[error("Driver command '{command}' failed: {message}")]
    DriverFailure { command: String, message: String },

    #[error("Could not attach ethernet-{index} to {vm}: {message}")]
    InterfaceAttachFailed { vm: String, index: u32, message: String },

    #[error("Inventory error: {message}")]
    Inventory { message: String },

    #[error("Timed out after {seconds}s waiting for {what}")]
    Timeout { what: String, seconds: u64 },

    #[error("Ledger error: {message}")]
    Ledger { message: String },

    #[error("Remote command on {host} failed: {message}")]
    Remote { host: String, message: String },

    #[error("Cancelled: {message}")]
    Cancelled { message: String },

    #[error("Shared component error: {0}")]
    Shared(#[from] SharedError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ProvisionError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::ResourceUnavailable { message: message.into() }
    }

    pub fn exhausted(message: impl Into<String>) -> Self {
        Self::AddressExhausted { message: message.into() }
    }

    pub fn driver(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DriverFailure {
            command: command.into(),
            message: message.into(),
        }
    }

    pub fn inventory(message: impl Into<String>) -> Self {
        Self::Inventory { message: message.into() }
    }

    pub fn ledger(message: impl Into<String>) -> Self {
        Self::Ledger { message: message.into() }
    }
}
