//! Shared error types for the provisioning system

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SharedError {
    #[error("Serialization failed: {message}")]
    SerializationError { message: String },

    #[error("Deserialization failed: {message}")]
    DeserializationError { message: String },

    #[error("Message protocol error: {message}")]
    ProtocolError { message: String },

    #[error("Driver command '{command}' could not be run: {message}")]
    DriverError { command: String, message: String },

    #[error("Driver command '{command}' is prohibited")]
    ProhibitedCommand { command: String },

    #[error("Unexpected output from '{command}': {message}")]
    ParseError { command: String, message: String },

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl SharedError {
    pub fn parse(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ParseError {
            command: command.into(),
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::ProtocolError { message: message.into() }
    }
}

pub type SharedResult<T> = Result<T, SharedError>;
