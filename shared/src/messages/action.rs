//! Named action invocation
//!
//! The request-handling front end calls workers with an action name and a flat
//! argument list and gets back a result value plus every diagnostic line the
//! action produced.

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ActionRequest {
    pub request_id: String,
    pub action: String,
    pub args: Vec<String>,
    /// Account the request is made on behalf of
    pub user: Option<String>,
}

/// Which stream a diagnostic line was written to
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub line: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ActionOutcome {
    pub request_id: String,
    pub success: bool,
    /// JSON encoded return value; bincode cannot carry `serde_json::Value` directly
    pub value: String,
    pub output: Vec<OutputLine>,
    pub error: Option<String>,
}
