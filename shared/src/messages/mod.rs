//! Message types exchanged between processes
//!
//! - `ledger`: Worker ↔ Coordinator resource ledger calls
//! - `action`: Front end ↔ Worker named action invocations

pub mod action;
pub mod ledger;

pub use action::{ActionOutcome, ActionRequest, OutputLine, OutputStream};
pub use ledger::{LedgerRequest, LedgerResponse};
