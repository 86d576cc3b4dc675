//! Coordinator library for the provisioning system
//!
//! The coordinator is the single owner of the resource ledger. Worker
//! processes reach it over a request/response channel; every snapshot read,
//! debit and replacement is applied on the coordinator's one event loop, so
//! the ledger itself needs no locking.

pub mod coordinator;
pub mod core;
pub mod error;
pub mod services;
pub mod traits;

pub use crate::core::CoordinatorState;
pub use coordinator::{Coordinator, CoordinatorSettings};
pub use error::{CoordinatorError, CoordinatorResult};
pub use traits::{LedgerCall, LedgerListener, SnapshotStore, WorkerManager};
pub use traits::{MockLedgerListener, MockSnapshotStore, MockWorkerManager};
