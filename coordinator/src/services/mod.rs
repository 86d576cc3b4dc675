//! Service implementations
//!
//! Real implementations of the coordinator's service traits.

pub mod communicator;
pub mod snapshot_store;
pub mod worker_manager;

#[cfg(test)]
pub mod tests;

pub use communicator::TcpLedgerListener;
pub use snapshot_store::JsonSnapshotStore;
pub use worker_manager::{RealWorkerManager, WorkerLaunchConfig};
