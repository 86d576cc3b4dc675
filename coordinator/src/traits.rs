//! Trait definitions with mockall annotations for testing
//!
//! The coordinator's I/O seams: where the snapshot is persisted, how ledger
//! calls arrive, and how worker processes are supervised. The utilization
//! probe itself is `shared::UtilizationProbe`.

use std::net::SocketAddr;
use tokio::sync::{mpsc, oneshot};

use crate::error::CoordinatorResult;
use shared::{LedgerRequest, LedgerResponse, ProcessId, UtilizationSnapshot};

/// A ledger request together with the channel its answer goes back on
#[derive(Debug)]
pub struct LedgerCall {
    pub request: LedgerRequest,
    pub reply: oneshot::Sender<LedgerResponse>,
}

/// Summary of a running worker process
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerInfo {
    pub id: ProcessId,
    pub pid: u32,
    /// Address the worker accepts action requests on
    pub action_address: SocketAddr,
}

/// Stable storage for the last accepted snapshot
///
/// Read once at start-up to warm the ledger before any probe has run.
#[mockall::automock]
#[async_trait::async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn load(&self) -> CoordinatorResult<Option<UtilizationSnapshot>>;

    async fn save(&self, snapshot: &UtilizationSnapshot) -> CoordinatorResult<()>;
}

/// Inbound ledger channel from workers
#[mockall::automock]
#[async_trait::async_trait]
pub trait LedgerListener: Send + Sync {
    /// Bind `bind_addr` and forward every request as a `LedgerCall`
    ///
    /// # Returns
    /// The actually bound address (useful with port 0) and the call receiver
    async fn start(&self, bind_addr: SocketAddr) -> CoordinatorResult<(SocketAddr, mpsc::Receiver<LedgerCall>)>;

    /// Stop accepting connections
    async fn shutdown(&self) -> CoordinatorResult<()>;
}

/// Worker process supervision
#[mockall::automock]
#[async_trait::async_trait]
pub trait WorkerManager: Send + Sync {
    /// Spawn `count` workers pointed at the coordinator's ledger address
    async fn spawn_workers(&self, count: u32, ledger_addr: SocketAddr) -> CoordinatorResult<Vec<WorkerInfo>>;

    /// Restart every worker that has exited since the last check
    ///
    /// # Returns
    /// The ids of the restarted workers
    async fn restart_exited(&self) -> CoordinatorResult<Vec<ProcessId>>;

    /// Stop all workers
    async fn stop_workers(&self) -> CoordinatorResult<()>;
}
