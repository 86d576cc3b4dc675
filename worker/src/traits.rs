//! Worker trait definitions for dependency injection
//!
//! Every external collaborator sits behind one of these traits; the
//! virtualization driver is `shared::VirtualizationDriver`.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use shared::UtilizationSnapshot;

use crate::core::ActionLog;
use crate::error::ProvisionResult;
use crate::types::{HistoryEntry, Properties};

/// System of record for machine identities and their properties
#[mockall::automock]
#[async_trait]
pub trait InventoryClient: Send + Sync {
    /// Read `props` of `machine`; an empty list reads every property
    async fn get(&self, machine: &str, props: Vec<String>) -> ProvisionResult<Properties>;

    async fn set(&self, machine: &str, props: Properties) -> ProvisionResult<()>;

    async fn del(&self, machine: &str, props: Vec<String>) -> ProvisionResult<()>;

    /// Run a named server-side procedure and return its output
    async fn call(&self, method: &str, args: Vec<String>) -> ProvisionResult<String>;

    /// Records matching every `key=value` filter (`%` is a wildcard)
    async fn property_search(&self, filters: Vec<String>) -> ProvisionResult<BTreeMap<String, Properties>>;

    /// Ids of records matching a free-text query
    async fn text_search(&self, query: &str) -> ProvisionResult<Vec<String>>;

    async fn history(&self, machine: &str, only_current: bool, props: Vec<String>) -> ProvisionResult<Vec<HistoryEntry>>;
}

/// Access to the cluster resource ledger
#[mockall::automock]
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Current utilization; never empty, gathered on demand if nothing is cached
    async fn snapshot(&self) -> ProvisionResult<UtilizationSnapshot>;

    /// Optimistically subtract a placement from `cluster`
    ///
    /// # Returns
    /// `false` when the ledger does not know the cluster
    async fn debit(&self, cluster: &str, cores: u32, memory_gib: u32) -> ProvisionResult<bool>;
}

/// Runs one command on a remote host, streaming its output into `log`
#[mockall::automock]
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// # Returns
    /// Whether the command exited successfully
    async fn execute(&self, host: &str, user: &str, command: &str, log: &ActionLog) -> ProvisionResult<bool>;
}

/// Single-shot liveness probe
#[mockall::automock]
#[async_trait]
pub trait Pinger: Send + Sync {
    async fn is_alive(&self, ip: Ipv4Addr) -> bool;
}
