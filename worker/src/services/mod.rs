//! Service implementations
//!
//! Real implementations of the worker's collaborator traits plus the services
//! built on top of them.

pub mod address_allocator;
pub mod interface_reconciler;
pub mod inventory;
pub mod ledger_client;
pub mod pinger;
pub mod placement_selector;
pub mod provisioner;
pub mod remote;

#[cfg(test)]
pub mod tests;

use std::sync::Arc;

use shared::VirtualizationDriver;

use crate::traits::{InventoryClient, LedgerClient, Pinger, RemoteExecutor};

pub use address_allocator::{AddressAllocator, IpRejection};
pub use interface_reconciler::{InterfaceReconciler, MacSource, ReconcileOutcome};
pub use inventory::{HttpInventoryClient, InventoryExt};
pub use ledger_client::{LocalLedger, TcpLedgerClient};
pub use pinger::IcmpPinger;
pub use placement_selector::PlacementSelector;
pub use provisioner::{ProvisionSettings, Provisioner};
pub use remote::SshExecutor;

/// Every external system a worker talks to
#[derive(Clone)]
pub struct Collaborators {
    pub driver: Arc<dyn VirtualizationDriver>,
    pub inventory: Arc<dyn InventoryClient>,
    pub ledger: Arc<dyn LedgerClient>,
    pub remote: Arc<dyn RemoteExecutor>,
    pub pinger: Arc<dyn Pinger>,
}
