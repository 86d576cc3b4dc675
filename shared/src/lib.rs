//! Shared types for the provisioning system
//!
//! Contains the pieces both the coordinator and the workers need: cluster
//! utilization snapshots and the ledger that debits them, the inter-process
//! message types and their framing, and the virtualization driver.

pub mod driver;
pub mod errors;
pub mod framing;
pub mod ledger;
pub mod logging;
pub mod messages;
pub mod probe;
pub mod types;

pub use driver::{CommandOutput, GovcDriver, MockVirtualizationDriver, VirtualizationDriver};
pub use errors::*;
pub use ledger::ResourceLedger;
pub use probe::{GovcProbe, MockUtilizationProbe, UtilizationProbe};
pub use types::*;

pub use messages::{
    // Worker ↔ Coordinator ledger channel
    LedgerRequest, LedgerResponse,

    // Front end ↔ Worker action channel
    ActionOutcome, ActionRequest, OutputLine, OutputStream,
};
