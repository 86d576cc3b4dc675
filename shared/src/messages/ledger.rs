//! Resource ledger protocol
//!
//! Workers never hold cluster state themselves. Every read and every debit is
//! a synchronous request/response round trip to the coordinator, which applies
//! them one at a time.

use serde::{Deserialize, Serialize};

use crate::types::UtilizationSnapshot;

/// Calls a worker (or an external probe) makes on the coordinator's ledger
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum LedgerRequest {
    /// Current snapshot including debits; gathered on the spot if none is cached
    GetSnapshot,

    /// Optimistically charge a placement against a cluster
    Debit {
        cluster: String,
        cores: u32,
        memory_gib: u32,
    },

    /// Replace the cached snapshot with one measured elsewhere
    Publish { snapshot: UtilizationSnapshot },
}

/// Coordinator answers to `LedgerRequest`
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum LedgerResponse {
    Snapshot { snapshot: UtilizationSnapshot },

    /// `applied` is false when the cluster is unknown to the ledger
    Debited { applied: bool },

    Published,

    Error { message: String },
}
