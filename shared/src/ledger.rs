//! Optimistic per-cluster capacity ledger
//!
//! Holds the latest utilization snapshot and applies "fake allocations":
//! debits made at placement time, before the next real measurement shows the
//! new load. Debits live only inside the cached snapshot, so replacing the
//! snapshot discards them and staleness stays bounded by one refresh interval.

use crate::types::UtilizationSnapshot;

/// CPU charged per requested core
pub const MHZ_PER_CORE: i64 = 2000;

/// Memory charged per requested GiB
pub const MIB_PER_GIB: i64 = 1024;

#[derive(Debug, Default)]
pub struct ResourceLedger {
    snapshot: Option<UtilizationSnapshot>,
}

impl ResourceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: UtilizationSnapshot) -> Self {
        Self {
            snapshot: Some(snapshot),
        }
    }

    pub fn snapshot(&self) -> Option<&UtilizationSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn has_snapshot(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Swap in a freshly gathered snapshot, dropping all pending debits
    pub fn replace(&mut self, snapshot: UtilizationSnapshot) {
        self.snapshot = Some(snapshot);
    }

    /// Charge `cores` and `memory_gib` against `cluster`
    ///
    /// Returns false when the cluster is not part of the cached snapshot.
    pub fn debit(&mut self, cluster: &str, cores: u32, memory_gib: u32) -> bool {
        let Some(usage) = self
            .snapshot
            .as_mut()
            .and_then(|snapshot| snapshot.clusters.get_mut(cluster))
        else {
            return false;
        };

        usage.free_cpu_mhz -= i64::from(cores) * MHZ_PER_CORE;
        usage.free_mem_mib -= i64::from(memory_gib) * MIB_PER_GIB;
        true
    }
}
