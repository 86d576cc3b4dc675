//! Coordinator state: the resource ledger plus refresh bookkeeping

use shared::{process_debug, process_warn, ProcessId, ResourceLedger, UtilizationSnapshot};
use std::time::Instant;

/// Counters reported on shutdown and in debug logs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerStats {
    pub debits_applied: u64,
    pub debits_rejected: u64,
    pub snapshots_accepted: u64,
    pub refresh_failures: u64,
}

/// State owned by the coordinator's event loop
#[derive(Debug, Default)]
pub struct CoordinatorState {
    ledger: ResourceLedger,
    refresh_in_flight: bool,
    last_accepted: Option<Instant>,
    stats: LedgerStats,
}

impl CoordinatorState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Option<&UtilizationSnapshot> {
        self.ledger.snapshot()
    }

    pub fn has_snapshot(&self) -> bool {
        self.ledger.has_snapshot()
    }

    pub fn stats(&self) -> &LedgerStats {
        &self.stats
    }

    pub fn last_accepted(&self) -> Option<Instant> {
        self.last_accepted
    }

    /// Replace the cached snapshot; pending debits are dropped with it
    pub fn accept_snapshot(&mut self, snapshot: UtilizationSnapshot) {
        process_debug!(
            ProcessId::current(),
            "🔄 Accepting snapshot of {} clusters gathered at {}",
            snapshot.clusters.len(),
            snapshot.gathered_at
        );
        self.ledger.replace(snapshot);
        self.last_accepted = Some(Instant::now());
        self.stats.snapshots_accepted += 1;
    }

    /// Whether `snapshot` was gathered before the one already cached
    pub fn is_older_than_cached(&self, snapshot: &UtilizationSnapshot) -> bool {
        self.ledger
            .snapshot()
            .is_some_and(|cached| snapshot.gathered_at < cached.gathered_at)
    }

    pub fn debit(&mut self, cluster: &str, cores: u32, memory_gib: u32) -> bool {
        let applied = self.ledger.debit(cluster, cores, memory_gib);
        if applied {
            self.stats.debits_applied += 1;
        } else {
            self.stats.debits_rejected += 1;
            process_warn!(ProcessId::current(), "⚠️ Debit for unknown cluster {}", cluster);
        }
        applied
    }

    /// Mark a background refresh as started; false if one is already running
    pub fn begin_refresh(&mut self) -> bool {
        if self.refresh_in_flight {
            return false;
        }
        self.refresh_in_flight = true;
        true
    }

    pub fn finish_refresh(&mut self, succeeded: bool) {
        self.refresh_in_flight = false;
        if !succeeded {
            self.stats.refresh_failures += 1;
        }
    }

    pub fn refresh_in_flight(&self) -> bool {
        self.refresh_in_flight
    }
}
