//! Core shared types and identifiers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

/// Global process ID singleton - set once at startup
static PROCESS_ID: OnceLock<ProcessId> = OnceLock::new();

/// Identity used before any `init_*` call (tests, one-off tools)
static UNINITIALIZED: ProcessId = ProcessId::Standalone;

/// Process identifier for any component in the system
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessId {
    /// The single coordinator that owns the resource ledger
    Coordinator,
    /// Worker process with its 1-based number
    Worker(u32),
    /// Worker running without a coordinator
    Standalone,
}

impl ProcessId {
    pub fn init_coordinator() -> &'static ProcessId {
        PROCESS_ID.get_or_init(|| ProcessId::Coordinator)
    }

    pub fn init_worker(id: u32) -> &'static ProcessId {
        PROCESS_ID.get_or_init(|| ProcessId::Worker(id))
    }

    pub fn init_standalone() -> &'static ProcessId {
        PROCESS_ID.get_or_init(|| ProcessId::Standalone)
    }

    /// Get the global process ID, `standalone` if none was initialized
    pub fn current() -> &'static ProcessId {
        PROCESS_ID.get().unwrap_or(&UNINITIALIZED)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessId::Coordinator => write!(f, "coordinator"),
            ProcessId::Worker(id) => write!(f, "worker_{id}"),
            ProcessId::Standalone => write!(f, "standalone"),
        }
    }
}

/// Free capacity of one cluster as last measured
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterUsage {
    pub free_cpu_mhz: i64,
    pub free_mem_mib: i64,
    pub hosts: Vec<String>,
}

/// Utilization of every known cluster, keyed by cluster path
///
/// Always produced and replaced as a whole; nothing updates it field by field
/// except the ledger's optimistic debits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilizationSnapshot {
    pub clusters: BTreeMap<String, ClusterUsage>,
    pub gathered_at: DateTime<Utc>,
}

impl UtilizationSnapshot {
    pub fn new(clusters: BTreeMap<String, ClusterUsage>) -> Self {
        Self {
            clusters,
            gathered_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    pub fn cluster(&self, id: &str) -> Option<&ClusterUsage> {
        self.clusters.get(id)
    }

    /// Clusters whose path contains `domain`
    pub fn in_domain<'a>(&'a self, domain: &'a str) -> impl Iterator<Item = (&'a String, &'a ClusterUsage)> + 'a {
        self.clusters.iter().filter(move |(id, _)| id.contains(domain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_id_display() {
        assert_eq!(ProcessId::Coordinator.to_string(), "coordinator");
        assert_eq!(ProcessId::Worker(3).to_string(), "worker_3");
        assert_eq!(ProcessId::Standalone.to_string(), "standalone");
    }

    #[test]
    fn test_domain_filter() {
        let usage = ClusterUsage {
            free_cpu_mhz: 1,
            free_mem_mib: 1,
            hosts: vec![],
        };
        let mut clusters = BTreeMap::new();
        clusters.insert("/dc/host/DOM1/c1".to_string(), usage.clone());
        clusters.insert("/dc/host/DOM2/c1".to_string(), usage);
        let snapshot = UtilizationSnapshot::new(clusters);

        let ids: Vec<_> = snapshot.in_domain("DOM2").map(|(id, _)| id.clone()).collect();
        assert_eq!(ids, vec!["/dc/host/DOM2/c1".to_string()]);
    }
}
