//! Canned snapshots and addresses

use chrono::{DateTime, TimeZone, Utc};
use shared::{ClusterUsage, UtilizationSnapshot};
use std::collections::BTreeMap;
use std::net::SocketAddr;

pub struct TestFixtures;

impl TestFixtures {
    pub const CLUSTER_A: &'static str = "/dc/host/DOM1/cluster-a";
    pub const CLUSTER_B: &'static str = "/dc/host/DOM2/cluster-b";

    pub fn ledger_addr() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 0))
    }

    pub fn bound_addr() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 47000))
    }

    /// When `snapshot()` was gathered; later fixtures are offset from it
    pub fn gathered_at(minutes_later: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + chrono::Duration::minutes(minutes_later)
    }

    pub fn usage(free_cpu_mhz: i64, free_mem_mib: i64) -> ClusterUsage {
        ClusterUsage {
            free_cpu_mhz,
            free_mem_mib,
            hosts: vec!["esx-01".to_string(), "esx-02".to_string()],
        }
    }

    /// Two clusters, A with 10 GHz / 16 GiB free and B with 4 GHz / 64 GiB
    pub fn snapshot() -> UtilizationSnapshot {
        let mut clusters = BTreeMap::new();
        clusters.insert(Self::CLUSTER_A.to_string(), Self::usage(10_000, 16_384));
        clusters.insert(Self::CLUSTER_B.to_string(), Self::usage(4_000, 65_536));
        UtilizationSnapshot {
            clusters,
            gathered_at: Self::gathered_at(0),
        }
    }

    pub fn fresh_snapshot() -> UtilizationSnapshot {
        let mut clusters = BTreeMap::new();
        clusters.insert(Self::CLUSTER_A.to_string(), Self::usage(50_000, 100_000));
        UtilizationSnapshot {
            clusters,
            gathered_at: Self::gathered_at(60),
        }
    }

    /// Gathered between `snapshot()` and `fresh_snapshot()`
    pub fn interim_snapshot() -> UtilizationSnapshot {
        let mut clusters = BTreeMap::new();
        clusters.insert(Self::CLUSTER_B.to_string(), Self::usage(1_000, 2_048));
        UtilizationSnapshot {
            clusters,
            gathered_at: Self::gathered_at(30),
        }
    }
}
