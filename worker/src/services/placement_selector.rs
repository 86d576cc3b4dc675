//! Cluster, datastore and host selection backed by the ledger

use std::sync::Arc;

use shared::driver::parse_datastores;
use shared::{process_debug, ProcessId, VirtualizationDriver};

use crate::core::{best_cluster, best_datastore, pick_host};
use crate::error::{ProvisionError, ProvisionResult};
use crate::traits::LedgerClient;
use crate::types::Placement;

pub struct PlacementSelector {
    ledger: Arc<dyn LedgerClient>,
    driver: Arc<dyn VirtualizationDriver>,
}

impl PlacementSelector {
    pub fn new(ledger: Arc<dyn LedgerClient>, driver: Arc<dyn VirtualizationDriver>) -> Self {
        Self { ledger, driver }
    }

    pub async fn select_cluster(&self, domain: &str) -> ProvisionResult<String> {
        let snapshot = self.ledger.snapshot().await?;
        best_cluster(&snapshot, domain, &mut rand::thread_rng())
    }

    /// Datastore with the most free space among those named after the cluster
    pub async fn select_storage(&self, cluster: &str) -> ProvisionResult<String> {
        let name = cluster.rsplit('/').next().unwrap_or(cluster);
        let output = self
            .driver
            .run("datastore.info", vec!["-json".into(), format!("{name}/*")])
            .await?;
        if !output.success() {
            return Err(ProvisionError::driver("datastore.info", output.stderr.trim()));
        }
        best_datastore(&parse_datastores(&output.stdout)?)
    }

    /// Random host from the cluster's host list in the ledger
    pub async fn select_host(&self, cluster: &str) -> ProvisionResult<String> {
        let snapshot = self.ledger.snapshot().await?;
        let usage = snapshot
            .cluster(cluster)
            .ok_or_else(|| ProvisionError::unavailable(format!("cluster {cluster} unknown to the ledger")))?;
        pick_host(&usage.hosts, &mut rand::thread_rng())
    }

    pub async fn place(&self, domain: &str) -> ProvisionResult<Placement> {
        let cluster = self.select_cluster(domain).await?;
        let datastore = self.select_storage(&cluster).await?;
        let host = self.select_host(&cluster).await?;

        process_debug!(
            ProcessId::current(),
            "🎯 Placement in {}: cluster {}, datastore {}, host {}",
            domain,
            cluster,
            datastore,
            host
        );
        Ok(Placement {
            cluster,
            datastore,
            host,
        })
    }

    /// Charge the placement to the ledger; `false` if the cluster is unknown
    pub async fn debit(&self, cluster: &str, cores: u32, memory_gib: u32) -> ProvisionResult<bool> {
        self.ledger.debit(cluster, cores, memory_gib).await
    }
}
