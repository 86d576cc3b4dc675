//! Cluster utilization probe
//!
//! Measures free CPU/memory and the host list of every cluster. A probe run is
//! slow (several driver commands per cluster) and always yields a complete
//! snapshot, which callers swap in wholesale.

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::driver::{parse_host_names, parse_metric_latest, parse_paths, VirtualizationDriver};
use crate::errors::{SharedError, SharedResult};
use crate::types::{ClusterUsage, ProcessId, UtilizationSnapshot};
use crate::{process_debug, process_warn};

const CPU_METRIC: &str = "clusterServices.effectivecpu.average";
const MEM_METRIC: &str = "clusterServices.effectivemem.average";

/// Source of fresh utilization snapshots
#[mockall::automock]
#[async_trait]
pub trait UtilizationProbe: Send + Sync {
    async fn gather(&self) -> SharedResult<UtilizationSnapshot>;
}

/// Probe that reads cluster services counters through the driver
pub struct GovcProbe<D: VirtualizationDriver> {
    driver: D,
    /// Inventory folder to search for clusters, e.g. `host` or `/dc1/host`
    root: String,
}

impl<D: VirtualizationDriver> GovcProbe<D> {
    pub fn new(driver: D, root: impl Into<String>) -> Self {
        Self {
            driver,
            root: root.into(),
        }
    }

    async fn run_checked(&self, command: &str, args: Vec<String>) -> SharedResult<String> {
        let output = self.driver.run(command, args).await?;
        if !output.success() {
            return Err(SharedError::DriverError {
                command: command.to_string(),
                message: format!("exit status {}: {}", output.status, output.stderr.trim()),
            });
        }
        Ok(output.stdout)
    }

    async fn measure(&self, cluster: &str) -> SharedResult<ClusterUsage> {
        let cpu = self
            .run_checked("metric.sample", vec!["-json".into(), cluster.into(), CPU_METRIC.into()])
            .await?;
        let mem = self
            .run_checked("metric.sample", vec!["-json".into(), cluster.into(), MEM_METRIC.into()])
            .await?;
        let hosts = self.run_checked("host.info", vec![cluster.into()]).await?;

        Ok(ClusterUsage {
            free_cpu_mhz: parse_metric_latest(&cpu)?,
            free_mem_mib: parse_metric_latest(&mem)?,
            hosts: parse_host_names(&hosts),
        })
    }
}

#[async_trait]
impl<D: VirtualizationDriver> UtilizationProbe for GovcProbe<D> {
    async fn gather(&self) -> SharedResult<UtilizationSnapshot> {
        let listing = self
            .run_checked("find", vec![self.root.clone(), "-type".into(), "c".into()])
            .await?;

        let mut clusters = BTreeMap::new();
        for cluster in parse_paths(&listing) {
            match self.measure(&cluster).await {
                Ok(usage) => {
                    process_debug!(
                        ProcessId::current(),
                        "📊 {}: {} MHz / {} MiB free on {} hosts",
                        cluster,
                        usage.free_cpu_mhz,
                        usage.free_mem_mib,
                        usage.hosts.len()
                    );
                    clusters.insert(cluster, usage);
                }
                Err(e) => {
                    process_warn!(ProcessId::current(), "⚠️ Skipping cluster {}: {}", cluster, e);
                }
            }
        }

        Ok(UtilizationSnapshot::new(clusters))
    }
}
