//! Worker process supervision
//!
//! Spawns the worker binary once per slot and restarts any worker that exits,
//! so the pool size stays constant for the lifetime of the coordinator.

use async_trait::async_trait;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::error::{CoordinatorError, CoordinatorResult};
use crate::traits::{WorkerInfo, WorkerManager};
use shared::{process_debug, process_error, process_warn, ProcessId};

/// How worker processes are launched
#[derive(Debug, Clone)]
pub struct WorkerLaunchConfig {
    pub binary: PathBuf,
    /// Worker n listens for actions on `action_host:(base_port + n)`
    pub action_host: [u8; 4],
    pub base_port: u16,
    pub log_level: String,
    /// Passed through verbatim (catalog directory, inventory URL, ...)
    pub extra_args: Vec<String>,
}

struct WorkerProcess {
    child: Child,
    info: WorkerInfo,
}

pub struct RealWorkerManager {
    config: WorkerLaunchConfig,
    ledger_addr: Mutex<Option<SocketAddr>>,
    active: Mutex<HashMap<u32, WorkerProcess>>,
}

impl RealWorkerManager {
    pub fn new(config: WorkerLaunchConfig) -> Self {
        Self {
            config,
            ledger_addr: Mutex::new(None),
            active: Mutex::new(HashMap::new()),
        }
    }

    fn action_address(&self, worker_id: u32) -> SocketAddr {
        let port = self.config.base_port.saturating_add(worker_id as u16);
        SocketAddr::from((self.config.action_host, port))
    }

    fn spawn_single(&self, worker_id: u32, ledger_addr: SocketAddr) -> CoordinatorResult<WorkerProcess> {
        let action_address = self.action_address(worker_id);

        let mut cmd = Command::new(&self.config.binary);
        cmd.arg("--id")
            .arg(worker_id.to_string())
            .arg("--coordinator-addr")
            .arg(ledger_addr.to_string())
            .arg("--listen-addr")
            .arg(action_address.to_string())
            .arg("--log-level")
            .arg(&self.config.log_level)
            .args(&self.config.extra_args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| CoordinatorError::WorkerSpawnFailed {
            worker_id,
            message: e.to_string(),
        })?;

        let info = WorkerInfo {
            id: ProcessId::Worker(worker_id),
            pid: child.id().unwrap_or(0),
            action_address,
        };

        process_debug!(
            ProcessId::current(),
            "🏭 Spawned {} (PID: {}) serving actions on {}",
            info.id,
            info.pid,
            action_address
        );

        Ok(WorkerProcess { child, info })
    }

    fn has_exited(child: &mut Child) -> bool {
        !matches!(child.try_wait(), Ok(None))
    }
}

#[async_trait]
impl WorkerManager for RealWorkerManager {
    async fn spawn_workers(&self, count: u32, ledger_addr: SocketAddr) -> CoordinatorResult<Vec<WorkerInfo>> {
        *self.ledger_addr.lock().await = Some(ledger_addr);

        let mut infos = Vec::new();
        let mut active = self.active.lock().await;

        // Worker ids are 1-based (worker_1, worker_2, ...)
        for worker_id in 1..=count {
            match self.spawn_single(worker_id, ledger_addr) {
                Ok(process) => {
                    infos.push(process.info.clone());
                    active.insert(worker_id, process);
                }
                Err(e) => {
                    process_error!(ProcessId::current(), "⚠️ {}", e);
                }
            }
        }

        if infos.is_empty() && count > 0 {
            return Err(CoordinatorError::WorkerSpawnFailed {
                worker_id: 1,
                message: "no worker could be started".to_string(),
            });
        }

        Ok(infos)
    }

    async fn restart_exited(&self) -> CoordinatorResult<Vec<ProcessId>> {
        let Some(ledger_addr) = *self.ledger_addr.lock().await else {
            return Ok(Vec::new());
        };

        let mut restarted = Vec::new();
        let mut active = self.active.lock().await;

        let exited: Vec<u32> = active
            .iter_mut()
            .filter_map(|(id, process)| Self::has_exited(&mut process.child).then_some(*id))
            .collect();

        for worker_id in exited {
            process_warn!(ProcessId::current(), "💀 worker_{} exited, restarting", worker_id);
            match self.spawn_single(worker_id, ledger_addr) {
                Ok(process) => {
                    restarted.push(process.info.id.clone());
                    active.insert(worker_id, process);
                }
                Err(e) => {
                    process_error!(ProcessId::current(), "❌ {}", e);
                }
            }
        }

        Ok(restarted)
    }

    async fn stop_workers(&self) -> CoordinatorResult<()> {
        let mut active = self.active.lock().await;
        for (worker_id, mut process) in active.drain() {
            if let Err(e) = process.child.kill().await {
                process_warn!(ProcessId::current(), "⚠️ Failed to stop worker_{}: {}", worker_id, e);
            }
        }
        Ok(())
    }
}
