//! Main entry point for the coordinator binary

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::signal;
use tokio::time::Duration;

use coordinator::{
    services::{JsonSnapshotStore, RealWorkerManager, TcpLedgerListener, WorkerLaunchConfig},
    Coordinator, CoordinatorError, CoordinatorResult, CoordinatorSettings,
};
use shared::{logging, process_debug, GovcDriver, GovcProbe, ProcessId};

/// Coordinator owning the cluster resource ledger and the worker pool
#[derive(Parser)]
#[command(name = "coordinator")]
#[command(about = "Serves the cluster resource ledger to provisioning workers")]
pub struct Args {
    /// Address workers use for ledger calls
    #[arg(long, default_value = "127.0.0.1:7000")]
    pub ledger_addr: SocketAddr,

    /// Number of worker processes (defaults to available parallelism)
    #[arg(long)]
    pub workers: Option<u32>,

    /// Worker binary (defaults to `worker` next to this executable)
    #[arg(long)]
    pub worker_bin: Option<PathBuf>,

    /// Worker n serves actions on 127.0.0.1:(base + n)
    #[arg(long, default_value = "7100")]
    pub worker_base_port: u16,

    /// Extra argument passed to every worker (repeatable)
    #[arg(long = "worker-arg", allow_hyphen_values = true)]
    pub worker_args: Vec<String>,

    /// Seconds between utilization refreshes
    #[arg(long, default_value = "300")]
    pub refresh_secs: u64,

    /// Where the last snapshot is persisted
    #[arg(long, default_value = "./state/utilization.json")]
    pub snapshot_path: PathBuf,

    /// Inventory folder searched for clusters
    #[arg(long, default_value = "host")]
    pub cluster_root: String,

    #[arg(long, env = "GOVC_BIN", default_value = "govc")]
    pub govc_bin: PathBuf,

    #[arg(long, env = "GOVC_URL")]
    pub vcenter_url: String,

    #[arg(long, env = "GOVC_USERNAME")]
    pub govc_username: String,

    #[arg(long, env = "GOVC_PASSWORD", hide_env_values = true)]
    pub govc_password: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

fn default_worker_bin() -> CoordinatorResult<PathBuf> {
    let exe = std::env::current_exe()?;
    let dir = exe
        .parent()
        .ok_or_else(|| CoordinatorError::config("cannot locate executable directory"))?;
    Ok(dir.join("worker"))
}

#[tokio::main]
async fn main() -> CoordinatorResult<()> {
    let _ = dotenv::dotenv();
    let args = Args::parse();

    ProcessId::init_coordinator();
    logging::init_tracing(Some(&args.log_level));
    logging::log_startup(ProcessId::current(), "coordinator");

    let worker_count = match args.workers {
        Some(count) => count,
        None => std::thread::available_parallelism().map(|n| n.get() as u32).unwrap_or(1),
    };
    let worker_bin = match args.worker_bin.clone() {
        Some(path) => path,
        None => default_worker_bin()?,
    };
    process_debug!(
        ProcessId::current(),
        "Workers: {} ({}), refresh every {}s, snapshot at {}",
        worker_count,
        worker_bin.display(),
        args.refresh_secs,
        args.snapshot_path.display()
    );

    let driver = GovcDriver::new(&args.govc_bin, &args.vcenter_url, &args.govc_username, &args.govc_password);
    let probe = GovcProbe::new(driver, args.cluster_root.clone());
    let store = JsonSnapshotStore::new(args.snapshot_path.clone());
    let listener = TcpLedgerListener::new();
    let workers = RealWorkerManager::new(WorkerLaunchConfig {
        binary: worker_bin,
        action_host: [127, 0, 0, 1],
        base_port: args.worker_base_port,
        log_level: args.log_level.clone(),
        extra_args: args.worker_args.clone(),
    });

    let settings = CoordinatorSettings {
        ledger_addr: args.ledger_addr,
        worker_count,
        refresh_interval: Duration::from_secs(args.refresh_secs),
        ..CoordinatorSettings::default()
    };

    let mut coordinator = Coordinator::new(probe, store, listener, workers, settings);
    coordinator.initialize().await?;

    let shutdown_sender = coordinator.get_shutdown_sender();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                logging::log_shutdown(ProcessId::current(), "Received Ctrl+C signal");
                let _ = shutdown_sender.send(()).await;
            }
            Err(err) => logging::log_error(ProcessId::current(), "Signal handling", &err),
        }
    });

    coordinator.run().await?;

    logging::log_success(ProcessId::current(), "Coordinator stopped gracefully");
    Ok(())
}
