//! Main entry point for the worker binary

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tokio::time::Duration;

use shared::{logging, process_debug, ActionRequest, GovcDriver, GovcProbe, OutputStream, ProcessId};
use worker::services::{
    Collaborators, HttpInventoryClient, IcmpPinger, LocalLedger, ProvisionSettings, Provisioner, SshExecutor,
    TcpLedgerClient,
};
use worker::{ActionDispatcher, ActionServer, Catalog, LedgerClient, ProvisionResult};

/// Provisioning worker serving named actions
#[derive(Parser)]
#[command(name = "worker")]
#[command(about = "Provisions virtual machines and repairs their network interfaces")]
pub struct Args {
    /// Worker number assigned by the coordinator
    #[arg(long)]
    pub id: Option<u32>,

    /// Address the action server listens on
    #[arg(long, default_value = "127.0.0.1:7101")]
    pub listen_addr: SocketAddr,

    /// Coordinator ledger address
    #[arg(long, required_unless_present = "standalone")]
    pub coordinator_addr: Option<SocketAddr>,

    /// Keep the ledger in-process instead of asking a coordinator
    #[arg(long, conflicts_with = "coordinator_addr")]
    pub standalone: bool,

    /// Inventory folder searched for clusters (standalone only)
    #[arg(long, default_value = "host")]
    pub cluster_root: String,

    #[arg(long, env = "INVENTORY_URL")]
    pub inventory_url: String,

    #[arg(long, env = "INVENTORY_USER")]
    pub inventory_user: String,

    #[arg(long, env = "INVENTORY_PASSWORD", hide_env_values = true)]
    pub inventory_password: String,

    #[arg(long, env = "GOVC_BIN", default_value = "govc")]
    pub govc_bin: PathBuf,

    #[arg(long, env = "GOVC_URL")]
    pub vcenter_url: String,

    #[arg(long, env = "GOVC_USERNAME")]
    pub govc_username: String,

    #[arg(long, env = "GOVC_PASSWORD", hide_env_values = true)]
    pub govc_password: String,

    /// Private key for bootstrap and PXE hosts
    #[arg(long, env = "SSH_KEY", default_value = "./keys/id_rsa")]
    pub ssh_key: PathBuf,

    /// PXE config generator host for PINF datacenters
    #[arg(long, default_value = "autoinstall-pinf.example.net")]
    pub pinf_pxe_host: String,

    /// Install host of other datacenters; `{datacenter}` is substituted
    #[arg(long, default_value = "autoinstall.{datacenter}.example.net")]
    pub autoinstall_host: String,

    #[arg(long, default_value = "svc_provision")]
    pub pxe_user: String,

    /// Network `fix.publicnetwork` attaches as ethernet-1
    #[arg(long, default_value = "4_pub_nuev")]
    pub public_network: String,

    /// Directory holding datacenter.json, os.json and the optional catalogs
    #[arg(long, default_value = "./catalog")]
    pub catalog_dir: PathBuf,

    /// Seconds between IP polls while waiting for a machine
    #[arg(long, default_value = "10")]
    pub ip_poll_secs: u64,

    /// Run one action and exit: `--action NAME ARGS...`
    #[arg(long, num_args = 1.., allow_hyphen_values = true, value_name = "NAME ARGS")]
    pub action: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[tokio::main]
async fn main() -> ProvisionResult<()> {
    let _ = dotenv::dotenv();
    let args = Args::parse();

    match args.id {
        Some(id) if !args.standalone => ProcessId::init_worker(id),
        _ => ProcessId::init_standalone(),
    };
    logging::init_tracing(Some(&args.log_level));
    logging::log_startup(ProcessId::current(), "worker");

    let catalog = Arc::new(Catalog::load(&args.catalog_dir)?);
    let driver = GovcDriver::new(&args.govc_bin, &args.vcenter_url, &args.govc_username, &args.govc_password);

    let ledger: Arc<dyn LedgerClient> = match args.coordinator_addr {
        Some(addr) => {
            process_debug!(ProcessId::current(), "Using coordinator ledger at {}", addr);
            Arc::new(TcpLedgerClient::new(addr))
        }
        None => {
            process_debug!(ProcessId::current(), "Using in-process ledger");
            Arc::new(LocalLedger::new(GovcProbe::new(driver.clone(), args.cluster_root.clone())))
        }
    };

    let collaborators = Collaborators {
        driver: Arc::new(driver),
        inventory: Arc::new(HttpInventoryClient::new(
            &args.inventory_url,
            args.inventory_user.clone(),
            args.inventory_password.clone(),
        )?),
        ledger,
        remote: Arc::new(SshExecutor::new(args.ssh_key.clone())),
        pinger: Arc::new(IcmpPinger::default()),
    };

    let settings = ProvisionSettings {
        pinf_pxe_host: args.pinf_pxe_host.clone(),
        autoinstall_host: args.autoinstall_host.clone(),
        pxe_user: args.pxe_user.clone(),
        ip_poll_interval: Duration::from_secs(args.ip_poll_secs.max(1)),
        ..ProvisionSettings::default()
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let provisioner = Provisioner::new(&collaborators, catalog, settings, shutdown_rx);
    let dispatcher = Arc::new(ActionDispatcher::new(provisioner, collaborators, args.public_network.clone()));

    if let Some((name, action_args)) = args.action.split_first() {
        let outcome = dispatcher
            .dispatch(ActionRequest {
                request_id: uuid::Uuid::new_v4().to_string(),
                action: name.clone(),
                args: action_args.to_vec(),
                user: std::env::var("USER").ok(),
            })
            .await;

        for line in &outcome.output {
            match line.stream {
                OutputStream::Stdout => println!("{}", line.line),
                OutputStream::Stderr => eprintln!("{}", line.line),
            }
        }
        println!("{}", outcome.value);

        if !outcome.success {
            std::process::exit(1);
        }
        return Ok(());
    }

    let server = ActionServer::new(dispatcher);
    server.start(args.listen_addr).await?;

    match signal::ctrl_c().await {
        Ok(()) => logging::log_shutdown(ProcessId::current(), "Received Ctrl+C signal"),
        Err(err) => logging::log_error(ProcessId::current(), "Signal handling", &err),
    }

    let _ = shutdown_tx.send(true);
    server.shutdown().await;

    logging::log_success(ProcessId::current(), "Worker stopped gracefully");
    Ok(())
}
