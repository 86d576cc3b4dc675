//! Provisioning orchestration
//!
//! Runs one machine creation from configuration lookup to first boot. Each
//! step is recorded as `Ok`, `Warn` (best-effort step failed, sequence goes
//! on) or `Fatal` (sequence stops). Nothing is rolled back: once the machine
//! is registered its id is reported even on failure, so the remaining steps
//! can be re-run by hand.

use chrono::Utc;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{sleep, Duration, Instant};

use shared::{process_info, CommandOutput, ProcessId, VirtualizationDriver};

use crate::config::Catalog;
use crate::core::ActionLog;
use crate::error::{ProvisionError, ProvisionResult};
use crate::services::address_allocator::AddressAllocator;
use crate::services::interface_reconciler::InterfaceReconciler;
use crate::services::inventory::InventoryExt;
use crate::services::placement_selector::PlacementSelector;
use crate::services::Collaborators;
use crate::traits::{InventoryClient, RemoteExecutor};
use crate::types::{
    DatacenterConfig, Deployment, MacAddress, OsConfig, Placement, ProvisionReport, ProvisionRequest, StepStatus,
};

/// Site-specific knobs of the provisioning sequence
#[derive(Debug, Clone)]
pub struct ProvisionSettings {
    /// Host that renders PXE configs for PINF datacenters
    pub pinf_pxe_host: String,
    /// `{datacenter}` is replaced by the datacenter name
    pub autoinstall_host: String,
    pub pxe_user: String,
    pub pxe_generator: String,
    pub oneshot_script: String,
    pub annotation: String,
    pub ip_poll_interval: Duration,
    pub template_ip_timeout: Duration,
    pub pxe_ip_timeout: Duration,
}

impl Default for ProvisionSettings {
    fn default() -> Self {
        Self {
            pinf_pxe_host: "autoinstall-pinf.example.net".to_string(),
            autoinstall_host: "autoinstall.{datacenter}.example.net".to_string(),
            pxe_user: "svc_provision".to_string(),
            pxe_generator: "/usr/local/bin/generate-pxe-configuration-for-mac.py".to_string(),
            oneshot_script: "/home/autoinstall/scripts/setoneshot".to_string(),
            annotation: "provisioned".to_string(),
            ip_poll_interval: Duration::from_secs(10),
            template_ip_timeout: Duration::from_secs(240),
            pxe_ip_timeout: Duration::from_secs(900),
        }
    }
}

pub struct Provisioner {
    catalog: Arc<Catalog>,
    placement: PlacementSelector,
    allocator: Arc<AddressAllocator>,
    reconciler: Arc<InterfaceReconciler>,
    driver: Arc<dyn VirtualizationDriver>,
    inventory: Arc<dyn InventoryClient>,
    remote: Arc<dyn RemoteExecutor>,
    settings: ProvisionSettings,
    shutdown: watch::Receiver<bool>,
}

fn required<T>(report: &mut ProvisionReport, step: &str, result: ProvisionResult<T>) -> ProvisionResult<T> {
    match result {
        Ok(value) => {
            report.record(step, StepStatus::Ok, None);
            Ok(value)
        }
        Err(e) => {
            report.record(step, StepStatus::Fatal, Some(e.to_string()));
            Err(e)
        }
    }
}

fn best_effort(report: &mut ProvisionReport, log: &ActionLog, step: &str, result: ProvisionResult<()>) {
    match result {
        Ok(()) => report.record(step, StepStatus::Ok, None),
        Err(e) => {
            log.err(format!("{step} failed, ignoring: {e}"));
            report.record(step, StepStatus::Warn, Some(e.to_string()));
        }
    }
}

impl Provisioner {
    pub fn new(
        collaborators: &Collaborators,
        catalog: Arc<Catalog>,
        settings: ProvisionSettings,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let allocator = Arc::new(AddressAllocator::new(
            collaborators.inventory.clone(),
            collaborators.pinger.clone(),
        ));
        let reconciler = Arc::new(InterfaceReconciler::new(
            collaborators.driver.clone(),
            collaborators.inventory.clone(),
            allocator.clone(),
        ));

        Self {
            catalog,
            placement: PlacementSelector::new(collaborators.ledger.clone(), collaborators.driver.clone()),
            allocator,
            reconciler,
            driver: collaborators.driver.clone(),
            inventory: collaborators.inventory.clone(),
            remote: collaborators.remote.clone(),
            settings,
            shutdown,
        }
    }

    pub fn allocator(&self) -> Arc<AddressAllocator> {
        self.allocator.clone()
    }

    pub fn reconciler(&self) -> Arc<InterfaceReconciler> {
        self.reconciler.clone()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn settings(&self) -> &ProvisionSettings {
        &self.settings
    }

    /// Provision one machine; never fails past this point, see the report
    pub async fn provision(&self, request: &ProvisionRequest, log: &ActionLog) -> ProvisionReport {
        let mut report = ProvisionReport::default();

        if let Err(e) = self.run(request, log, &mut report).await {
            log.err(format!("Provisioning failed: {e}"));
            if let Some(id) = &report.machine_id {
                log.err(format!("{id} stays registered; re-run the failed step to finish it"));
            }
            report.error = Some(e.to_string());
        }

        report
    }

    async fn run(&self, request: &ProvisionRequest, log: &ActionLog, report: &mut ProvisionReport) -> ProvisionResult<()> {
        let created_at = Utc::now().timestamp();

        let (dc, os) = required(report, "configuration", self.load_configuration(request))?;
        log.out(format!(
            "Using dc {} ({}) to spawn {} {}...",
            dc.domain,
            dc.os_block(),
            os.name,
            if os.is_template() { "from template" } else { "via PXE" }
        ));

        let placement = required(report, "placement", self.placement.place(&dc.domain).await)?;
        log.out(format!("Detected cluster {} to have the most free resources", placement.cluster));
        log.out(format!("Using storage '{}'", placement.datastore));
        log.out(format!("Using host '{}'", placement.host));

        let debit = match self
            .placement
            .debit(&placement.cluster, request.cores, request.memory_gib)
            .await
        {
            Ok(true) => Ok(()),
            Ok(false) => Err(ProvisionError::ledger(format!(
                "could not fake allocate {} CPU and {} GiB RAM on cluster {}",
                request.cores, request.memory_gib, placement.cluster
            ))),
            Err(e) => Err(e),
        };
        best_effort(report, log, "debit", debit);

        log.out("Generating MAC addresses...");
        let macs = required(report, "allocate-macs", self.allocate_macs(dc.networks.len()).await)?;
        report.macs = macs.iter().map(ToString::to_string).collect();

        let machine_id = required(report, "register", self.inventory.register_machine(&macs).await)?;
        report.machine_id = Some(machine_id.clone());
        log.out(format!("Spawning as: {machine_id}"));

        let net_tag = if dc.is_pinf {
            dc.networks[0].clone()
        } else {
            dc.name.clone()
        };
        required(
            report,
            "tag-network",
            self.inventory.set_value(&machine_id, "net", &net_tag).await,
        )?;

        let created = self.create(request, &os, &placement, &dc, &macs[0], &machine_id, log).await;
        required(report, "create", created.map(|_| ()))?;
        if os.is_template() {
            let resized = self
                .run_checked(
                    "vm.disk.change",
                    vec![format!("-vm={machine_id}"), format!("-size={}GB", request.disk_gb)],
                    log,
                )
                .await;
            best_effort(report, log, "resize-disk", resized.map(|_| ()));
        }

        for (index, network) in dc.networks.iter().enumerate().skip(1) {
            log.out(format!("Creating and registering ethernet-{index} in inventory..."));
            let reconciled = self
                .reconciler
                .reconcile(&machine_id, &machine_id, index as u32, network, log)
                .await;
            required(report, &format!("reconcile-ethernet-{index}"), reconciled)?;
        }

        if let Deployment::Pxe { target } = &os.deployment {
            let triggered = self.trigger_pxe(&dc, target, &macs[0], &machine_id, log).await;
            required(report, "pxe-trigger", triggered)?;
        }

        log.out("Setting boot order, hot-add and attributes...");
        let boot_order = if os.is_template() { "disk" } else { "ethernet,disk" };
        let (boot, hot_add, attributes) = tokio::join!(
            self.run_checked(
                "device.boot",
                vec!["-vm".into(), machine_id.clone(), "-order".into(), boot_order.into()],
                log
            ),
            self.run_checked(
                "vm.change",
                vec![
                    "-vm".into(),
                    machine_id.clone(),
                    "-cpu-hot-add-enabled=true".into(),
                    "-memory-hot-add-enabled=true".into(),
                ],
                log
            ),
            self.set_attributes(&machine_id, &request.owner, created_at, log),
        );
        best_effort(report, log, "boot-order", boot.map(|_| ()));
        best_effort(report, log, "hot-add", hot_add.map(|_| ()));
        best_effort(report, log, "attributes", attributes);

        log.out("Powering on...");
        let powered = self
            .run_checked("vm.power", vec!["-on".into(), machine_id.clone()], log)
            .await;
        required(report, "power-on", powered.map(|_| ()))?;

        if dc.is_pinf || os.is_template() {
            log.out("Waiting for an IP...");
            let timeout = if os.is_template() {
                self.settings.template_ip_timeout
            } else {
                self.settings.pxe_ip_timeout
            };
            let ip = required(report, "wait-ip", self.wait_for_ip(&machine_id, timeout).await)?;
            log.out(format!("IP: {ip}"));
            report.ip = Some(ip.to_string());

            if let Some(script) = self.catalog.bootstrap(&os.name) {
                log.out("Running first-boot bootstrap...");
                let ran = self
                    .remote
                    .execute(&ip.to_string(), &script.user, &script.command, log)
                    .await
                    .and_then(|ok| {
                        ok.then_some(()).ok_or_else(|| ProvisionError::Remote {
                            host: ip.to_string(),
                            message: "bootstrap script failed".to_string(),
                        })
                    });
                best_effort(report, log, "bootstrap", ran);
            }
        }

        process_info!(ProcessId::current(), "✅ Provisioned {} in {}", machine_id, placement.cluster);
        log.out("Done");
        Ok(())
    }

    fn load_configuration(&self, request: &ProvisionRequest) -> ProvisionResult<(DatacenterConfig, OsConfig)> {
        let dc = self.catalog.datacenter(&request.datacenter)?;
        let os = self.catalog.os(dc.os_block(), &request.os)?;
        Ok((dc, os))
    }

    /// One distinct MAC per network
    async fn allocate_macs(&self, count: usize) -> ProvisionResult<Vec<MacAddress>> {
        let mut macs = Vec::with_capacity(count);
        for _ in 0..count {
            let mac = self.allocator.allocate_mac_excluding(&macs).await?;
            macs.push(mac);
        }
        Ok(macs)
    }

    #[allow(clippy::too_many_arguments)]
    async fn create(
        &self,
        request: &ProvisionRequest,
        os: &OsConfig,
        placement: &Placement,
        dc: &DatacenterConfig,
        primary_mac: &MacAddress,
        machine_id: &str,
        log: &ActionLog,
    ) -> ProvisionResult<CommandOutput> {
        let network = dc.primary_network().unwrap_or_default();
        let mut args = vec![
            format!("-host={}", placement.host),
            format!("-ds={}", placement.datastore),
        ];

        let command = match &os.deployment {
            Deployment::Template { template } => {
                log.out("Spawning from template...");
                args.extend([
                    format!("-m={}", request.memory_gib * 1024),
                    format!("-c={}", request.cores),
                    "-on=false".to_string(),
                    format!("-annotation={}", self.settings.annotation),
                    format!("-net={network}"),
                    format!("-net.address={primary_mac}"),
                    "-net.adapter=vmxnet3".to_string(),
                    format!("-vm={template}"),
                ]);
                "vm.clone"
            }
            Deployment::Pxe { .. } => {
                log.out("Creating empty machine for network install...");
                args.extend([
                    format!("-disk={}GB", request.disk_gb),
                    "-disk.controller=lsilogic".to_string(),
                    format!("-m={}", request.memory_gib * 1024),
                    format!("-c={}", request.cores),
                    "-on=false".to_string(),
                    format!("-annotation={}", self.settings.annotation),
                    format!("-net={network}"),
                    format!("-net.address={primary_mac}"),
                    "-net.adapter=vmxnet3".to_string(),
                    format!("-g={}", os.guest),
                ]);
                "vm.create"
            }
        };
        args.push(machine_id.to_string());

        self.run_checked(command, args, log).await
    }

    async fn trigger_pxe(
        &self,
        dc: &DatacenterConfig,
        target: &str,
        primary_mac: &MacAddress,
        machine_id: &str,
        log: &ActionLog,
    ) -> ProvisionResult<()> {
        let (host, command) = if dc.is_pinf {
            (
                self.settings.pinf_pxe_host.clone(),
                format!("{} --mac {} --target {}", self.settings.pxe_generator, primary_mac, target),
            )
        } else {
            (
                self.settings.autoinstall_host.replace("{datacenter}", &dc.name),
                format!("{} {} {}", self.settings.oneshot_script, machine_id, target),
            )
        };

        log.out(format!("Triggering network install on {host}..."));
        if self.remote.execute(&host, &self.settings.pxe_user, &command, log).await? {
            Ok(())
        } else {
            Err(ProvisionError::Remote {
                host,
                message: "PXE configuration command failed".to_string(),
            })
        }
    }

    async fn set_attributes(&self, machine_id: &str, owner: &str, created_at: i64, log: &ActionLog) -> ProvisionResult<()> {
        self.run_checked(
            "fields.set",
            vec!["owner".into(), owner.into(), machine_id.into()],
            log,
        )
        .await?;
        self.run_checked(
            "fields.set",
            vec!["created".into(), created_at.to_string(), machine_id.into()],
            log,
        )
        .await?;
        Ok(())
    }

    /// Poll for the machine's first IPv4 address until `timeout`
    ///
    /// Returns `Cancelled` as soon as shutdown is signalled.
    pub async fn wait_for_ip(&self, vm: &str, timeout: Duration) -> ProvisionResult<Ipv4Addr> {
        let deadline = Instant::now() + timeout;
        let poll = self.settings.ip_poll_interval;
        let mut shutdown = self.shutdown.clone();

        loop {
            if *shutdown.borrow() {
                return Err(ProvisionError::Cancelled {
                    message: format!("waiting for an IP on {vm}"),
                });
            }

            let output = self
                .driver
                .run(
                    "vm.ip",
                    vec!["-v4".into(), format!("-wait={}s", poll.as_secs().max(1)), vm.into()],
                )
                .await?;
            if output.success() {
                if let Some(ip) = output.stdout.split_whitespace().find_map(|t| t.parse::<Ipv4Addr>().ok()) {
                    return Ok(ip);
                }
            }

            if Instant::now() >= deadline {
                return Err(ProvisionError::Timeout {
                    what: format!("an IP on {vm}"),
                    seconds: timeout.as_secs(),
                });
            }

            tokio::select! {
                _ = sleep(poll) => {}
                Ok(()) = shutdown.changed() => {}
            }
        }
    }

    /// Run a driver command, copying its output into `log`; non-zero status fails
    async fn run_checked(&self, command: &str, args: Vec<String>, log: &ActionLog) -> ProvisionResult<CommandOutput> {
        let output = self.driver.run(command, args).await?;
        for line in output.stdout.lines().filter(|l| !l.trim().is_empty()) {
            log.out(line);
        }
        for line in output.stderr.lines().filter(|l| !l.trim().is_empty()) {
            log.err(line);
        }
        if !output.success() {
            return Err(ProvisionError::driver(
                command,
                format!("exit status {}: {}", output.status, output.stderr.trim()),
            ));
        }
        Ok(output)
    }
}
