//! Canned catalogs, snapshots and a harness wiring fakes into the worker

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Duration;

use shared::{ClusterUsage, UtilizationSnapshot};
use worker::services::{Collaborators, LocalLedger, ProvisionSettings, Provisioner};
use worker::{ActionDispatcher, Catalog};

use super::fakes::{FakeInventory, RecordingDriver, RecordingExecutor, ScriptedPinger, StaticProbe};

pub struct TestFixtures;

impl TestFixtures {
    pub const CLUSTER_A: &'static str = "/dc/host/DOM1/cluster-a";
    pub const CLUSTER_B: &'static str = "/dc/host/DOM2/cluster-b";
    pub const PUBLIC_NETWORK: &'static str = "pub-net";

    pub const DATACENTERS: &'static str = r#"{
        "nue1": {"isPinf": false, "domain": "DOM1", "networks": ["net-a", "net-b"], "comment": "Nuremberg"},
        "pinf": {"isPinf": true, "domain": "auto", "networks": ["pinf$PINF-front", "pinf$PINF-back"], "comment": "PINF"}
    }"#;

    pub const OS: &'static str = r#"{
        "platform1": {
            "debian12": "debian12_64Guest",
            "ubuntu22": "ubuntu64Guest!template:tpl-ubuntu22"
        },
        "pinf": {
            "debian12": "debian12_64Guest"
        }
    }"#;

    pub const BOOTSTRAP: &'static str = r#"{
        "ubuntu22": {"user": "root", "command": "/usr/local/sbin/firstboot"}
    }"#;

    pub const DATASTORES: &'static str = r#"{"Datastores":[
        {"Name":"cluster-a-ds1","Info":{"FreeSpace":100}},
        {"Name":"cluster-a-ds2","Info":{"FreeSpace":900}}
    ]}"#;

    pub fn catalog() -> Catalog {
        Catalog::from_json(Self::DATACENTERS, Self::OS, None, Some(Self::BOOTSTRAP)).unwrap()
    }

    pub fn snapshot() -> UtilizationSnapshot {
        let mut clusters = BTreeMap::new();
        clusters.insert(
            Self::CLUSTER_A.to_string(),
            ClusterUsage {
                free_cpu_mhz: 50_000,
                free_mem_mib: 100_000,
                hosts: vec!["esx-a1".to_string()],
            },
        );
        clusters.insert(
            Self::CLUSTER_B.to_string(),
            ClusterUsage {
                free_cpu_mhz: 80_000,
                free_mem_mib: 300_000,
                hosts: vec!["esx-b1".to_string()],
            },
        );
        UtilizationSnapshot::new(clusters)
    }

    pub fn settings() -> ProvisionSettings {
        ProvisionSettings {
            ip_poll_interval: Duration::from_millis(10),
            template_ip_timeout: Duration::from_millis(200),
            pxe_ip_timeout: Duration::from_millis(200),
            ..ProvisionSettings::default()
        }
    }

    /// Driver answering the datastore lookup every placement needs
    pub fn driver() -> RecordingDriver {
        RecordingDriver::new().respond("datastore.info", super::fakes::ok(Self::DATASTORES))
    }
}

/// Fakes wired into a provisioner and dispatcher
pub struct Harness {
    pub inventory: Arc<FakeInventory>,
    pub driver: Arc<RecordingDriver>,
    pub remote: Arc<RecordingExecutor>,
    pub ledger: Arc<LocalLedger<StaticProbe>>,
    pub shutdown: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    pinger: Arc<ScriptedPinger>,
}

impl Harness {
    pub fn new(inventory: FakeInventory, driver: RecordingDriver) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        Self {
            inventory: Arc::new(inventory),
            driver: Arc::new(driver),
            remote: Arc::new(RecordingExecutor::default()),
            ledger: Arc::new(LocalLedger::new(StaticProbe(TestFixtures::snapshot()))),
            shutdown,
            shutdown_rx,
            pinger: Arc::new(ScriptedPinger::default()),
        }
    }

    pub fn with_remote(mut self, remote: RecordingExecutor) -> Self {
        self.remote = Arc::new(remote);
        self
    }

    pub fn with_pinger(mut self, pinger: ScriptedPinger) -> Self {
        self.pinger = Arc::new(pinger);
        self
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            driver: self.driver.clone(),
            inventory: self.inventory.clone(),
            ledger: self.ledger.clone(),
            remote: self.remote.clone(),
            pinger: self.pinger.clone(),
        }
    }

    pub fn provisioner(&self) -> Provisioner {
        Provisioner::new(
            &self.collaborators(),
            Arc::new(TestFixtures::catalog()),
            TestFixtures::settings(),
            self.shutdown_rx.clone(),
        )
    }

    pub fn dispatcher(&self) -> ActionDispatcher {
        ActionDispatcher::new(self.provisioner(), self.collaborators(), TestFixtures::PUBLIC_NETWORK)
    }
}
