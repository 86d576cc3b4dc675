//! Worker domain types

use macaddr::MacAddr6;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::error::ProvisionError;

/// Key/value properties of one inventory record
pub type Properties = BTreeMap<String, String>;

/// Inventory key holding the MAC of interface `index`
pub fn mac_key(index: u32) -> String {
    format!("macs.{index}")
}

/// Hardware address, always rendered as lowercase colon-separated hex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddress(MacAddr6);

impl MacAddress {
    /// Vendor block the virtualization platform accepts for static MACs
    pub const VENDOR_PREFIX: [u8; 3] = [0x00, 0x50, 0x56];

    pub fn new(octets: [u8; 6]) -> Self {
        Self(MacAddr6::from(octets))
    }

    pub fn octets(&self) -> [u8; 6] {
        let mut octets = [0u8; 6];
        octets.copy_from_slice(self.0.as_bytes());
        octets
    }

    pub fn has_vendor_prefix(&self) -> bool {
        self.octets()[..3] == Self::VENDOR_PREFIX
    }

    /// Accept only the six-pair forms platforms print (`aa:bb:..` or `aa-bb-..`)
    pub fn parse_reported(raw: &str) -> Option<Self> {
        static PAIRS: OnceLock<Regex> = OnceLock::new();
        let regex = PAIRS.get_or_init(|| Regex::new(r"(?i)^([0-9a-f]{2}[:-]){5}[0-9a-f]{2}$").expect("valid mac regex"));
        let raw = raw.trim();
        if !regex.is_match(raw) {
            return None;
        }
        raw.replace('-', ":").parse().ok()
    }
}

impl FromStr for MacAddress {
    type Err = ProvisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<MacAddr6>()
            .map(Self)
            .map_err(|e| ProvisionError::config(format!("invalid MAC address '{s}': {e}")))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = self.octets();
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

/// One change recorded in an inventory record's history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    pub user: String,
    pub ts: i64,
    pub name: String,
    #[serde(default)]
    pub value: String,
}

/// Static datacenter settings, resolved for one concrete datacenter name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatacenterConfig {
    pub name: String,
    pub is_pinf: bool,
    /// Substring that identifies the datacenter's clusters
    pub domain: String,
    /// Ordered; the first network is the primary interface
    pub networks: Vec<String>,
    pub comment: String,
    /// Only set for PINF datacenters
    pub chef_env: Option<String>,
    pub vlan: Option<u16>,
}

impl DatacenterConfig {
    pub fn os_block(&self) -> OsBlock {
        if self.is_pinf {
            OsBlock::Pinf
        } else {
            OsBlock::Platform1
        }
    }

    pub fn primary_network(&self) -> Option<&str> {
        self.networks.first().map(String::as_str)
    }
}

/// Section of the OS catalog a datacenter draws from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsBlock {
    Platform1,
    Pinf,
}

impl OsBlock {
    pub fn as_str(&self) -> &'static str {
        match self {
            OsBlock::Platform1 => "platform1",
            OsBlock::Pinf => "pinf",
        }
    }
}

impl fmt::Display for OsBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deployment {
    /// Clone an existing template
    Template { template: String },
    /// Network install; `target` selects the installer profile
    Pxe { target: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsConfig {
    pub name: String,
    /// Guest OS type tag passed to the platform
    pub guest: String,
    pub deployment: Deployment,
}

impl OsConfig {
    pub fn is_template(&self) -> bool {
        matches!(self.deployment, Deployment::Template { .. })
    }

    pub fn is_pxe(&self) -> bool {
        matches!(self.deployment, Deployment::Pxe { .. })
    }
}

/// Cluster, datastore and host chosen for one machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub cluster: String,
    pub datastore: String,
    pub host: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionRequest {
    pub datacenter: String,
    pub cores: u32,
    pub memory_gib: u32,
    pub disk_gb: u32,
    pub os: String,
    pub owner: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    Ok,
    /// Best-effort step failed; the sequence continued
    Warn,
    /// The sequence stopped here
    Fatal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: String,
    pub status: StepStatus,
    pub detail: Option<String>,
}

/// What one provisioning run achieved
///
/// A failed run may still carry a machine id: everything done before the
/// failing step stays in place for an operator to pick up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionReport {
    pub machine_id: Option<String>,
    pub macs: Vec<String>,
    pub ip: Option<String>,
    pub steps: Vec<StepRecord>,
    pub error: Option<String>,
}

impl ProvisionReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    pub fn record(&mut self, step: &str, status: StepStatus, detail: Option<String>) {
        self.steps.push(StepRecord {
            step: step.to_string(),
            status,
            detail,
        });
    }

    pub fn warnings(&self) -> impl Iterator<Item = &StepRecord> {
        self.steps.iter().filter(|s| s.status == StepStatus::Warn)
    }
}
