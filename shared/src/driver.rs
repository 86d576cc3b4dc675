//! Virtualization driver
//!
//! Every interaction with the virtualization platform goes through a single
//! command-oriented trait. The production implementation shells out to the
//! `govc` CLI; the parsers below read the few outputs the core interprets.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::OnceLock;
use tokio::process::Command;

use crate::errors::{SharedError, SharedResult};
use crate::process_info;
use crate::types::ProcessId;

/// Result of one driver command; status 0 means success
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Executes single virtualization commands
#[mockall::automock]
#[async_trait]
pub trait VirtualizationDriver: Send + Sync {
    /// Run `command` with `args`; a non-zero status is reported, not raised
    async fn run(&self, command: &str, args: Vec<String>) -> SharedResult<CommandOutput>;
}

/// `govc` backed driver
#[derive(Debug, Clone)]
pub struct GovcDriver {
    binary: PathBuf,
    url: String,
    username: String,
    password: String,
}

impl GovcDriver {
    pub fn new(binary: impl Into<PathBuf>, url: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            url: url.into(),
            username: username.into(),
            password: password.into(),
        }
    }
}

#[async_trait]
impl VirtualizationDriver for GovcDriver {
    async fn run(&self, command: &str, args: Vec<String>) -> SharedResult<CommandOutput> {
        // `env` would print the credentials we pass in
        if command == "env" {
            return Err(SharedError::ProhibitedCommand {
                command: command.to_string(),
            });
        }

        process_info!(ProcessId::current(), "AUDIT\tGOVC\t['{}' '{}']", command, args.join("' '"));

        let output = Command::new(&self.binary)
            .arg(command)
            .args(&args)
            .env("GOVC_URL", &self.url)
            .env("GOVC_USERNAME", &self.username)
            .env("GOVC_PASSWORD", &self.password)
            .env("GOVC_INSECURE", "true")
            .env("GOVC_PERSIST_SESSION", "true")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| SharedError::DriverError {
                command: command.to_string(),
                message: e.to_string(),
            })?;

        Ok(CommandOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Virtual NIC state as reported by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceDescriptor {
    pub index: u32,
    pub mac: String,
    pub start_connected: bool,
    pub connected: bool,
}

impl InterfaceDescriptor {
    pub fn is_healthy(&self) -> bool {
        self.start_connected && self.connected
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DeviceInfo {
    #[serde(default)]
    devices: Vec<Device>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Device {
    #[serde(default)]
    mac_address: String,
    connectable: Option<Connectable>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Connectable {
    #[serde(default)]
    start_connected: bool,
    #[serde(default)]
    connected: bool,
}

/// Read `device.info -json` output; `None` when the device does not exist
pub fn parse_interface(index: u32, stdout: &str) -> SharedResult<Option<InterfaceDescriptor>> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(None);
    }

    let info: DeviceInfo = serde_json::from_str(trimmed).map_err(|e| SharedError::parse("device.info", e.to_string()))?;
    Ok(info.devices.into_iter().next().map(|device| {
        let connectable = device.connectable.unwrap_or(Connectable {
            start_connected: false,
            connected: false,
        });
        InterfaceDescriptor {
            index,
            mac: device.mac_address,
            start_connected: connectable.start_connected,
            connected: connectable.connected,
        }
    }))
}

/// Host names from `host.info <cluster>` (lines of the form `Name: <host>`)
pub fn parse_host_names(stdout: &str) -> Vec<String> {
    static HOST_LINE: OnceLock<Regex> = OnceLock::new();
    let regex = HOST_LINE.get_or_init(|| Regex::new(r"^Name:\s+(.*)$").expect("valid host regex"));

    stdout
        .lines()
        .filter_map(|line| regex.captures(line.trim_end()))
        .map(|captures| captures[1].trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

/// Inventory paths, one per line, as printed by `find` and `ls`
pub fn parse_paths(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MetricSample {
    #[serde(default)]
    sample: Vec<MetricEntity>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MetricEntity {
    #[serde(default)]
    value: Vec<MetricSeries>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MetricSeries {
    #[serde(default)]
    value: Vec<i64>,
}

/// Most recent value of the first series in `metric.sample -json` output
pub fn parse_metric_latest(stdout: &str) -> SharedResult<i64> {
    let sample: MetricSample = serde_json::from_str(stdout).map_err(|e| SharedError::parse("metric.sample", e.to_string()))?;
    sample
        .sample
        .first()
        .and_then(|entity| entity.value.first())
        .and_then(|series| series.value.last().copied())
        .ok_or_else(|| SharedError::parse("metric.sample", "no sample values"))
}

/// Datastore name with its free space in bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatastoreFree {
    pub name: String,
    pub free_space: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DatastoreInfo {
    #[serde(default)]
    datastores: Vec<DatastoreEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DatastoreEntry {
    name: String,
    info: DatastoreSpace,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DatastoreSpace {
    #[serde(default)]
    free_space: u64,
}

/// Datastores from `datastore.info -json`
pub fn parse_datastores(stdout: &str) -> SharedResult<Vec<DatastoreFree>> {
    let info: DatastoreInfo = serde_json::from_str(stdout).map_err(|e| SharedError::parse("datastore.info", e.to_string()))?;
    Ok(info
        .datastores
        .into_iter()
        .map(|entry| DatastoreFree {
            name: entry.name,
            free_space: entry.info.free_space,
        })
        .collect())
}

/// Whether `vm.info -json` found exactly one machine
pub fn parse_single_vm(stdout: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(stdout)
        .ok()
        .and_then(|value| value.get("VirtualMachines").and_then(|vms| vms.as_array().map(Vec::len)))
        == Some(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_host_names() {
        let stdout = "Name:              esx-01.local\n  Path:  /dc/host/c1/esx-01.local\nName:  esx-02.local\nManufacturer: x\n";
        assert_eq!(parse_host_names(stdout), vec!["esx-01.local", "esx-02.local"]);
    }

    #[test]
    fn test_parse_metric_latest_takes_last_value() {
        let stdout = r#"{"Sample":[{"Value":[{"Value":[100,200,350]}]}]}"#;
        assert_eq!(parse_metric_latest(stdout).unwrap(), 350);
        assert!(parse_metric_latest(r#"{"Sample":[]}"#).is_err());
    }

    #[test]
    fn test_parse_interface() {
        let healthy = r#"{"Devices":[{"MacAddress":"00:50:56:01:02:03","Connectable":{"StartConnected":true,"Connected":true}}]}"#;
        let descriptor = parse_interface(1, healthy).unwrap().unwrap();
        assert!(descriptor.is_healthy());
        assert_eq!(descriptor.mac, "00:50:56:01:02:03");

        let broken = r#"{"Devices":[{"MacAddress":"00:50:56:aa:bb:cc","Connectable":{"StartConnected":false,"Connected":true}}]}"#;
        assert!(!parse_interface(1, broken).unwrap().unwrap().is_healthy());

        assert_eq!(parse_interface(1, "").unwrap(), None);
        assert_eq!(parse_interface(1, r#"{"Devices":[]}"#).unwrap(), None);
    }

    #[test]
    fn test_parse_datastores() {
        let stdout = r#"{"Datastores":[{"Name":"ds1","Info":{"FreeSpace":10}},{"Name":"ds2","Info":{"FreeSpace":30}}]}"#;
        let stores = parse_datastores(stdout).unwrap();
        assert_eq!(stores.len(), 2);
        assert_eq!(stores[1].name, "ds2");
    }

    #[tokio::test]
    async fn test_env_command_is_refused() {
        let driver = GovcDriver::new("/nonexistent/govc", "https://vc", "u", "p");
        let result = driver.run("env", vec![]).await;
        assert!(matches!(result, Err(SharedError::ProhibitedCommand { .. })));
    }
}
