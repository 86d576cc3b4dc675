//! Inventory HTTP client
//!
//! Every operation is one command in a JSON batch posted to
//! `<base>/cmd.php?fmt=json` with basic auth. An `error` field, either on the
//! batch or on the command, is turned into `ProvisionError::Inventory`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;

use shared::{process_debug, ProcessId};

use crate::error::{ProvisionError, ProvisionResult};
use crate::traits::InventoryClient;
use crate::types::{HistoryEntry, MacAddress, Properties};

/// Property groups removed when a machine is purged
pub const PURGE_GROUPS: &[&str] = &[
    "svc",
    "app",
    "dhcp",
    "dyndns",
    "gpg",
    "heartbeat",
    "keytab",
    "monitoring",
    "mysql",
    "network",
    "os",
    "perf",
    "vpn",
    "syncbase",
    "apt",
];

#[derive(Serialize, Default)]
struct Command<'a> {
    cmd: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    host: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    props: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    search: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    method: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    args: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    onlycurrent: Option<bool>,
}

#[derive(Serialize)]
struct Batch<'a> {
    cmds: Vec<Command<'a>>,
}

#[derive(Deserialize)]
struct BatchResponse {
    #[serde(default)]
    cmds: Vec<CommandResponse>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize, Default)]
struct CommandResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    props: Value,
    #[serde(default)]
    output: Option<String>,
    #[serde(default)]
    hosts: Value,
}

fn is_error(message: &Option<String>) -> Option<&str> {
    message.as_deref().filter(|m| !m.is_empty())
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Property map from an object; the server sends `[]` for "nothing"
fn to_properties(value: &Value) -> Properties {
    value
        .as_object()
        .map(|map| map.iter().map(|(k, v)| (k.clone(), value_text(v))).collect())
        .unwrap_or_default()
}

/// Property names; an empty list asks for everything
fn prop_list(props: Vec<String>) -> Value {
    if props.is_empty() {
        json!([""])
    } else {
        json!(props)
    }
}

pub struct HttpInventoryClient {
    client: reqwest::Client,
    endpoint: String,
    username: String,
    password: String,
}

impl HttpInventoryClient {
    pub fn new(base_url: &str, username: impl Into<String>, password: impl Into<String>) -> ProvisionResult<Self> {
        let client = reqwest::Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/cmd.php?fmt=json", base_url.trim_end_matches('/')),
            username: username.into(),
            password: password.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn execute(&self, command: Command<'_>) -> ProvisionResult<CommandResponse> {
        process_debug!(
            ProcessId::current(),
            "🗄️ inventory {} {}",
            command.cmd,
            command.host.unwrap_or_default()
        );

        let response: BatchResponse = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.username, Some(&self.password))
            .json(&Batch { cmds: vec![command] })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(message) = is_error(&response.error) {
            return Err(ProvisionError::inventory(message));
        }

        let reply = response.cmds.into_iter().next().unwrap_or_default();
        if let Some(message) = is_error(&reply.error) {
            return Err(ProvisionError::inventory(message));
        }
        Ok(reply)
    }
}

#[async_trait]
impl InventoryClient for HttpInventoryClient {
    async fn get(&self, machine: &str, props: Vec<String>) -> ProvisionResult<Properties> {
        let reply = self
            .execute(Command {
                cmd: "get",
                host: Some(machine),
                props: Some(prop_list(props)),
                ..Default::default()
            })
            .await?;
        Ok(to_properties(&reply.props))
    }

    async fn set(&self, machine: &str, props: Properties) -> ProvisionResult<()> {
        self.execute(Command {
            cmd: "set",
            host: Some(machine),
            props: Some(json!(props)),
            ..Default::default()
        })
        .await?;
        Ok(())
    }

    async fn del(&self, machine: &str, props: Vec<String>) -> ProvisionResult<()> {
        self.execute(Command {
            cmd: "del",
            host: Some(machine),
            props: Some(prop_list(props)),
            ..Default::default()
        })
        .await?;
        Ok(())
    }

    async fn call(&self, method: &str, args: Vec<String>) -> ProvisionResult<String> {
        let reply = self
            .execute(Command {
                cmd: "call",
                method: Some(method),
                args: Some(args),
                ..Default::default()
            })
            .await?;
        Ok(reply.output.unwrap_or_default())
    }

    async fn property_search(&self, filters: Vec<String>) -> ProvisionResult<BTreeMap<String, Properties>> {
        let search: Properties = filters
            .iter()
            .filter_map(|filter| filter.split_once('='))
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();

        let reply = self
            .execute(Command {
                cmd: "propsearch",
                search: Some(json!(search)),
                ..Default::default()
            })
            .await?;

        Ok(reply
            .hosts
            .as_object()
            .map(|hosts| hosts.iter().map(|(host, props)| (host.clone(), to_properties(props))).collect())
            .unwrap_or_default())
    }

    async fn text_search(&self, query: &str) -> ProvisionResult<Vec<String>> {
        let reply = self
            .execute(Command {
                cmd: "textsearch",
                search: Some(json!(query)),
                ..Default::default()
            })
            .await?;

        Ok(match &reply.hosts {
            Value::Array(hosts) => hosts.iter().map(value_text).collect(),
            Value::Object(hosts) => hosts.keys().cloned().collect(),
            _ => Vec::new(),
        })
    }

    async fn history(&self, machine: &str, only_current: bool, props: Vec<String>) -> ProvisionResult<Vec<HistoryEntry>> {
        let reply = self
            .execute(Command {
                cmd: "history",
                host: Some(machine),
                props: Some(prop_list(props)),
                onlycurrent: Some(only_current),
                ..Default::default()
            })
            .await?;

        match reply.props {
            Value::Array(_) => Ok(serde_json::from_value(reply.props)?),
            _ => Ok(Vec::new()),
        }
    }
}

/// Conveniences built from the basic inventory operations
#[async_trait]
pub trait InventoryExt: InventoryClient {
    /// Single property value, `None` when unset or empty
    async fn get_value(&self, machine: &str, prop: &str) -> ProvisionResult<Option<String>> {
        let props = self.get(machine, vec![prop.to_string()]).await?;
        Ok(props.get(prop).or_else(|| props.values().next()).filter(|v| !v.is_empty()).cloned())
    }

    async fn set_value(&self, machine: &str, prop: &str, value: &str) -> ProvisionResult<()> {
        let mut props = Properties::new();
        props.insert(prop.to_string(), value.to_string());
        self.set(machine, props).await
    }

    /// Create a machine record owning `macs`; returns the new machine id
    async fn register_machine(&self, macs: &[MacAddress]) -> ProvisionResult<String> {
        let output = self.call("regsrv", macs.iter().map(ToString::to_string).collect()).await?;
        let id = output.trim().to_string();
        if id.is_empty() {
            return Err(ProvisionError::inventory("regsrv returned no machine id"));
        }
        Ok(id)
    }

    /// A single query without `=` is `service[.net]`; anything else is free text
    async fn search(&self, queries: Vec<String>) -> ProvisionResult<Vec<String>> {
        if let [query] = queries.as_slice() {
            if !query.contains('=') {
                let (service, net) = match query.split_once('.') {
                    Some((service, net)) if !net.is_empty() => (service, net),
                    Some((service, _)) => (service, "%"),
                    None => (query.as_str(), "%"),
                };
                let hosts = self
                    .property_search(vec![format!("svc.{service}.ip=%"), format!("net={net}")])
                    .await?;
                return Ok(hosts.into_keys().collect());
            }
        }
        self.text_search(&queries.join(" ")).await
    }

    /// Whether no record references `mac` yet
    async fn mac_available(&self, mac: &MacAddress) -> ProvisionResult<bool> {
        Ok(self.text_search(&format!("macs.%={mac}")).await?.is_empty())
    }

    /// Remove the service configuration of a machine and its DNS entries
    async fn purge(&self, machine: &str) -> ProvisionResult<String> {
        self.del(machine, PURGE_GROUPS.iter().map(|group| group.to_string()).collect())
            .await?;
        self.call("dyndns", vec![machine.to_string(), "purge".to_string()]).await
    }
}

impl<T: InventoryClient + ?Sized> InventoryExt for T {}
