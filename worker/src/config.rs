//! Static datacenter and OS catalogs
//!
//! Read once at start-up from a directory of JSON files and never mutated:
//! `datacenter.json` and `os.json` are required, `chefenv.json` and
//! `bootstrap.json` are optional.

use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

use crate::error::{ProvisionError, ProvisionResult};
use crate::types::{DatacenterConfig, Deployment, OsBlock, OsConfig};

/// Datacenter key holding the template for every PINF datacenter
const PINF_TEMPLATE: &str = "pinf";

#[derive(Debug, Clone, Deserialize)]
struct DatacenterEntry {
    #[serde(rename = "isPinf", default)]
    is_pinf: bool,
    #[serde(default)]
    domain: String,
    #[serde(default)]
    networks: Vec<String>,
    #[serde(default)]
    comment: String,
}

/// First-boot script run over SSH once the machine has an address
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BootstrapScript {
    pub user: String,
    pub command: String,
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    datacenters: HashMap<String, DatacenterEntry>,
    os: HashMap<String, HashMap<String, String>>,
    chef_envs: HashMap<String, String>,
    bootstrap: HashMap<String, BootstrapScript>,
}

impl Catalog {
    pub fn load(dir: &Path) -> ProvisionResult<Self> {
        let read = |name: &str| -> ProvisionResult<String> {
            std::fs::read_to_string(dir.join(name))
                .map_err(|e| ProvisionError::config(format!("cannot read {}: {e}", dir.join(name).display())))
        };
        let read_optional = |name: &str| -> ProvisionResult<Option<String>> {
            let path = dir.join(name);
            if path.exists() {
                Ok(Some(std::fs::read_to_string(path)?))
            } else {
                Ok(None)
            }
        };

        Self::from_json(
            &read("datacenter.json")?,
            &read("os.json")?,
            read_optional("chefenv.json")?.as_deref(),
            read_optional("bootstrap.json")?.as_deref(),
        )
    }

    pub fn from_json(
        datacenters: &str,
        os: &str,
        chef_envs: Option<&str>,
        bootstrap: Option<&str>,
    ) -> ProvisionResult<Self> {
        Ok(Self {
            datacenters: serde_json::from_str(datacenters)?,
            os: serde_json::from_str(os)?,
            chef_envs: chef_envs
                .map(serde_json::from_str::<HashMap<String, String>>)
                .transpose()?
                .unwrap_or_default(),
            bootstrap: bootstrap
                .map(serde_json::from_str::<HashMap<String, BootstrapScript>>)
                .transpose()?
                .unwrap_or_default(),
        })
    }

    /// Resolve `name`, expanding PINF datacenters from the shared template
    pub fn datacenter(&self, name: &str) -> ProvisionResult<DatacenterConfig> {
        let key = if name.starts_with(PINF_TEMPLATE) { PINF_TEMPLATE } else { name };
        let entry = self
            .datacenters
            .get(key)
            .ok_or_else(|| ProvisionError::config(format!("datacenter '{name}' unknown")))?;

        let mut config = DatacenterConfig {
            name: name.to_string(),
            is_pinf: entry.is_pinf,
            domain: entry.domain.clone(),
            networks: entry.networks.clone(),
            comment: entry.comment.clone(),
            chef_env: None,
            vlan: None,
        };

        if entry.is_pinf {
            let (vlan, domain_index) = parse_pinf_name(name)?;
            let pinf_name = format!("pinf{vlan}");
            config.chef_env = Some(self.chef_envs.get(&pinf_name).cloned().unwrap_or(pinf_name));
            config.networks = config
                .networks
                .iter()
                .map(|net| net.replace("$PINF", &vlan.to_string()))
                .collect();
            if config.domain.is_empty() || config.domain == "auto" {
                config.domain = format!("DOM{domain_index}");
            }
            config.vlan = Some(vlan);
        }

        if config.networks.is_empty() {
            return Err(ProvisionError::config(format!("datacenter '{name}' has no networks")));
        }

        Ok(config)
    }

    /// Look up `os` in `block`: `<guest>` means PXE, `<guest>!template:<name>` a clone
    pub fn os(&self, block: OsBlock, os: &str) -> ProvisionResult<OsConfig> {
        static ENTRY: OnceLock<Regex> = OnceLock::new();
        let regex = ENTRY.get_or_init(|| Regex::new(r"(?i)^([^!]+)(?:!(?:local|template):(\S+))?$").expect("valid os regex"));

        let raw = self
            .os
            .get(block.as_str())
            .and_then(|entries| entries.get(os))
            .ok_or_else(|| ProvisionError::config(format!("OS {os} not found in os-block {block}")))?;

        let captures = regex
            .captures(raw)
            .ok_or_else(|| ProvisionError::config(format!("malformed OS entry for {os}: '{raw}'")))?;

        let deployment = match captures.get(2) {
            Some(template) => Deployment::Template {
                template: template.as_str().to_string(),
            },
            None => Deployment::Pxe { target: os.to_string() },
        };

        Ok(OsConfig {
            name: os.to_string(),
            guest: captures[1].to_string(),
            deployment,
        })
    }

    pub fn bootstrap(&self, os: &str) -> Option<&BootstrapScript> {
        self.bootstrap.get(os)
    }
}

/// `pinf642_2` → (642, 2)
fn parse_pinf_name(name: &str) -> ProvisionResult<(u16, u8)> {
    static PINF: OnceLock<Regex> = OnceLock::new();
    let regex = PINF.get_or_init(|| Regex::new(r"pinf(6\d\d)_([12])").expect("valid pinf regex"));

    let captures = regex
        .captures(name)
        .ok_or_else(|| ProvisionError::config(format!("could not parse pinf dc '{name}'")))?;
    let vlan = captures[1]
        .parse()
        .map_err(|_| ProvisionError::config(format!("bad vlan in '{name}'")))?;
    let domain = captures[2]
        .parse()
        .map_err(|_| ProvisionError::config(format!("bad domain index in '{name}'")))?;
    Ok((vlan, domain))
}
