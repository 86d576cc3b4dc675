//! Collision-free MAC and IP allocation
//!
//! Uniqueness across workers (and any other tool sharing the inventory) rests
//! entirely on the inventory: MACs are checked against every record, IPs are
//! claimed with a write-then-read-back lock token plus a timed reservation.

use chrono::Utc;
use ipnetwork::Ipv4Network;
use std::net::Ipv4Addr;
use std::sync::Arc;
use thiserror::Error;

use shared::{process_debug, process_info, ProcessId};

use crate::core::{generate_candidate, is_reserved};
use crate::error::{ProvisionError, ProvisionResult};
use crate::services::inventory::InventoryExt;
use crate::traits::{InventoryClient, Pinger};
use crate::types::MacAddress;

/// Upper bound on MAC candidates tried before giving up
pub const MAX_MAC_ATTEMPTS: usize = 1024;

/// A reservation younger than this blocks the address
pub const RESERVATION_SECS: i64 = 3600;

/// Inventory record holding `lock.<ip>`, `res.<ip>` and `last.<network>`
pub const FREEIP_RECORD: &str = "_freeip";

/// Inventory record holding `<network>.matchnet`
pub const NETWORKS_RECORD: &str = "_networks";

/// Why a candidate address was passed over
#[derive(Debug, Error)]
pub enum IpRejection {
    #[error("outside the assignable host range")]
    OutOfRange,

    #[error("responded to ping")]
    Alive,

    #[error("already used by {0}")]
    Duplicate(String),

    #[error("reserved at {reserved_at} for 3600s, now {now}")]
    Reserved { reserved_at: i64, now: i64 },

    #[error("lock acquired by another allocator")]
    LockLost,

    #[error(transparent)]
    Inventory(#[from] ProvisionError),
}

pub struct AddressAllocator {
    inventory: Arc<dyn InventoryClient>,
    pinger: Arc<dyn Pinger>,
    max_mac_attempts: usize,
}

impl AddressAllocator {
    pub fn new(inventory: Arc<dyn InventoryClient>, pinger: Arc<dyn Pinger>) -> Self {
        Self {
            inventory,
            pinger,
            max_mac_attempts: MAX_MAC_ATTEMPTS,
        }
    }

    pub fn with_max_mac_attempts(mut self, attempts: usize) -> Self {
        self.max_mac_attempts = attempts;
        self
    }

    pub async fn allocate_mac(&self) -> ProvisionResult<MacAddress> {
        self.allocate_mac_excluding(&[]).await
    }

    /// A MAC unknown to the inventory and not in `taken`
    ///
    /// Inventory failures end the search immediately.
    pub async fn allocate_mac_excluding(&self, taken: &[MacAddress]) -> ProvisionResult<MacAddress> {
        for _ in 0..self.max_mac_attempts {
            let candidate = generate_candidate(&mut rand::thread_rng());
            if is_reserved(&candidate) || taken.contains(&candidate) {
                continue;
            }
            if self.inventory.mac_available(&candidate).await? {
                return Ok(candidate);
            }
            process_debug!(ProcessId::current(), "MAC {} already registered", candidate);
        }

        Err(ProvisionError::exhausted(format!(
            "no unused MAC after {} candidates",
            self.max_mac_attempts
        )))
    }

    /// Claim a free address in `network`
    ///
    /// Tries the network's last handed-out address, then every address above
    /// it, then the whole block from the start.
    pub async fn free_ip(&self, network: &str) -> ProvisionResult<Ipv4Addr> {
        let last = self.last_address(network).await?;

        if let Some(last) = last {
            match self.check_ip(last, network).await {
                Ok(ip) => return Ok(ip),
                Err(rejection) => {
                    process_debug!(ProcessId::current(), "ip {} unusable: {}", last, rejection);
                }
            }
        }

        let hosts = host_addresses(self.network_block(network).await?);

        let above_last = hosts.iter().filter(|ip| last.map_or(true, |last| **ip > last));
        let wrap_around = hosts.iter().filter(|_| last.is_some());

        for &ip in above_last.chain(wrap_around) {
            match self.check_ip(ip, network).await {
                Ok(ip) => return Ok(ip),
                Err(rejection) => {
                    process_debug!(ProcessId::current(), "ip {} unusable: {}", ip, rejection);
                }
            }
        }

        Err(ProvisionError::exhausted(format!("no usable IP in {network}")))
    }

    /// Validate `ip` and, if it passes, lock and reserve it for this caller
    pub async fn check_ip(&self, ip: Ipv4Addr, network: &str) -> Result<Ipv4Addr, IpRejection> {
        let host = ip.octets()[3];
        if host <= 8 || host >= 254 {
            return Err(IpRejection::OutOfRange);
        }

        if self.pinger.is_alive(ip).await {
            return Err(IpRejection::Alive);
        }

        let dupes = self.inventory.search(vec![format!("svc.%.ip={ip}")]).await?;
        if !dupes.is_empty() {
            return Err(IpRejection::Duplicate(dupes.join(", ")));
        }

        let now = Utc::now().timestamp();
        let reserved_at = self
            .inventory
            .get_value(FREEIP_RECORD, &format!("res.{ip}"))
            .await?
            .and_then(|ts| ts.trim().parse::<i64>().ok());
        if let Some(reserved_at) = reserved_at {
            if reserved_at > now - RESERVATION_SECS {
                return Err(IpRejection::Reserved { reserved_at, now });
            }
        }

        let token = format!("alloc-{:016x}", rand::random::<u64>());
        let lock_key = format!("lock.{ip}");
        self.inventory.set_value(FREEIP_RECORD, &lock_key, &token).await?;

        let holder = self.inventory.get_value(FREEIP_RECORD, &lock_key).await?;
        if holder.as_deref() != Some(token.as_str()) {
            return Err(IpRejection::LockLost);
        }

        self.inventory
            .set_value(FREEIP_RECORD, &format!("res.{ip}"), &Utc::now().timestamp().to_string())
            .await?;
        self.inventory
            .set_value(FREEIP_RECORD, &format!("last.{network}"), &ip.to_string())
            .await?;

        process_info!(ProcessId::current(), "📍 Reserved {} in {}", ip, network);
        Ok(ip)
    }

    async fn last_address(&self, network: &str) -> ProvisionResult<Option<Ipv4Addr>> {
        let raw = self
            .inventory
            .get_value(FREEIP_RECORD, &format!("last.{network}"))
            .await?;
        Ok(raw.and_then(|raw| raw.trim().parse().ok()))
    }

    async fn network_block(&self, network: &str) -> ProvisionResult<Ipv4Network> {
        let raw = self
            .inventory
            .get_value(NETWORKS_RECORD, &format!("{network}.matchnet"))
            .await?
            .ok_or_else(|| ProvisionError::config(format!("invalid network {network}")))?;
        raw.trim()
            .parse()
            .map_err(|e| ProvisionError::config(format!("bad matchnet '{raw}' for {network}: {e}")))
    }
}

/// Usable host addresses of `block` in ascending order
pub fn host_addresses(block: Ipv4Network) -> Vec<Ipv4Addr> {
    let network = block.network();
    let broadcast = block.broadcast();
    block
        .iter()
        .filter(|ip| block.prefix() >= 31 || (*ip != network && *ip != broadcast))
        .collect()
}
