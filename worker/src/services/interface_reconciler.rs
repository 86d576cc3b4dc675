//! Network interface reconciliation
//!
//! Brings interface `ethernet-<index>` of a machine to "attached, connected,
//! registered under `macs.<index>`" whatever state it starts in. A healthy
//! interface is only re-registered; a half-configured one is removed and
//! re-added with the best MAC available, preferring the inventory's record,
//! then the MAC the broken interface carried, then a newly allocated one.

use std::sync::Arc;

use shared::driver::parse_interface;
use shared::{process_info, ProcessId, VirtualizationDriver};

use crate::core::ActionLog;
use crate::error::{ProvisionError, ProvisionResult};
use crate::services::address_allocator::AddressAllocator;
use crate::services::inventory::InventoryExt;
use crate::traits::InventoryClient;
use crate::types::{mac_key, MacAddress};

/// Where the MAC of a re-attached interface came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacSource {
    Inventory,
    /// Taken over from the broken interface that was removed
    Reused,
    Allocated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Already attached and connected; nothing changed on the platform
    Healthy { mac: String },
    Attached { mac: MacAddress, source: MacSource },
}

impl ReconcileOutcome {
    pub fn mac(&self) -> String {
        match self {
            ReconcileOutcome::Healthy { mac } => mac.clone(),
            ReconcileOutcome::Attached { mac, .. } => mac.to_string(),
        }
    }
}

pub struct InterfaceReconciler {
    driver: Arc<dyn VirtualizationDriver>,
    inventory: Arc<dyn InventoryClient>,
    allocator: Arc<AddressAllocator>,
}

impl InterfaceReconciler {
    pub fn new(
        driver: Arc<dyn VirtualizationDriver>,
        inventory: Arc<dyn InventoryClient>,
        allocator: Arc<AddressAllocator>,
    ) -> Self {
        Self {
            driver,
            inventory,
            allocator,
        }
    }

    pub async fn reconcile(
        &self,
        machine_id: &str,
        vm: &str,
        index: u32,
        network: &str,
        log: &ActionLog,
    ) -> ProvisionResult<ReconcileOutcome> {
        let device = format!("ethernet-{index}");
        let key = mac_key(index);

        // Inspect
        let inspected = self
            .driver
            .run("device.info", vec!["-json".into(), "-vm".into(), vm.into(), device.clone()])
            .await?;
        let descriptor = if inspected.success() {
            parse_interface(index, &inspected.stdout)?
        } else {
            None
        };

        let mut captured = None;
        if let Some(descriptor) = descriptor {
            if descriptor.is_healthy() {
                let mac = MacAddress::parse_reported(&descriptor.mac)
                    .map(|mac| mac.to_string())
                    .unwrap_or(descriptor.mac);
                log.err(format!("{device} is already ok ({mac})"));
                self.inventory.set_value(machine_id, &key, &mac).await?;
                return Ok(ReconcileOutcome::Healthy { mac });
            }

            log.err(format!("{device} has broken config, removing it"));
            captured = MacAddress::parse_reported(&descriptor.mac);

            let removed = self
                .driver
                .run("device.remove", vec![format!("-vm={vm}"), device.clone()])
                .await?;
            if !removed.success() {
                return Err(ProvisionError::driver(
                    "device.remove",
                    format!("could not remove {device}: {}", removed.stderr.trim()),
                ));
            }
        }

        // Allocate
        let recorded = self.inventory.get_value(machine_id, &key).await?;
        let (mac, source) = match recorded {
            Some(raw) => {
                let mac: MacAddress = raw.parse()?;
                log.err(format!("Using MAC {mac} from inventory"));
                (mac, MacSource::Inventory)
            }
            None => {
                let (mac, source) = match captured {
                    Some(mac) => {
                        log.err(format!("Reusing MAC {mac} from old interface"));
                        (mac, MacSource::Reused)
                    }
                    None => {
                        let mac = self.allocator.allocate_mac().await?;
                        log.err(format!("Generated MAC {mac}"));
                        (mac, MacSource::Allocated)
                    }
                };
                self.inventory.set_value(machine_id, &key, &mac.to_string()).await?;
                (mac, source)
            }
        };

        // Attach
        let attached = self
            .driver
            .run(
                "vm.network.add",
                vec![
                    format!("-vm={vm}"),
                    format!("-net={network}"),
                    "-net.adapter=vmxnet3".to_string(),
                    format!("-net.address={mac}"),
                ],
            )
            .await?;
        if !attached.success() {
            return Err(ProvisionError::InterfaceAttachFailed {
                vm: vm.to_string(),
                index,
                message: attached.stderr.trim().to_string(),
            });
        }

        log.err(format!("Added {device} on {network} with {mac}"));
        process_info!(ProcessId::current(), "🔌 {} {} attached to {} ({:?})", vm, device, network, source);
        Ok(ReconcileOutcome::Attached { mac, source })
    }
}
