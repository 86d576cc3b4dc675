//! Address allocation and interface repair against the in-memory inventory

use chrono::Utc;
use std::net::Ipv4Addr;

use worker::services::{MacSource, ReconcileOutcome};
use worker::{ActionLog, ProvisionError};

mod common;
use common::{ok, FakeInventory, Harness, RecordingDriver, ScriptedPinger};

fn network(last: Option<&str>) -> FakeInventory {
    let inventory = FakeInventory::new().with_record("_networks", &[("net1.matchnet", "10.0.0.0/24")]);
    match last {
        Some(last) => inventory.with_record("_freeip", &[("last.net1", last)]),
        None => inventory,
    }
}

fn healthy_device(mac: &str) -> String {
    format!(r#"{{"Devices":[{{"MacAddress":"{mac}","Connectable":{{"StartConnected":true,"Connected":true}}}}]}}"#)
}

#[tokio::test]
async fn test_freeip_skips_reserved_last_address() {
    let reserved_at = (Utc::now().timestamp() - 60).to_string();
    let inventory = network(Some("10.0.0.20")).with_record("_freeip", &[("res.10.0.0.20", &reserved_at)]);
    let harness = Harness::new(inventory, RecordingDriver::new());

    let ip = harness.provisioner().allocator().free_ip("net1").await.unwrap();

    assert_eq!(ip, Ipv4Addr::new(10, 0, 0, 21));
    assert_eq!(harness.inventory.value("_freeip", "last.net1").as_deref(), Some("10.0.0.21"));
    assert!(harness.inventory.value("_freeip", "res.10.0.0.21").is_some());
    assert!(harness
        .inventory
        .value("_freeip", "lock.10.0.0.21")
        .unwrap()
        .starts_with("alloc-"));
    // The old reservation is left alone
    assert_eq!(harness.inventory.value("_freeip", "res.10.0.0.20"), Some(reserved_at));
}

#[tokio::test]
async fn test_freeip_reuses_expired_reservation() {
    let expired = (Utc::now().timestamp() - 7200).to_string();
    let inventory = network(Some("10.0.0.30")).with_record("_freeip", &[("res.10.0.0.30", &expired)]);
    let harness = Harness::new(inventory, RecordingDriver::new());

    let ip = harness.provisioner().allocator().free_ip("net1").await.unwrap();

    assert_eq!(ip, Ipv4Addr::new(10, 0, 0, 30));
}

#[tokio::test]
async fn test_freeip_skips_used_and_live_addresses() {
    let inventory = network(None).with_record("srv000042", &[("svc.web.ip", "10.0.0.9")]);
    let harness = Harness::new(inventory, RecordingDriver::new())
        .with_pinger(ScriptedPinger::alive(&[Ipv4Addr::new(10, 0, 0, 10)]));

    let ip = harness.provisioner().allocator().free_ip("net1").await.unwrap();

    assert_eq!(ip, Ipv4Addr::new(10, 0, 0, 11));
}

#[tokio::test]
async fn test_freeip_wraps_around_to_the_start() {
    let reserved_at = Utc::now().timestamp().to_string();
    let inventory = network(Some("10.0.0.253")).with_record("_freeip", &[("res.10.0.0.253", &reserved_at)]);
    let harness = Harness::new(inventory, RecordingDriver::new());

    let ip = harness.provisioner().allocator().free_ip("net1").await.unwrap();

    assert_eq!(ip, Ipv4Addr::new(10, 0, 0, 9));
}

#[tokio::test]
async fn test_freeip_exhausted_network() {
    // Every host of a /29 at the bottom of the block is below the assignable range
    let inventory = FakeInventory::new().with_record("_networks", &[("tiny.matchnet", "10.0.0.0/29")]);
    let harness = Harness::new(inventory, RecordingDriver::new());

    let result = harness.provisioner().allocator().free_ip("tiny").await;

    assert!(matches!(result, Err(ProvisionError::AddressExhausted { .. })));
}

#[tokio::test]
async fn test_reconcile_twice_changes_nothing_the_second_time() {
    let mac = "00:50:56:12:34:56";
    let inventory = FakeInventory::new().with_record("srv000007", &[("macs.1", mac)]);
    let driver = RecordingDriver::new()
        .respond("device.info", ok(""))
        .respond("device.info", ok(&healthy_device(mac)));
    let harness = Harness::new(inventory, driver);
    let reconciler = harness.provisioner().reconciler();

    let first = reconciler
        .reconcile("srv000007", "vm/srv000007", 1, "net-b", &ActionLog::new())
        .await
        .unwrap();
    let second = reconciler
        .reconcile("srv000007", "vm/srv000007", 1, "net-b", &ActionLog::new())
        .await
        .unwrap();

    assert!(matches!(first, ReconcileOutcome::Attached { source: MacSource::Inventory, .. }));
    assert_eq!(second, ReconcileOutcome::Healthy { mac: mac.to_string() });
    assert_eq!(harness.driver.count("vm.network.add"), 1);
    assert_eq!(harness.driver.count("device.remove"), 0);
    assert_eq!(harness.inventory.value("srv000007", "macs.1").as_deref(), Some(mac));
}

#[tokio::test]
async fn test_reconcile_healthy_interface_twice_is_a_no_op() {
    let mac = "00:50:56:12:34:56";
    let inventory = FakeInventory::new().with_record("srv000009", &[("macs.1", mac)]);
    let harness = Harness::new(inventory, RecordingDriver::new().respond("device.info", ok(&healthy_device(mac))));
    let reconciler = harness.provisioner().reconciler();

    for _ in 0..2 {
        let outcome = reconciler
            .reconcile("srv000009", "vm/srv000009", 1, "net-b", &ActionLog::new())
            .await
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::Healthy { mac: mac.to_string() });
    }

    assert_eq!(harness.driver.names(), vec!["device.info", "device.info"]);
    assert_eq!(harness.inventory.value("srv000009", "macs.1").as_deref(), Some(mac));
    assert!(!harness.inventory.calls().iter().any(|(method, _)| method == "textsearch"));
}

#[tokio::test]
async fn test_broken_interface_keeps_its_mac() {
    let broken = r#"{"Devices":[{"MacAddress":"00:50:56:AA:BB:CC","Connectable":{"StartConnected":true,"Connected":false}}]}"#;
    let inventory = FakeInventory::new().with_record("srv000008", &[("macs.0", "00:50:56:00:00:01")]);
    let harness = Harness::new(inventory, RecordingDriver::new().respond("device.info", ok(broken)));

    let outcome = harness
        .provisioner()
        .reconciler()
        .reconcile("srv000008", "vm/srv000008", 1, "net-b", &ActionLog::new())
        .await
        .unwrap();

    assert_eq!(outcome.mac(), "00:50:56:aa:bb:cc");
    assert_eq!(
        harness.driver.names(),
        vec!["device.info", "device.remove", "vm.network.add"]
    );
    assert_eq!(
        harness.inventory.value("srv000008", "macs.1").as_deref(),
        Some("00:50:56:aa:bb:cc")
    );
}
