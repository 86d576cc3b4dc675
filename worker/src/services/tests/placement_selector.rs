//! Tests for PlacementSelector

use std::collections::BTreeMap;
use std::sync::Arc;

use shared::{ClusterUsage, CommandOutput, MockVirtualizationDriver, UtilizationSnapshot};

use crate::services::placement_selector::PlacementSelector;
use crate::traits::MockLedgerClient;
use crate::ProvisionError;

fn snapshot() -> UtilizationSnapshot {
    let mut clusters = BTreeMap::new();
    clusters.insert(
        "/dc/host/DOM1/cluster-a".to_string(),
        ClusterUsage {
            free_cpu_mhz: 80_000,
            free_mem_mib: 200_000,
            hosts: vec!["esx-a1".to_string(), "esx-a2".to_string()],
        },
    );
    clusters.insert(
        "/dc/host/DOM1/cluster-b".to_string(),
        ClusterUsage {
            free_cpu_mhz: 10_000,
            free_mem_mib: 20_000,
            hosts: vec!["esx-b1".to_string()],
        },
    );
    clusters.insert(
        "/dc/host/DOM2/cluster-c".to_string(),
        ClusterUsage {
            free_cpu_mhz: 900_000,
            free_mem_mib: 900_000,
            hosts: vec!["esx-c1".to_string()],
        },
    );
    UtilizationSnapshot::new(clusters)
}

const DATASTORES: &str = r#"{"Datastores":[
    {"Name":"cluster-a-ds1","Info":{"FreeSpace":1000}},
    {"Name":"cluster-a-ds2","Info":{"FreeSpace":5000}}
]}"#;

fn ledger() -> MockLedgerClient {
    let mut ledger = MockLedgerClient::new();
    ledger.expect_snapshot().returning(|| Ok(snapshot()));
    ledger
}

#[tokio::test]
async fn test_place_picks_roomiest_cluster_in_domain() {
    let mut driver = MockVirtualizationDriver::new();
    driver
        .expect_run()
        .withf(|command, args| command == "datastore.info" && args == &vec!["-json".to_string(), "cluster-a/*".to_string()])
        .times(1)
        .returning(|_, _| {
            Ok(CommandOutput {
                status: 0,
                stdout: DATASTORES.to_string(),
                stderr: String::new(),
            })
        });

    let placement = PlacementSelector::new(Arc::new(ledger()), Arc::new(driver))
        .place("DOM1")
        .await
        .unwrap();

    assert_eq!(placement.cluster, "/dc/host/DOM1/cluster-a");
    assert_eq!(placement.datastore, "cluster-a-ds2");
    assert!(placement.host.starts_with("esx-a"));
}

#[tokio::test]
async fn test_empty_domain_has_no_placement() {
    let selector = PlacementSelector::new(Arc::new(ledger()), Arc::new(MockVirtualizationDriver::new()));

    let result = selector.select_cluster("DOM7").await;

    assert!(matches!(result, Err(ProvisionError::ResourceUnavailable { .. })));
}

#[tokio::test]
async fn test_datastore_lookup_failure() {
    let mut driver = MockVirtualizationDriver::new();
    driver.expect_run().returning(|_, _| {
        Ok(CommandOutput {
            status: 1,
            stdout: String::new(),
            stderr: "datastore 'x/*' not found".to_string(),
        })
    });
    let selector = PlacementSelector::new(Arc::new(ledger()), Arc::new(driver));

    let result = selector.select_storage("/dc/host/DOM1/x").await;

    assert!(matches!(result, Err(ProvisionError::DriverFailure { .. })));
}

#[tokio::test]
async fn test_unknown_cluster_has_no_host() {
    let selector = PlacementSelector::new(Arc::new(ledger()), Arc::new(MockVirtualizationDriver::new()));

    let result = selector.select_host("/dc/host/DOM1/gone").await;

    assert!(matches!(result, Err(ProvisionError::ResourceUnavailable { .. })));
}

#[tokio::test]
async fn test_debit_forwards_to_ledger() {
    let mut ledger = MockLedgerClient::new();
    ledger
        .expect_debit()
        .withf(|cluster, cores, memory| cluster == "/dc/host/DOM1/cluster-a" && *cores == 4 && *memory == 8)
        .times(1)
        .returning(|_, _, _| Ok(true));
    let selector = PlacementSelector::new(Arc::new(ledger), Arc::new(MockVirtualizationDriver::new()));

    assert!(selector.debit("/dc/host/DOM1/cluster-a", 4, 8).await.unwrap());
}
