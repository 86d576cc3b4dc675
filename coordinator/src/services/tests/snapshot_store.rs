//! Tests for JsonSnapshotStore

use std::collections::BTreeMap;
use tempfile::TempDir;
use tokio_test::assert_ok;

use crate::services::snapshot_store::JsonSnapshotStore;
use crate::traits::SnapshotStore;
use crate::CoordinatorError;
use shared::{ClusterUsage, UtilizationSnapshot};

fn sample_snapshot() -> UtilizationSnapshot {
    let mut clusters = BTreeMap::new();
    clusters.insert(
        "/dc/host/DOM1/NUE-DOM1-Cluster-1".to_string(),
        ClusterUsage {
            free_cpu_mhz: 42_000,
            free_mem_mib: 512_000,
            hosts: vec!["esx-01".to_string(), "esx-02".to_string()],
        },
    );
    UtilizationSnapshot::new(clusters)
}

#[tokio::test]
async fn test_load_missing_file_is_none() {
    let dir = TempDir::new().unwrap();
    let store = JsonSnapshotStore::new(dir.path().join("snapshot.json"));

    assert!(store.load().await.unwrap().is_none());
}

#[tokio::test]
async fn test_save_then_load() {
    let dir = TempDir::new().unwrap();
    let store = JsonSnapshotStore::new(dir.path().join("state").join("snapshot.json"));
    let snapshot = sample_snapshot();

    assert_ok!(store.save(&snapshot).await);

    assert_eq!(assert_ok!(store.load().await), Some(snapshot));
    assert!(!dir.path().join("state").join("snapshot.json.tmp").exists());
}

#[tokio::test]
async fn test_corrupt_file_is_persistence_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("snapshot.json");
    std::fs::write(&path, "{ not json").unwrap();

    let result = JsonSnapshotStore::new(path).load().await;
    assert!(matches!(result, Err(CoordinatorError::PersistenceError { .. })));
}
