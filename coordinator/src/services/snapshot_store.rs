//! JSON file snapshot store
//!
//! Keeps the last accepted snapshot on local disk so a restarted coordinator
//! can serve placements before its first probe finishes. Writes go to a
//! sibling temp file and are renamed into place.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::{CoordinatorError, CoordinatorResult};
use crate::traits::SnapshotStore;
use shared::{process_debug, ProcessId, UtilizationSnapshot};

pub struct JsonSnapshotStore {
    path: PathBuf,
}

impl JsonSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn persistence_error(&self, operation: &str, error: impl std::fmt::Display) -> CoordinatorError {
        CoordinatorError::PersistenceError {
            operation: operation.to_string(),
            path: self.path.display().to_string(),
            message: error.to_string(),
        }
    }
}

#[async_trait]
impl SnapshotStore for JsonSnapshotStore {
    async fn load(&self) -> CoordinatorResult<Option<UtilizationSnapshot>> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.persistence_error("read", e)),
        };

        let snapshot = serde_json::from_str(&content).map_err(|e| self.persistence_error("parse", e))?;
        Ok(Some(snapshot))
    }

    async fn save(&self, snapshot: &UtilizationSnapshot) -> CoordinatorResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| self.persistence_error("create directory", e))?;
        }

        let content = serde_json::to_string_pretty(snapshot)?;
        let temp = self.temp_path();
        fs::write(&temp, content)
            .await
            .map_err(|e| self.persistence_error("write", e))?;
        fs::rename(&temp, &self.path)
            .await
            .map_err(|e| self.persistence_error("rename", e))?;

        process_debug!(ProcessId::current(), "💾 Snapshot persisted to {}", self.path.display());
        Ok(())
    }
}
