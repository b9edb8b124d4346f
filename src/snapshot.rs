//! Persistence of the file list from the last successful install.

use crate::error::{InstallError, Result};
use crate::types::PackFile;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const SNAPSHOT_NAME: &str = "installed";

/// Reads and writes `<root>/<state dir>/installed.json`.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: &Path, state_dir: &str) -> Self {
        Self {
            path: root
                .join(state_dir)
                .join(format!("{}.json", SNAPSHOT_NAME)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the previously installed files; a missing snapshot means a first install.
    pub async fn load(&self) -> Result<Vec<PackFile>> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No snapshot at {}, treating as first install", self.path.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(InstallError::io("read", &self.path, e)),
        };

        serde_json::from_slice(&data).map_err(|source| InstallError::Snapshot {
            path: self.path.clone(),
            source,
        })
    }

    /// Replaces the snapshot with `files`.
    ///
    /// The document is written to a sibling file and renamed into place, so a
    /// reader sees either the old snapshot or the new one.
    pub async fn save(&self, files: &[PackFile]) -> Result<()> {
        let json = serde_json::to_vec_pretty(files).map_err(|source| InstallError::Snapshot {
            path: self.path.clone(),
            source,
        })?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| InstallError::io("create directory", parent, e))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| InstallError::io("write", &tmp, e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| InstallError::io("rename", &self.path, e))?;

        info!("Persisted {} files to {}", files.len(), self.path.display());
        Ok(())
    }
}
