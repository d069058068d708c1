//! Local backups of the confidence map
//!
//! Each backup is a standalone JSON file named `backup_<timestamp>.json`.
//! Only the newest [`MAX_BACKUPS`] are kept.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::error::{StorageError, StorageResult};
use super::persistence::atomic_write;
use crate::models::ConfidenceMap;

/// Number of backups retained after pruning
pub const MAX_BACKUPS: usize = 5;

const PREFIX: &str = "backup_";
const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.6fZ";

/// Content of a backup file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupFile {
    pub timestamp: DateTime<Utc>,
    pub data: ConfidenceMap,
    pub version: String,
}

/// A backup on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backup {
    pub path: PathBuf,
    pub name: String,
}

/// Creates, lists and prunes backups in one directory
pub struct BackupManager {
    dir: PathBuf,
}

impl BackupManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write a backup of `map` and prune old ones
    pub fn create(&self, map: &ConfidenceMap) -> StorageResult<Backup> {
        let now = Utc::now();
        let name = format!("{}{}.json", PREFIX, now.format(TIMESTAMP_FORMAT));
        let path = self.dir.join(&name);

        let file = BackupFile {
            timestamp: now,
            data: map.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        };
        atomic_write(&path, &serde_json::to_vec_pretty(&file)?)?;
        info!("Backed up {} entries to {:?}", map.len(), path);

        self.prune(MAX_BACKUPS)?;
        Ok(Backup { path, name })
    }

    /// List backups, newest first
    pub fn list(&self) -> StorageResult<Vec<Backup>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.dir).map_err(|source| StorageError::Read {
            path: self.dir.clone(),
            source,
        })?;

        let mut backups: Vec<Backup> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                (name.starts_with(PREFIX) && name.ends_with(".json")).then(|| Backup {
                    path: entry.path(),
                    name,
                })
            })
            .collect();

        // Timestamps sort lexicographically in chronological order
        backups.sort_by(|a, b| b.name.cmp(&a.name));
        Ok(backups)
    }

    /// Load a backup's content
    pub fn load(&self, backup: &Backup) -> StorageResult<BackupFile> {
        let bytes = fs::read(&backup.path).map_err(|source| StorageError::Read {
            path: backup.path.clone(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|e| StorageError::Corrupt {
            path: backup.path.clone(),
            details: e.to_string(),
        })
    }

    /// Delete all but the newest `keep` backups
    pub fn prune(&self, keep: usize) -> StorageResult<usize> {
        let stale: Vec<Backup> = self.list()?.into_iter().skip(keep).collect();
        for backup in &stale {
            fs::remove_file(&backup.path)
                .map_err(|e| StorageError::from_io(e, backup.path.clone()))?;
        }
        if !stale.is_empty() {
            debug!("Pruned {} old backups", stale.len());
        }
        Ok(stale.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> ConfidenceMap {
        let mut map = ConfidenceMap::new();
        map.insert("p1".to_string(), "medium".to_string());
        map
    }

    #[test]
    fn test_create_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let manager = BackupManager::new(temp_dir.path().join("backups"));

        let backup = manager.create(&sample()).unwrap();
        assert!(backup.path.exists());
        assert!(backup.name.starts_with("backup_"));

        let file = manager.load(&backup).unwrap();
        assert_eq!(file.data, sample());
    }

    #[test]
    fn test_list_missing_dir_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let manager = BackupManager::new(temp_dir.path().join("nope"));
        assert!(manager.list().unwrap().is_empty());
    }

    #[test]
    fn test_keeps_only_newest_five() {
        let temp_dir = TempDir::new().unwrap();
        let manager = BackupManager::new(temp_dir.path());

        let mut created = Vec::new();
        for _ in 0..8 {
            created.push(manager.create(&sample()).unwrap());
            std::thread::sleep(std::time::Duration::from_millis(2));
        }

        let remaining = manager.list().unwrap();
        assert_eq!(remaining.len(), MAX_BACKUPS);
        // Newest first, and the newest one survived
        assert_eq!(remaining[0], created[7]);
        assert!(!created[0].path.exists());
    }

    #[test]
    fn test_ignores_unrelated_files() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("notes.txt"), b"hi").unwrap();

        let manager = BackupManager::new(temp_dir.path());
        manager.create(&sample()).unwrap();

        assert_eq!(manager.list().unwrap().len(), 1);
        assert!(temp_dir.path().join("notes.txt").exists());
    }
}
