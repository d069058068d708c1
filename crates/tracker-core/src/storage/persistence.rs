//! File-backed local store
//!
//! Persists the device-local key-value state as a single JSON object.
//! Uses atomic writes (write to temp file, then rename) so a reader never
//! sees a partially-written file, even with several writers.
//!
//! Storage location: `~/.local/share/tracker/local_state.json`
//! (configurable via `Config`)
//!
//! Keys:
//! - `confidenceMap` - the `problemKey -> level` map
//! - `extensionVersion`, `installDate` - bookkeeping written on first open

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::error::{StorageError, StorageResult};
use super::LocalStore;
use crate::config::Config;
use crate::models::ConfidenceMap;

/// Key holding the confidence map
pub const CONFIDENCE_KEY: &str = "confidenceMap";

const VERSION_KEY: &str = "extensionVersion";
const INSTALL_DATE_KEY: &str = "installDate";

/// Bookkeeping stored next to the confidence map
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateMetadata {
    pub version: Option<String>,
    pub install_date: Option<DateTime<Utc>>,
}

/// Local store backed by a JSON file
pub struct FileStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Create a store over the given file (not touched until first use)
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Open the store at the configured location
    ///
    /// On first open, records the install date and client version.
    pub async fn open(config: &Config) -> StorageResult<Self> {
        let store = Self::new(config.local_state_path());
        store.ensure_metadata().await?;
        Ok(store)
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the bookkeeping metadata
    pub async fn metadata(&self) -> StateMetadata {
        let state = self.read_lenient().await;
        StateMetadata {
            version: state
                .get(VERSION_KEY)
                .and_then(Value::as_str)
                .map(str::to_string),
            install_date: state
                .get(INSTALL_DATE_KEY)
                .and_then(Value::as_str)
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|d| d.with_timezone(&Utc)),
        }
    }

    async fn ensure_metadata(&self) -> StorageResult<()> {
        self.update(|state| {
            let current = Value::String(env!("CARGO_PKG_VERSION").to_string());
            if state.get(VERSION_KEY) != Some(&current) {
                state.insert(VERSION_KEY.to_string(), current);
            }
            if !state.contains_key(INSTALL_DATE_KEY) {
                state.insert(
                    INSTALL_DATE_KEY.to_string(),
                    Value::String(Utc::now().to_rfc3339()),
                );
            }
        })
        .await
    }

    /// Read the state object, treating any failure as empty
    async fn read_lenient(&self) -> Map<String, Value> {
        let path = self.path.clone();
        match run_blocking(move || read_state(&path)).await {
            Ok(state) => state.unwrap_or_default(),
            Err(e) => {
                warn!("Local state unreadable, treating as empty: {}", e);
                Map::new()
            }
        }
    }

    /// Apply a change to the state object and write it back atomically
    async fn update<F>(&self, change: F) -> StorageResult<()>
    where
        F: FnOnce(&mut Map<String, Value>) + Send + 'static,
    {
        let _guard = self.write_lock.lock().await;
        let path = self.path.clone();

        run_blocking(move || {
            let mut state = match read_state(&path) {
                Ok(state) => state.unwrap_or_default(),
                Err(StorageError::Corrupt { details, .. }) => {
                    set_aside_corrupt(&path, &details);
                    Map::new()
                }
                Err(e) => return Err(e),
            };

            change(&mut state);

            let bytes = serde_json::to_vec_pretty(&Value::Object(state))?;
            atomic_write(&path, &bytes)
        })
        .await
    }
}

#[async_trait]
impl LocalStore for FileStore {
    async fn get(&self) -> ConfidenceMap {
        let state = self.read_lenient().await;
        match state.get(CONFIDENCE_KEY) {
            Some(Value::Object(entries)) => entries
                .iter()
                .filter_map(|(key, level)| match level {
                    Value::String(level) => Some((key.clone(), level.clone())),
                    other => {
                        debug!("Skipping non-string level for {}: {}", key, other);
                        None
                    }
                })
                .collect(),
            Some(other) => {
                warn!("Stored confidence map is not an object: {}", other);
                ConfidenceMap::new()
            }
            None => ConfidenceMap::new(),
        }
    }

    async fn set(&self, map: &ConfidenceMap) -> StorageResult<()> {
        let value = serde_json::to_value(map)?;
        debug!("Writing {} entries to {:?}", map.len(), self.path);
        self.update(move |state| {
            state.insert(CONFIDENCE_KEY.to_string(), value);
        })
        .await
    }

    async fn remove(&self) -> StorageResult<()> {
        debug!("Clearing confidence map in {:?}", self.path);
        self.update(|state| {
            state.remove(CONFIDENCE_KEY);
        })
        .await
    }
}

/// Run a blocking filesystem job off the async executor
async fn run_blocking<T, F>(job: F) -> StorageResult<T>
where
    F: FnOnce() -> StorageResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
}

/// Read the state object from disk
///
/// Returns `None` if the file doesn't exist.
fn read_state(path: &Path) -> StorageResult<Option<Map<String, Value>>> {
    if !path.exists() {
        return Ok(None);
    }

    let bytes = fs::read(path).map_err(|source| StorageError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(state)) => Ok(Some(state)),
        Ok(_) => Err(StorageError::Corrupt {
            path: path.to_path_buf(),
            details: "top-level value is not an object".to_string(),
        }),
        Err(e) => Err(StorageError::Corrupt {
            path: path.to_path_buf(),
            details: e.to_string(),
        }),
    }
}

/// Move a corrupt state file out of the way so it can be inspected later
fn set_aside_corrupt(path: &Path, details: &str) {
    let backup = path.with_extension("json.corrupt");
    warn!(
        "Local state at {:?} is corrupt ({}), moving it to {:?}",
        path, details, backup
    );
    if let Err(e) = fs::rename(path, &backup) {
        warn!("Could not move corrupt state file: {}", e);
    }
}

/// Write data to a file atomically
///
/// 1. Write to a uniquely named temporary file in the same directory
/// 2. Sync the file to disk
/// 3. Rename the temp file to the target path
///
/// The target file is never left in a partially-written state, and two
/// writers never share a temp file.
pub(crate) fn atomic_write(path: &Path, data: &[u8]) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| StorageError::CreateDirectory {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let temp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));

    let mut file =
        File::create(&temp_path).map_err(|e| StorageError::from_io(e, temp_path.clone()))?;

    file.write_all(data)
        .map_err(|e| StorageError::from_io(e, temp_path.clone()))?;

    file.sync_all()
        .map_err(|e| StorageError::from_io(e, temp_path.clone()))?;

    fs::rename(&temp_path, path).map_err(|source| {
        let _ = fs::remove_file(&temp_path);
        StorageError::Rename {
            from: temp_path.clone(),
            to: path.to_path_buf(),
            source,
        }
    })?;

    Ok(())
}
