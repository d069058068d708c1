//! Export and import of confidence data
//!
//! The export bundle is a small JSON document:
//!
//! ```json
//! { "timestamp": "...", "url": "exported_from_storage", "data": { "key": "level" } }
//! ```
//!
//! Importing merges the bundle into the existing map with the imported
//! values taking precedence.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::ConfidenceMap;
use crate::storage::{LocalStore, StorageError};

/// Source label used when exporting from the local store
pub const STORAGE_SOURCE: &str = "exported_from_storage";

/// Errors from export/import
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Import file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Import file has no 'data' section")]
    MissingData,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// A portable snapshot of the confidence map
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportBundle {
    pub timestamp: DateTime<Utc>,
    pub url: String,
    pub data: ConfidenceMap,
}

impl ExportBundle {
    pub fn new(data: ConfidenceMap) -> Self {
        Self {
            timestamp: Utc::now(),
            url: STORAGE_SOURCE.to_string(),
            data,
        }
    }

    /// Default file name for a bundle exported on `date`
    pub fn file_name(date: NaiveDate) -> String {
        format!("tracker_confidence_{}.json", date.format("%Y-%m-%d"))
    }

    pub fn to_json(&self) -> Result<String, TransferError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[derive(Deserialize)]
struct ImportedBundle {
    #[serde(default)]
    data: Option<ConfidenceMap>,
}

/// Parse the `data` section of an import file
pub fn parse_import(json: &str) -> Result<ConfidenceMap, TransferError> {
    let bundle: ImportedBundle = serde_json::from_str(json)?;
    bundle.data.ok_or(TransferError::MissingData)
}

/// Snapshot the local store as a bundle
pub async fn export(store: &dyn LocalStore) -> ExportBundle {
    ExportBundle::new(store.get().await)
}

/// Merge an import file into the local store, imported values winning
///
/// Returns the number of entries read from the file.
pub async fn import(store: &dyn LocalStore, json: &str) -> Result<usize, TransferError> {
    let imported = parse_import(json)?;
    let count = imported.len();

    let mut merged = store.get().await;
    merged.extend(imported);
    store.set(&merged).await?;

    Ok(count)
}
