//! Local storage layer
//!
//! The device-local copy of the confidence map.
//!
//! ## Contract
//!
//! - `get` never fails: a missing or unreadable map reads as empty
//! - `set` replaces the whole map, it never merges
//! - `remove` clears every entry
//!
//! Concurrent writers (two processes, two tasks) resolve as last write wins
//! for the whole map. There is no per-key locking.

pub mod backup;
pub mod error;
pub mod memory;
pub mod persistence;

use async_trait::async_trait;

use crate::models::ConfidenceMap;

pub use backup::{Backup, BackupManager, MAX_BACKUPS};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;
pub use persistence::{FileStore, StateMetadata, CONFIDENCE_KEY};

/// Key-value persistence of `problemKey -> confidenceLevel` on this device
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Read the stored map, `{}` when absent or corrupt
    async fn get(&self) -> ConfidenceMap;

    /// Replace the stored map
    async fn set(&self, map: &ConfidenceMap) -> StorageResult<()>;

    /// Remove all entries
    async fn remove(&self) -> StorageResult<()>;
}
