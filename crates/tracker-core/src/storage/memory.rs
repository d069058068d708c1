//! In-memory local store
//!
//! Used when no data directory is available and in tests.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::error::StorageResult;
use super::LocalStore;
use crate::models::ConfidenceMap;

/// Local store that lives only as long as the process
#[derive(Debug, Default)]
pub struct MemoryStore {
    map: RwLock<ConfidenceMap>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with entries
    pub fn with_map(map: ConfidenceMap) -> Self {
        Self {
            map: RwLock::new(map),
        }
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn get(&self) -> ConfidenceMap {
        self.map.read().await.clone()
    }

    async fn set(&self, map: &ConfidenceMap) -> StorageResult<()> {
        *self.map.write().await = map.clone();
        Ok(())
    }

    async fn remove(&self) -> StorageResult<()> {
        self.map.write().await.clear();
        Ok(())
    }
}
