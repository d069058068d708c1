//! Sync engine
//!
//! Reconciles the local confidence map with the server:
//!
//! 1. Refuse unless authenticated
//! 2. Fetch the remote map
//! 3. Read the local map
//! 4. Merge, local winning on overlap
//! 5. Write the merged map locally
//! 6. Push the merged map
//! 7. Record the sync time
//!
//! A failure at step 2 or 5 leaves both sides untouched. A failure at step 6
//! leaves the merged map saved locally; [`SyncEngine::retry_push`] repeats
//! only the push.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::auth::AuthSession;
use super::error::{RemoteError, SyncError};
use super::merge::{merge, MergeSummary};
use super::remote::{EntryMetadata, RemoteApi};
use crate::models::{ConfidenceLevel, ConfidenceMap};
use crate::stats::{self, ConfidenceStats};
use crate::storage::{LocalStore, StorageResult};

/// Result of a successful sync
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// Entries in the reconciled map
    pub entries: usize,
    pub pulled: usize,
    pub pushed: usize,
    pub overridden: usize,
    pub synced_at: DateTime<Utc>,
}

impl SyncReport {
    fn new(summary: MergeSummary, synced_at: DateTime<Utc>) -> Self {
        Self {
            entries: summary.total(),
            pulled: summary.pulled,
            pushed: summary.pushed,
            overridden: summary.overridden,
            synced_at,
        }
    }
}

/// What happened to the server copy of a single-entry change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteUpdate {
    /// Not logged in; the change waits for the next sync
    Skipped,
    Updated,
    /// Server call failed; the change waits for the next sync
    Failed(RemoteError),
}

/// Result of [`SyncEngine::set_level`]
#[derive(Debug, Clone)]
pub struct LevelUpdate {
    pub problem_key: String,
    pub level: ConfidenceLevel,
    pub remote: RemoteUpdate,
}

/// Reconciles a local store with the remote service
pub struct SyncEngine {
    store: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteApi>,
    session: Arc<AuthSession>,
    in_flight: AtomicBool,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteApi>,
        session: Arc<AuthSession>,
    ) -> Self {
        Self {
            store,
            remote,
            session,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn session(&self) -> &Arc<AuthSession> {
        &self.session
    }

    pub fn store(&self) -> &Arc<dyn LocalStore> {
        &self.store
    }

    /// Whether a sync or push retry is running
    pub fn is_syncing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Run a full sync
    pub async fn sync(&self) -> Result<SyncReport, SyncError> {
        if !self.session.is_authenticated() {
            return Err(SyncError::NotAuthenticated);
        }
        let _guard = InFlight::acquire(&self.in_flight)?;
        info!("Starting sync");

        let remote_map = self
            .remote
            .fetch_confidence()
            .await
            .map_err(|e| SyncError::Fetch(self.check_session(e)))?;

        let local_map = self.store.get().await;
        let summary = MergeSummary::between(&remote_map, &local_map);
        let merged = merge(&remote_map, &local_map);
        debug!(
            "Merged {} remote and {} local entries into {}",
            remote_map.len(),
            local_map.len(),
            merged.len()
        );

        self.store
            .set(&merged)
            .await
            .map_err(SyncError::LocalWrite)?;

        self.push(merged).await?;

        let report = SyncReport::new(summary, Utc::now());
        self.session.record_sync(report.synced_at);
        info!(
            "Sync complete: {} entries ({} pulled, {} pushed, {} kept local)",
            report.entries, report.pulled, report.pushed, report.overridden
        );
        Ok(report)
    }

    /// Push the local map without fetching again
    ///
    /// Recovers from [`SyncError::PartialSync`]. Uploads whatever is stored
    /// locally now, which includes the merged map saved by the failed sync.
    pub async fn retry_push(&self) -> Result<SyncReport, SyncError> {
        if !self.session.is_authenticated() {
            return Err(SyncError::NotAuthenticated);
        }
        let _guard = InFlight::acquire(&self.in_flight)?;

        let local_map = self.store.get().await;
        let summary = MergeSummary {
            pushed: local_map.len(),
            ..MergeSummary::default()
        };
        self.push(local_map).await?;

        let report = SyncReport::new(summary, Utc::now());
        self.session.record_sync(report.synced_at);
        info!("Push retry complete: {} entries", report.entries);
        Ok(report)
    }

    /// Record a level locally, then mirror it to the server if logged in
    ///
    /// Only a local write failure is an error. The server copy is best
    /// effort; anything missed there is picked up by the next sync.
    pub async fn set_level(
        &self,
        problem_key: &str,
        level: ConfidenceLevel,
        metadata: &EntryMetadata,
    ) -> StorageResult<LevelUpdate> {
        let mut map = self.store.get().await;
        map.insert(problem_key.to_string(), level.as_str().to_string());
        self.store.set(&map).await?;
        debug!("Set {} to {}", problem_key, level);

        let remote = if !self.session.is_authenticated() {
            RemoteUpdate::Skipped
        } else {
            match self
                .remote
                .update_one(problem_key, level.as_str(), metadata)
                .await
            {
                Ok(_) => RemoteUpdate::Updated,
                Err(e) => {
                    let e = self.check_session(e);
                    warn!("Saved locally, server update failed: {}", e);
                    RemoteUpdate::Failed(e)
                }
            }
        };

        Ok(LevelUpdate {
            problem_key: problem_key.to_string(),
            level,
            remote,
        })
    }

    /// Counts over the local map
    pub async fn local_stats(&self) -> ConfidenceStats {
        stats::aggregate(&self.store.get().await)
    }

    /// Counts reported by the server
    pub async fn remote_stats(&self) -> Result<ConfidenceStats, RemoteError> {
        if !self.session.is_authenticated() {
            return Err(RemoteError::Unauthorized("Not logged in".to_string()));
        }
        self.remote
            .fetch_stats()
            .await
            .map_err(|e| self.check_session(e))
    }

    async fn push(&self, map: ConfidenceMap) -> Result<(), SyncError> {
        match self.remote.push_confidence(&map).await {
            Ok(()) => Ok(()),
            Err(e) => {
                let source = self.check_session(e);
                warn!("Push failed, merged data kept locally: {}", source);
                Err(SyncError::PartialSync {
                    merged: map,
                    source,
                })
            }
        }
    }

    /// A rejected session ends the authenticated state
    fn check_session(&self, error: RemoteError) -> RemoteError {
        if matches!(error, RemoteError::Unauthorized(_)) {
            self.session.invalidate();
        }
        error
    }
}

/// Holds the in-flight flag for the duration of a sync
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, SyncError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SyncError::InProgress)?;
        Ok(Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
