//! Unified tracker interface
//!
//! The `Tracker` wires together everything a front end needs:
//! - the file-backed local store (source of truth on this device)
//! - the HTTP remote and its persisted session
//! - the auth session and the sync engine
//!
//! ## Usage
//!
//! ```ignore
//! let tracker = Tracker::open().await?;
//! tracker.session().check_status().await;
//!
//! tracker.engine().set_level("neetcode_0_3_Two Sum", ConfidenceLevel::High, &meta).await?;
//! tracker.engine().sync().await?;
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::storage::{BackupManager, FileStore, LocalStore};
use crate::sync::{
    spawn_tracker_service, AuthSession, HttpRemote, RemoteApi, ServiceConfig, SyncEngine,
    TrackerHandle,
};

/// Unified interface over local state and the remote service
pub struct Tracker {
    config: Config,
    store: Arc<FileStore>,
    remote: Arc<HttpRemote>,
    engine: Arc<SyncEngine>,
}

impl Tracker {
    /// Open the tracker with configuration from the default location
    pub async fn open() -> Result<Self> {
        let config = Config::load().context("Failed to load configuration")?;
        Self::open_with_config(config).await
    }

    /// Open the tracker with a specific configuration
    ///
    /// Creates the data directory and the state file on first run. Does not
    /// contact the server; call `session().check_status()` for that.
    pub async fn open_with_config(config: Config) -> Result<Self> {
        config.ensure_data_dir()?;

        let store = Arc::new(
            FileStore::open(&config)
                .await
                .context("Failed to open local state")?,
        );
        let remote = Arc::new(
            HttpRemote::from_config(&config).context("Failed to configure API client")?,
        );

        let api: Arc<dyn RemoteApi> = remote.clone();
        let session = Arc::new(AuthSession::new(api.clone()));
        let engine = Arc::new(SyncEngine::new(store.clone(), api, session));

        Ok(Self {
            config,
            store,
            remote,
            engine,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<FileStore> {
        &self.store
    }

    pub fn remote(&self) -> &Arc<HttpRemote> {
        &self.remote
    }

    pub fn session(&self) -> &Arc<AuthSession> {
        self.engine.session()
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    /// Local store as the trait object used by export/import
    pub fn local(&self) -> &dyn LocalStore {
        self.store.as_ref()
    }

    /// Backups under the data directory
    pub fn backups(&self) -> BackupManager {
        BackupManager::new(self.config.backups_dir())
    }

    /// Restore the previous session, if the server still accepts it
    ///
    /// Skips the network when no session cookie is held.
    pub async fn resume_session(&self) -> bool {
        if !self.remote.has_session() {
            return false;
        }
        self.session().check_status().await
    }

    /// Run the background service over this tracker
    pub fn spawn_service(&self, config: ServiceConfig) -> TrackerHandle {
        spawn_tracker_service(config, self.engine.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConfidenceLevel;
    use crate::sync::{EntryMetadata, RemoteUpdate};
    use tempfile::TempDir;

    fn test_config(temp_dir: &TempDir) -> Config {
        Config {
            data_dir: temp_dir.path().to_path_buf(),
            api_url: "http://127.0.0.1:1".to_string(),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_open_creates_state() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir);

        let tracker = Tracker::open_with_config(config.clone()).await.unwrap();
        assert!(config.local_state_path().exists());

        let meta = tracker.store().metadata().await;
        assert_eq!(meta.version.as_deref(), Some(env!("CARGO_PKG_VERSION")));
        assert!(meta.install_date.is_some());
        assert!(!tracker.session().is_authenticated());
    }

    #[tokio::test]
    async fn test_local_edits_work_offline() {
        let temp_dir = TempDir::new().unwrap();
        let tracker = Tracker::open_with_config(test_config(&temp_dir))
            .await
            .unwrap();

        let update = tracker
            .engine()
            .set_level("p1", ConfidenceLevel::Low, &EntryMetadata::default())
            .await
            .unwrap();
        assert_eq!(update.remote, RemoteUpdate::Skipped);

        // Reopen and read it back
        let tracker = Tracker::open_with_config(test_config(&temp_dir))
            .await
            .unwrap();
        assert_eq!(tracker.local().get().await.get("p1").unwrap(), "low");
        assert!(!tracker.resume_session().await);
    }
}
