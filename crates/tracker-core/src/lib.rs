//! Tracker Core Library
//!
//! Core functionality for the confidence tracker: per-problem confidence
//! annotations kept on the device and reconciled with a hosted service.
//!
//! # Architecture
//!
//! - **Local store**: source of truth on this device, works offline
//! - **Remote API**: per-user copy on the hosted service, reached over HTTP
//! - **Sync engine**: fetch, merge (local wins), save, push
//!
//! Cloud sync is strictly additive. Every local operation works when every
//! remote call fails.
//!
//! # Quick Start
//!
//! ```text
//! let tracker = Tracker::open().await?;
//!
//! // Record a level
//! let key = problem_key("https://example.com/sheets/neetcode", 0, 3, "Two Sum");
//! tracker.engine().set_level(&key, ConfidenceLevel::High, &EntryMetadata::default()).await?;
//!
//! // Reconcile with the server
//! tracker.session().login("alice", "secret").await?;
//! tracker.engine().sync().await?;
//! ```
//!
//! # Modules
//!
//! - `store`: Unified tracker interface (main entry point)
//! - `models`: Confidence levels, the confidence map, entries and users
//! - `problem_key`: Derived row keys (layout-dependent)
//! - `stats`: Per-level counts
//! - `storage`: Local persistence and backups
//! - `sync`: Remote client, auth session, sync engine and service
//! - `transfer`: Export and import
//! - `config`: Application configuration

pub mod config;
pub mod models;
pub mod problem_key;
pub mod stats;
pub mod storage;
pub mod store;
pub mod sync;
pub mod transfer;

pub use config::Config;
pub use models::{ConfidenceEntry, ConfidenceLevel, ConfidenceMap, User};
pub use problem_key::problem_key;
pub use stats::{aggregate, ConfidenceStats};
pub use storage::{FileStore, LocalStore, MemoryStore, StorageError};
pub use store::Tracker;
pub use sync::{AuthSession, AuthState, HttpRemote, RemoteApi, RemoteError, SyncEngine, SyncError};
