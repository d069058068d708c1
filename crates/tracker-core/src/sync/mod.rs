//! Sync with the hosted confidence service
//!
//! Keeps the local confidence map and the server copy in step.
//!
//! ## Protocol
//!
//! Plain JSON over HTTP with a session cookie:
//! 1. Log in (or sign up) to obtain the `sid` cookie
//! 2. Fetch the server's map
//! 3. Merge it with the local map, local values winning
//! 4. Save the result locally, then upload it
//!
//! ## Usage
//!
//! ```ignore
//! let remote = Arc::new(HttpRemote::from_config(&config)?);
//! let session = Arc::new(AuthSession::new(remote.clone()));
//! let engine = SyncEngine::new(store, remote, session.clone());
//!
//! session.login("alice", "secret").await?;
//! let report = engine.sync().await?;
//! ```

mod auth;
mod client;
mod engine;
mod error;
mod merge;
mod message;
mod remote;
mod service;
mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use auth::{AuthSession, AuthState};
pub use client::HttpRemote;
pub use engine::{LevelUpdate, RemoteUpdate, SyncEngine, SyncReport};
pub use error::{RemoteError, SyncError, SyncStep};
pub use merge::{merge, MergeSummary};
pub use message::{
    Credentials, ErrorResponse, MessageResponse, SyncRequest, UpdateRequest, UpdateResponse,
    UserResponse, SESSION_COOKIE,
};
pub use remote::{EntryMetadata, RemoteApi};
pub use service::{
    spawn_tracker_service, ServiceConfig, ServiceError, ServiceEvent, ServiceRequest,
    ServiceStatus, TrackerClient, TrackerHandle,
};
pub use state::SessionState;
