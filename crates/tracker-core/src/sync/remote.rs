//! Remote API abstraction
//!
//! The sync engine and auth session only see this trait. [`HttpRemote`]
//! implements it over the hosted REST API; tests substitute an in-memory
//! fake.
//!
//! [`HttpRemote`]: super::HttpRemote

use async_trait::async_trait;

use super::error::RemoteError;
use super::message::Credentials;
use crate::models::{ConfidenceEntry, ConfidenceMap, User};
use crate::stats::ConfidenceStats;

/// Optional metadata stored alongside a single-entry update
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryMetadata {
    pub sheet_name: Option<String>,
    pub problem_title: Option<String>,
}

/// Operations offered by the hosted service
///
/// Every call is independent and idempotent. Calls that need a session
/// fail with [`RemoteError::Unauthorized`] when there is none.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Create an account and open a session for it
    async fn signup(&self, credentials: &Credentials) -> Result<User, RemoteError>;

    /// Open a session
    async fn login(&self, credentials: &Credentials) -> Result<User, RemoteError>;

    /// Close the session
    async fn logout(&self) -> Result<(), RemoteError>;

    /// User owning the current session
    async fn current_user(&self) -> Result<User, RemoteError>;

    /// Every entry the server holds for the session's user
    async fn fetch_confidence(&self) -> Result<ConfidenceMap, RemoteError>;

    /// Upsert every entry of `map`; entries not in `map` are untouched
    async fn push_confidence(&self, map: &ConfidenceMap) -> Result<(), RemoteError>;

    /// Upsert a single entry
    async fn update_one(
        &self,
        problem_key: &str,
        level: &str,
        metadata: &EntryMetadata,
    ) -> Result<ConfidenceEntry, RemoteError>;

    /// Per-level counts of the server-side entries
    async fn fetch_stats(&self) -> Result<ConfidenceStats, RemoteError>;
}
