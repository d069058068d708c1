//! Authentication session state machine
//!
//! ```text
//! Unauthenticated --login/signup--> Authenticating --ok--> Authenticated
//!                                                  --err-> AuthError
//! Unauthenticated --check_status(ok)--> Authenticated
//! Authenticated   --logout--> Unauthenticated
//! Authenticated   --check_status(fail)--> Unauthenticated
//! AuthError       --login/signup--> Authenticating
//! ```
//!
//! State changes are published on a `watch` channel so views can follow
//! them without polling.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::error::RemoteError;
use super::message::Credentials;
use super::remote::RemoteApi;
use crate::models::User;

/// Where the client stands with the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// No session
    Unauthenticated,
    /// Login or signup in flight
    Authenticating,
    /// Session accepted by the server
    Authenticated(User),
    /// Last login or signup failed
    AuthError(String),
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated(_))
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            AuthState::Authenticated(user) => Some(user),
            _ => None,
        }
    }

    /// Short label for display
    pub fn label(&self) -> &'static str {
        match self {
            AuthState::Unauthenticated => "not logged in",
            AuthState::Authenticating => "logging in",
            AuthState::Authenticated(_) => "logged in",
            AuthState::AuthError(_) => "login failed",
        }
    }
}

/// Tracks the authenticated identity against the remote service
pub struct AuthSession {
    remote: Arc<dyn RemoteApi>,
    state: watch::Sender<AuthState>,
    last_sync_at: Mutex<Option<DateTime<Utc>>>,
}

impl AuthSession {
    pub fn new(remote: Arc<dyn RemoteApi>) -> Self {
        let (state, _) = watch::channel(AuthState::Unauthenticated);
        Self {
            remote,
            state,
            last_sync_at: Mutex::new(None),
        }
    }

    /// Current state
    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    /// Follow state changes
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    pub fn current_user(&self) -> Option<User> {
        self.state.borrow().user().cloned()
    }

    /// When the last successful sync finished
    pub fn last_sync_at(&self) -> Option<DateTime<Utc>> {
        *self.lock_last_sync()
    }

    pub(crate) fn record_sync(&self, at: DateTime<Utc>) {
        *self.lock_last_sync() = Some(at);
    }

    /// Probe the server for a live session
    ///
    /// Any failure means "no session"; nothing is surfaced to the caller.
    pub async fn check_status(&self) -> bool {
        match self.remote.current_user().await {
            Ok(user) => {
                debug!("Session is live for {}", user.username);
                self.transition(AuthState::Authenticated(user));
                true
            }
            Err(e) => {
                debug!("No live session: {}", e);
                // Keep a login error visible until the next attempt
                if !matches!(*self.state.borrow(), AuthState::AuthError(_)) {
                    self.transition(AuthState::Unauthenticated);
                }
                false
            }
        }
    }

    /// Log in with an existing account
    pub async fn login(&self, username: &str, password: &str) -> Result<User, RemoteError> {
        let credentials = Credentials::new(username, password);
        self.authenticate(&credentials, false).await
    }

    /// Create an account and log in to it
    pub async fn signup(&self, username: &str, password: &str) -> Result<User, RemoteError> {
        let credentials = Credentials::new(username, password);
        self.authenticate(&credentials, true).await
    }

    /// End the session
    ///
    /// Always succeeds locally; a failed server call is only logged.
    pub async fn logout(&self) {
        if let Err(e) = self.remote.logout().await {
            warn!("Server logout failed, ending session locally: {}", e);
        }
        *self.lock_last_sync() = None;
        self.transition(AuthState::Unauthenticated);
        info!("Logged out");
    }

    /// Drop to unauthenticated after the server rejected the session
    pub(crate) fn invalidate(&self) {
        if self.is_authenticated() {
            info!("Session rejected by server");
            self.transition(AuthState::Unauthenticated);
        }
    }

    async fn authenticate(
        &self,
        credentials: &Credentials,
        signup: bool,
    ) -> Result<User, RemoteError> {
        self.transition(AuthState::Authenticating);

        let result = if signup {
            self.remote.signup(credentials).await
        } else {
            self.remote.login(credentials).await
        };

        match result {
            Ok(user) => {
                self.transition(AuthState::Authenticated(user.clone()));
                Ok(user)
            }
            Err(e) => {
                self.transition(AuthState::AuthError(e.to_string()));
                Err(e)
            }
        }
    }

    fn transition(&self, next: AuthState) {
        let previous = self.state.send_replace(next);
        let current = self.state.borrow();
        if previous != *current {
            debug!("Auth state: {} -> {}", previous.label(), current.label());
        }
    }

    fn lock_last_sync(&self) -> std::sync::MutexGuard<'_, Option<DateTime<Utc>>> {
        match self.last_sync_at.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::testing::FakeRemote;

    fn session(remote: &Arc<FakeRemote>) -> AuthSession {
        AuthSession::new(remote.clone())
    }

    #[tokio::test]
    async fn test_starts_unauthenticated() {
        let remote = Arc::new(FakeRemote::new());
        let auth = session(&remote);
        assert_eq!(auth.state(), AuthState::Unauthenticated);
        assert!(auth.current_user().is_none());
        assert!(auth.last_sync_at().is_none());
    }

    #[tokio::test]
    async fn test_login_success() {
        let remote = Arc::new(FakeRemote::new());
        remote.add_user("alice", "pw");
        let auth = session(&remote);

        let user = auth.login("alice", "pw").await.unwrap();
        assert_eq!(user.username, "alice");
        assert!(auth.is_authenticated());
        assert_eq!(auth.current_user().unwrap().username, "alice");
    }

    #[tokio::test]
    async fn test_wrong_password_moves_to_auth_error() {
        let remote = Arc::new(FakeRemote::new());
        remote.add_user("alice", "pw");
        let auth = session(&remote);

        let err = auth.login("alice", "wrong").await.unwrap_err();
        assert!(matches!(err, RemoteError::Unauthorized(_)));
        assert!(matches!(auth.state(), AuthState::AuthError(_)));

        // Retry from the error state
        auth.login("alice", "pw").await.unwrap();
        assert!(auth.is_authenticated());
    }

    #[tokio::test]
    async fn test_failed_login_while_authenticated() {
        let remote = Arc::new(FakeRemote::new());
        remote.add_user("alice", "pw");
        let auth = session(&remote);
        auth.login("alice", "pw").await.unwrap();

        auth.login("alice", "nope").await.unwrap_err();
        assert!(matches!(auth.state(), AuthState::AuthError(_)));
    }

    #[tokio::test]
    async fn test_signup_duplicate_is_validation_error() {
        let remote = Arc::new(FakeRemote::new());
        remote.add_user("alice", "pw");
        let auth = session(&remote);

        let err = auth.signup("alice", "other").await.unwrap_err();
        assert!(matches!(err, RemoteError::Validation(_)));
        assert!(matches!(auth.state(), AuthState::AuthError(_)));
    }

    #[tokio::test]
    async fn test_check_status_swallows_failures() {
        let remote = Arc::new(FakeRemote::new());
        let auth = session(&remote);
        assert!(!auth.check_status().await);
        assert_eq!(auth.state(), AuthState::Unauthenticated);

        remote.fail_with(RemoteError::Network("offline".into()));
        assert!(!auth.check_status().await);
        assert_eq!(auth.state(), AuthState::Unauthenticated);
    }

    #[tokio::test]
    async fn test_check_status_restores_session() {
        let remote = Arc::new(FakeRemote::new());
        remote.add_user("alice", "pw");
        remote.login(&Credentials::new("alice", "pw")).await.unwrap();

        let auth = session(&remote);
        assert!(auth.check_status().await);
        assert!(auth.is_authenticated());
    }

    #[tokio::test]
    async fn test_expired_session_drops_to_unauthenticated() {
        let remote = Arc::new(FakeRemote::new());
        remote.add_user("alice", "pw");
        let auth = session(&remote);
        auth.login("alice", "pw").await.unwrap();

        remote.expire_session();
        assert!(!auth.check_status().await);
        assert_eq!(auth.state(), AuthState::Unauthenticated);
    }

    #[tokio::test]
    async fn test_logout_is_local_even_when_server_fails() {
        let remote = Arc::new(FakeRemote::new());
        remote.add_user("alice", "pw");
        let auth = session(&remote);
        auth.login("alice", "pw").await.unwrap();
        auth.record_sync(Utc::now());

        remote.fail_with(RemoteError::Network("offline".into()));
        auth.logout().await;

        assert_eq!(auth.state(), AuthState::Unauthenticated);
        assert!(auth.last_sync_at().is_none());
    }

    #[tokio::test]
    async fn test_subscribers_see_transitions() {
        let remote = Arc::new(FakeRemote::new());
        remote.add_user("alice", "pw");
        let auth = session(&remote);
        let mut rx = auth.subscribe();

        auth.login("alice", "pw").await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_authenticated());
    }
}
