//! In-memory remote for unit tests

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use super::error::RemoteError;
use super::message::Credentials;
use super::remote::{EntryMetadata, RemoteApi};
use crate::models::{ConfidenceEntry, ConfidenceMap, User};
use crate::stats::{self, ConfidenceStats};

#[derive(Default)]
struct Inner {
    users: HashMap<String, (String, User)>,
    data: HashMap<String, ConfidenceMap>,
    session: Option<String>,
    failure: Option<RemoteError>,
    push_failure: Option<RemoteError>,
    fetch_delay: Option<Duration>,
    push_delay: Option<Duration>,
    pushes: usize,
}

/// Behaves like the hosted service, with switchable failures
#[derive(Default)]
pub struct FakeRemote {
    inner: Mutex<Inner>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, username: &str, password: &str) -> User {
        let user = User::new(username);
        self.inner
            .lock()
            .unwrap()
            .users
            .insert(username.to_string(), (password.to_string(), user.clone()));
        user
    }

    /// Replace a user's server-side map
    pub fn seed(&self, username: &str, map: ConfidenceMap) {
        self.inner
            .lock()
            .unwrap()
            .data
            .insert(username.to_string(), map);
    }

    pub fn data_for(&self, username: &str) -> ConfidenceMap {
        self.inner
            .lock()
            .unwrap()
            .data
            .get(username)
            .cloned()
            .unwrap_or_default()
    }

    /// Fail every call until [`recover`](Self::recover)
    pub fn fail_with(&self, error: RemoteError) {
        self.inner.lock().unwrap().failure = Some(error);
    }

    /// Fail only bulk pushes until [`recover`](Self::recover)
    pub fn fail_push_with(&self, error: RemoteError) {
        self.inner.lock().unwrap().push_failure = Some(error);
    }

    pub fn recover(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.failure = None;
        inner.push_failure = None;
    }

    pub fn expire_session(&self) {
        self.inner.lock().unwrap().session = None;
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        self.inner.lock().unwrap().fetch_delay = Some(delay);
    }

    pub fn set_push_delay(&self, delay: Duration) {
        self.inner.lock().unwrap().push_delay = Some(delay);
    }

    pub fn push_count(&self) -> usize {
        self.inner.lock().unwrap().pushes
    }

    fn check(&self) -> Result<(), RemoteError> {
        match &self.inner.lock().unwrap().failure {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn session_user(&self) -> Result<String, RemoteError> {
        self.check()?;
        self.inner
            .lock()
            .unwrap()
            .session
            .clone()
            .ok_or_else(|| RemoteError::Unauthorized("Not authenticated".to_string()))
    }
}

#[async_trait]
impl RemoteApi for FakeRemote {
    async fn signup(&self, credentials: &Credentials) -> Result<User, RemoteError> {
        self.check()?;
        if !credentials.is_complete() {
            return Err(RemoteError::Validation("Username and password are required".into()));
        }
        if self.inner.lock().unwrap().users.contains_key(&credentials.username) {
            return Err(RemoteError::Validation("Username already exists".into()));
        }
        let user = self.add_user(&credentials.username, &credentials.password);
        self.inner.lock().unwrap().session = Some(user.username.clone());
        Ok(user)
    }

    async fn login(&self, credentials: &Credentials) -> Result<User, RemoteError> {
        self.check()?;
        let mut inner = self.inner.lock().unwrap();
        match inner.users.get(&credentials.username) {
            Some((password, user)) if *password == credentials.password => {
                let user = user.clone();
                inner.session = Some(user.username.clone());
                Ok(user)
            }
            _ => Err(RemoteError::Unauthorized("Invalid credentials".into())),
        }
    }

    async fn logout(&self) -> Result<(), RemoteError> {
        self.check()?;
        self.inner.lock().unwrap().session = None;
        Ok(())
    }

    async fn current_user(&self) -> Result<User, RemoteError> {
        let username = self.session_user()?;
        let inner = self.inner.lock().unwrap();
        inner
            .users
            .get(&username)
            .map(|(_, user)| user.clone())
            .ok_or_else(|| RemoteError::Unauthorized("User not found".into()))
    }

    async fn fetch_confidence(&self) -> Result<ConfidenceMap, RemoteError> {
        let username = self.session_user()?;
        let delay = self.inner.lock().unwrap().fetch_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.data_for(&username))
    }

    async fn push_confidence(&self, map: &ConfidenceMap) -> Result<(), RemoteError> {
        let username = self.session_user()?;
        let delay = self.inner.lock().unwrap().push_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut inner = self.inner.lock().unwrap();
        if let Some(e) = &inner.push_failure {
            return Err(e.clone());
        }
        inner.pushes += 1;
        let stored = inner.data.entry(username).or_default();
        stored.extend(map.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    async fn update_one(
        &self,
        problem_key: &str,
        level: &str,
        metadata: &EntryMetadata,
    ) -> Result<ConfidenceEntry, RemoteError> {
        let username = self.session_user()?;
        self.inner
            .lock()
            .unwrap()
            .data
            .entry(username)
            .or_default()
            .insert(problem_key.to_string(), level.to_string());

        let now = Utc::now();
        Ok(ConfidenceEntry {
            problem_key: problem_key.to_string(),
            confidence_level: level.to_string(),
            sheet_name: metadata.sheet_name.clone(),
            problem_title: metadata.problem_title.clone(),
            created_at: now,
            updated_at: now,
        })
    }

    async fn fetch_stats(&self) -> Result<ConfidenceStats, RemoteError> {
        let username = self.session_user()?;
        Ok(stats::aggregate(&self.data_for(&username)))
    }
}
