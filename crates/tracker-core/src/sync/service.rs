//! Background tracker service
//!
//! Owns the sync engine and answers typed requests over a channel, so any
//! number of front ends can share one session and one local store. Each
//! request carries its own reply channel.
//!
//! Syncs run as separate tasks; the service keeps answering while one is in
//! flight, and a second sync request is rejected with
//! [`SyncError::InProgress`]. Local writes (`set_level`, `clear`) that arrive
//! during a sync are queued and applied in order once it finishes.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, Interval};
use tracing::{debug, info, warn};

use super::auth::AuthState;
use super::engine::{LevelUpdate, SyncEngine, SyncReport};
use super::error::{RemoteError, SyncError};
use super::message::Credentials;
use super::remote::EntryMetadata;
use crate::models::{ConfidenceLevel, ConfidenceMap, User};
use crate::stats::ConfidenceStats;
use crate::storage::StorageError;

type Reply<T> = oneshot::Sender<T>;

/// Requests accepted by the service
#[derive(Debug)]
pub enum ServiceRequest {
    Status(Reply<ServiceStatus>),
    CheckAuth(Reply<bool>),
    Login {
        credentials: Credentials,
        reply: Reply<Result<User, RemoteError>>,
    },
    Signup {
        credentials: Credentials,
        reply: Reply<Result<User, RemoteError>>,
    },
    Logout(Reply<()>),
    Sync(Reply<Result<SyncReport, SyncError>>),
    RetryPush(Reply<Result<SyncReport, SyncError>>),
    SetLevel {
        problem_key: String,
        level: ConfidenceLevel,
        metadata: EntryMetadata,
        reply: Reply<Result<LevelUpdate, StorageError>>,
    },
    GetMap(Reply<ConfidenceMap>),
    LocalStats(Reply<ConfidenceStats>),
    RemoteStats(Reply<Result<ConfidenceStats, RemoteError>>),
    Clear(Reply<Result<(), StorageError>>),
    /// Stop the service loop
    Shutdown,
}

/// Events emitted by the service
#[derive(Debug, Clone)]
pub enum ServiceEvent {
    /// Authentication state changed
    AuthChanged(AuthState),
    /// A sync or push retry finished
    Synced(SyncReport),
    /// A level was recorded
    LevelChanged {
        problem_key: String,
        level: ConfidenceLevel,
    },
    /// Local data was cleared
    Cleared,
    /// A background operation failed
    Error(String),
}

/// Snapshot returned by [`TrackerClient::status`]
#[derive(Debug, Clone)]
pub struct ServiceStatus {
    pub auth: AuthState,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub syncing: bool,
    pub entries: usize,
}

/// Service options
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    /// Sync on this period while logged in
    pub auto_sync_interval: Option<Duration>,
    /// Sync right after a successful login or signup
    pub sync_on_login: bool,
}

/// Failure talking to the service
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceError {
    /// The service loop has stopped
    #[error("Tracker service has stopped")]
    Closed,
}

/// Sends requests to the service; cheap to clone
#[derive(Debug, Clone)]
pub struct TrackerClient {
    request_tx: mpsc::Sender<ServiceRequest>,
}

/// Handle to control and monitor the service
pub struct TrackerHandle {
    /// Send requests to the service
    pub client: TrackerClient,
    /// Receive events from the service
    pub event_rx: mpsc::Receiver<ServiceEvent>,
    /// Watch authentication state
    pub auth_rx: watch::Receiver<AuthState>,
}

/// Spawn the service loop
pub fn spawn_tracker_service(config: ServiceConfig, engine: Arc<SyncEngine>) -> TrackerHandle {
    let (request_tx, request_rx) = mpsc::channel(16);
    let (event_tx, event_rx) = mpsc::channel(64);
    let auth_rx = engine.session().subscribe();

    tokio::spawn(service_loop(
        config,
        engine.clone(),
        request_rx,
        event_tx,
        engine.session().subscribe(),
    ));

    TrackerHandle {
        client: TrackerClient { request_tx },
        event_rx,
        auth_rx,
    }
}

async fn service_loop(
    config: ServiceConfig,
    engine: Arc<SyncEngine>,
    mut request_rx: mpsc::Receiver<ServiceRequest>,
    event_tx: mpsc::Sender<ServiceEvent>,
    mut auth_rx: watch::Receiver<AuthState>,
) {
    let mut ticker = config
        .auto_sync_interval
        .map(|period| tokio::time::interval_at(Instant::now() + period, period));
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    let mut service = Service {
        config,
        engine,
        event_tx,
        done_tx,
        running: 0,
        deferred: VecDeque::new(),
    };
    let mut auth_open = true;

    loop {
        tokio::select! {
            request = request_rx.recv() => {
                match request {
                    Some(ServiceRequest::Shutdown) | None => break,
                    Some(request) => service.handle(request).await,
                }
            }
            Some(()) = done_rx.recv() => service.sync_finished().await,
            changed = auth_rx.changed(), if auth_open => {
                if changed.is_err() {
                    auth_open = false;
                    continue;
                }
                let state = auth_rx.borrow_and_update().clone();
                emit(&service.event_tx, ServiceEvent::AuthChanged(state));
            }
            _ = next_tick(&mut ticker) => {
                if service.engine.session().is_authenticated() && service.running == 0 {
                    debug!("Periodic sync");
                    service.spawn_sync(None);
                }
            }
        }
    }

    debug!("Tracker service stopped");
}

/// State owned by the service loop
struct Service {
    config: ServiceConfig,
    engine: Arc<SyncEngine>,
    event_tx: mpsc::Sender<ServiceEvent>,
    /// Each spawned sync or push retry reports here when it ends
    done_tx: mpsc::UnboundedSender<()>,
    /// Syncs and push retries spawned and not yet finished
    running: usize,
    /// Local writes held back until no sync is running
    deferred: VecDeque<ServiceRequest>,
}

impl Service {
    async fn handle(&mut self, request: ServiceRequest) {
        // A write landing between a sync's read of the local map and its
        // write-back would be overwritten by the merged map.
        if self.running > 0 && is_local_write(&request) {
            debug!("Deferring local write until the running sync ends");
            self.deferred.push_back(request);
            return;
        }

        let engine = &self.engine;
        let event_tx = &self.event_tx;
        let session = engine.session();
        match request {
            ServiceRequest::Status(reply) => {
                let status = ServiceStatus {
                    auth: session.state(),
                    last_sync_at: session.last_sync_at(),
                    syncing: engine.is_syncing(),
                    entries: engine.store().get().await.len(),
                };
                let _ = reply.send(status);
            }
            ServiceRequest::CheckAuth(reply) => {
                let _ = reply.send(session.check_status().await);
            }
            ServiceRequest::Login { credentials, reply } => {
                let result = session.login(&credentials.username, &credentials.password).await;
                self.after_login(&result);
                let _ = reply.send(result);
            }
            ServiceRequest::Signup { credentials, reply } => {
                let result = session.signup(&credentials.username, &credentials.password).await;
                self.after_login(&result);
                let _ = reply.send(result);
            }
            ServiceRequest::Logout(reply) => {
                session.logout().await;
                let _ = reply.send(());
            }
            ServiceRequest::Sync(reply) => self.spawn_sync(Some(reply)),
            ServiceRequest::RetryPush(reply) => {
                let engine = engine.clone();
                let event_tx = event_tx.clone();
                let done_tx = self.done_tx.clone();
                self.running += 1;
                tokio::spawn(async move {
                    let result = engine.retry_push().await;
                    report_sync(&event_tx, &result);
                    let _ = reply.send(result);
                    let _ = done_tx.send(());
                });
            }
            ServiceRequest::SetLevel {
                problem_key,
                level,
                metadata,
                reply,
            } => {
                let result = engine.set_level(&problem_key, level, &metadata).await;
                if result.is_ok() {
                    emit(
                        event_tx,
                        ServiceEvent::LevelChanged { problem_key, level },
                    );
                }
                let _ = reply.send(result);
            }
            ServiceRequest::GetMap(reply) => {
                let _ = reply.send(engine.store().get().await);
            }
            ServiceRequest::LocalStats(reply) => {
                let _ = reply.send(engine.local_stats().await);
            }
            ServiceRequest::RemoteStats(reply) => {
                let _ = reply.send(engine.remote_stats().await);
            }
            ServiceRequest::Clear(reply) => {
                let result = engine.store().remove().await;
                if result.is_ok() {
                    info!("Cleared local data");
                    emit(event_tx, ServiceEvent::Cleared);
                }
                let _ = reply.send(result);
            }
            ServiceRequest::Shutdown => {}
        }
    }

    /// Apply held-back writes once the last running sync has ended
    async fn sync_finished(&mut self) {
        self.running = self.running.saturating_sub(1);
        while self.running == 0 {
            let Some(request) = self.deferred.pop_front() else {
                break;
            };
            self.handle(request).await;
        }
    }

    fn after_login(&mut self, result: &Result<User, RemoteError>) {
        if result.is_ok() && self.config.sync_on_login {
            self.spawn_sync(None);
        }
    }

    fn spawn_sync(&mut self, reply: Option<Reply<Result<SyncReport, SyncError>>>) {
        let engine = self.engine.clone();
        let event_tx = self.event_tx.clone();
        let done_tx = self.done_tx.clone();
        self.running += 1;
        tokio::spawn(async move {
            let result = engine.sync().await;
            report_sync(&event_tx, &result);
            if let Some(reply) = reply {
                let _ = reply.send(result);
            }
            let _ = done_tx.send(());
        });
    }
}

fn is_local_write(request: &ServiceRequest) -> bool {
    matches!(
        request,
        ServiceRequest::SetLevel { .. } | ServiceRequest::Clear(_)
    )
}

fn report_sync(event_tx: &mpsc::Sender<ServiceEvent>, result: &Result<SyncReport, SyncError>) {
    match result {
        Ok(report) => emit(event_tx, ServiceEvent::Synced(report.clone())),
        Err(SyncError::InProgress) => {}
        Err(e) => {
            warn!("Sync failed: {}", e);
            emit(event_tx, ServiceEvent::Error(e.to_string()));
        }
    }
}

/// Events are advisory; a full or closed channel drops them
fn emit(event_tx: &mpsc::Sender<ServiceEvent>, event: ServiceEvent) {
    if let Err(e) = event_tx.try_send(event) {
        debug!("Dropped service event: {}", e);
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

impl TrackerClient {
    async fn call<T>(
        &self,
        request: impl FnOnce(Reply<T>) -> ServiceRequest,
    ) -> Result<T, ServiceError> {
        let (reply, rx) = oneshot::channel();
        self.request_tx
            .send(request(reply))
            .await
            .map_err(|_| ServiceError::Closed)?;
        rx.await.map_err(|_| ServiceError::Closed)
    }

    pub async fn status(&self) -> Result<ServiceStatus, ServiceError> {
        self.call(ServiceRequest::Status).await
    }

    /// Probe the server for a live session
    pub async fn check_auth(&self) -> Result<bool, ServiceError> {
        self.call(ServiceRequest::CheckAuth).await
    }

    pub async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Result<User, RemoteError>, ServiceError> {
        self.call(|reply| ServiceRequest::Login {
            credentials: Credentials::new(username, password),
            reply,
        })
        .await
    }

    pub async fn signup(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Result<User, RemoteError>, ServiceError> {
        self.call(|reply| ServiceRequest::Signup {
            credentials: Credentials::new(username, password),
            reply,
        })
        .await
    }

    pub async fn logout(&self) -> Result<(), ServiceError> {
        self.call(ServiceRequest::Logout).await
    }

    pub async fn sync(&self) -> Result<Result<SyncReport, SyncError>, ServiceError> {
        self.call(ServiceRequest::Sync).await
    }

    pub async fn retry_push(&self) -> Result<Result<SyncReport, SyncError>, ServiceError> {
        self.call(ServiceRequest::RetryPush).await
    }

    pub async fn set_level(
        &self,
        problem_key: &str,
        level: ConfidenceLevel,
        metadata: EntryMetadata,
    ) -> Result<Result<LevelUpdate, StorageError>, ServiceError> {
        self.call(|reply| ServiceRequest::SetLevel {
            problem_key: problem_key.to_string(),
            level,
            metadata,
            reply,
        })
        .await
    }

    pub async fn get_map(&self) -> Result<ConfidenceMap, ServiceError> {
        self.call(ServiceRequest::GetMap).await
    }

    pub async fn local_stats(&self) -> Result<ConfidenceStats, ServiceError> {
        self.call(ServiceRequest::LocalStats).await
    }

    pub async fn remote_stats(
        &self,
    ) -> Result<Result<ConfidenceStats, RemoteError>, ServiceError> {
        self.call(ServiceRequest::RemoteStats).await
    }

    pub async fn clear(&self) -> Result<Result<(), StorageError>, ServiceError> {
        self.call(ServiceRequest::Clear).await
    }

    /// Ask the service to stop; pending syncs still finish
    pub async fn shutdown(&self) {
        let _ = self.request_tx.send(ServiceRequest::Shutdown).await;
    }
}
