//! Tracker Server - hosted REST service for the confidence tracker
//!
//! Stores accounts, cookie sessions and per-user confidence data in SQLite
//! and serves them over a small JSON API:
//!
//! | Method | Path                          | Auth |
//! |--------|-------------------------------|------|
//! | POST   | `/api/auth/signup`            | no   |
//! | POST   | `/api/auth/login`             | no   |
//! | POST   | `/api/auth/logout`            | no   |
//! | GET    | `/api/auth/me`                | yes  |
//! | GET    | `/api/confidence`             | yes  |
//! | POST   | `/api/confidence/sync`        | yes  |
//! | PUT    | `/api/confidence/:problem_id` | yes  |
//! | GET    | `/api/stats`                  | yes  |
//! | GET    | `/health`                     | no   |

pub mod config;
pub mod db;
pub mod error;
pub mod password;
pub mod routes;
pub mod session;

use std::time::Duration as StdDuration;

use axum::routing::{get, post, put};
use axum::Router;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

pub use config::ServerConfig;
pub use db::{Database, DbError};
pub use error::{ApiError, ApiResult};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub session_ttl: chrono::Duration,
}

impl AppState {
    pub fn new(db: Database, session_ttl: chrono::Duration) -> Self {
        Self { db, session_ttl }
    }
}

/// Build the API router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/api/auth/signup", post(routes::auth::signup))
        .route("/api/auth/login", post(routes::auth::login))
        .route("/api/auth/logout", post(routes::auth::logout))
        .route("/api/auth/me", get(routes::auth::me))
        .route("/api/confidence", get(routes::confidence::get_confidence))
        .route(
            "/api/confidence/sync",
            post(routes::confidence::sync_confidence),
        )
        .route(
            "/api/confidence/:problem_id",
            put(routes::confidence::update_confidence),
        )
        .route("/api/stats", get(routes::stats))
        .with_state(state)
}

/// Periodically drop expired sessions
pub fn spawn_session_sweeper(db: Database, every: StdDuration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            match db.run(|db| db.purge_expired_sessions()).await {
                Ok(0) => {}
                Ok(n) => debug!("Purged {} expired sessions", n),
                Err(e) => warn!("Session sweep failed: {}", e),
            }
        }
    })
}

/// Serve the API on an already bound listener until the task is dropped
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Listening on http://{}", addr);
    }
    axum::serve(listener, router(state)).await
}
