//! End-to-end tests: the real router on a loopback port, driven through the
//! core HTTP client and sync engine.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::net::TcpListener;
use tracker_core::sync::{Credentials, EntryMetadata, RemoteApi};
use tracker_core::{
    AuthSession, ConfidenceMap, HttpRemote, LocalStore, MemoryStore, RemoteError, SyncEngine,
};
use tracker_server::{router, AppState, Database};

async fn start_server() -> (SocketAddr, tokio::task::JoinHandle<()>) {
    start_server_with_ttl(chrono::Duration::days(7)).await
}

async fn start_server_with_ttl(
    ttl: chrono::Duration,
) -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let db = Database::open_in_memory().unwrap();
    let state = AppState::new(db, ttl);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    (addr, handle)
}

fn client(addr: SocketAddr) -> Arc<HttpRemote> {
    Arc::new(HttpRemote::new(&format!("http://{addr}"), Duration::from_secs(5)).unwrap())
}

fn creds(username: &str, password: &str) -> Credentials {
    Credentials::new(username, password)
}

fn map(pairs: &[(&str, &str)]) -> ConfidenceMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// A fresh device: empty memory store, logged in as `username`
async fn device(
    addr: SocketAddr,
    username: &str,
    local: ConfidenceMap,
) -> (SyncEngine, Arc<MemoryStore>) {
    let remote = client(addr);
    let session = Arc::new(AuthSession::new(remote.clone()));
    session.login(username, "secret").await.unwrap();
    let store = Arc::new(MemoryStore::with_map(local));
    (SyncEngine::new(store.clone(), remote, session), store)
}

#[tokio::test]
async fn health_reports_ok() {
    let (addr, _server) = start_server().await;

    let body: serde_json::Value = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "OK");
}

#[tokio::test]
async fn signup_login_and_me() {
    let (addr, _server) = start_server().await;
    let remote = client(addr);

    let user = remote.signup(&creds("alice", "secret")).await.unwrap();
    assert_eq!(user.username, "alice");
    assert!(remote.has_session());

    let me = remote.current_user().await.unwrap();
    assert_eq!(me.id, user.id);

    let other = client(addr);
    let again = other.login(&creds("alice", "secret")).await.unwrap();
    assert_eq!(again.id, user.id);
}

#[tokio::test]
async fn bad_credentials_are_rejected() {
    let (addr, _server) = start_server().await;
    let remote = client(addr);
    remote.signup(&creds("alice", "secret")).await.unwrap();

    let fresh = client(addr);
    let wrong_password = fresh.login(&creds("alice", "wrong")).await.unwrap_err();
    assert!(matches!(wrong_password, RemoteError::Unauthorized(_)));
    assert!(!fresh.has_session());

    // Unknown users get the same answer as a wrong password
    let unknown_user = fresh.login(&creds("nobody", "secret")).await.unwrap_err();
    assert_eq!(unknown_user, wrong_password);
}

#[tokio::test]
async fn duplicate_signup_is_a_validation_error() {
    let (addr, _server) = start_server().await;
    client(addr).signup(&creds("alice", "secret")).await.unwrap();

    let err = client(addr)
        .signup(&creds("alice", "other"))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        RemoteError::Validation("Username already exists".to_string())
    );
}

#[tokio::test]
async fn requests_without_session_are_unauthorized() {
    let (addr, _server) = start_server().await;

    for path in ["/api/auth/me", "/api/confidence", "/api/stats"] {
        let response = reqwest::get(format!("http://{addr}{path}")).await.unwrap();
        assert_eq!(response.status(), 401, "{path}");
    }

    let response = reqwest::Client::new()
        .get(format!("http://{addr}/api/confidence"))
        .header("Cookie", "sid=not-a-session")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn logout_ends_the_session() {
    let (addr, _server) = start_server().await;
    let remote = client(addr);
    remote.signup(&creds("alice", "secret")).await.unwrap();

    remote.logout().await.unwrap();
    assert!(!remote.has_session());
    assert!(matches!(
        remote.current_user().await,
        Err(RemoteError::Unauthorized(_))
    ));

    // Lenient without a cookie
    let response = reqwest::Client::new()
        .post(format!("http://{addr}/api/auth/logout"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn push_is_an_idempotent_upsert() {
    let (addr, _server) = start_server().await;
    let remote = client(addr);
    remote.signup(&creds("alice", "secret")).await.unwrap();

    remote
        .push_confidence(&map(&[("a", "low"), ("b", "high")]))
        .await
        .unwrap();
    remote.push_confidence(&map(&[("a", "expert")])).await.unwrap();
    remote.push_confidence(&map(&[("a", "expert")])).await.unwrap();

    let stored = remote.fetch_confidence().await.unwrap();
    assert_eq!(stored, map(&[("a", "expert"), ("b", "high")]));
}

#[tokio::test]
async fn invalid_sync_body_writes_nothing() {
    let (addr, _server) = start_server().await;
    let remote = client(addr);
    remote.signup(&creds("alice", "secret")).await.unwrap();
    remote.push_confidence(&map(&[("a", "low")])).await.unwrap();

    // Share the session cookie with a raw client
    let login = reqwest::Client::new()
        .post(format!("http://{addr}/api/auth/login"))
        .json(&json!({"username": "alice", "password": "secret"}))
        .send()
        .await
        .unwrap();
    let cookie = login
        .headers()
        .get("set-cookie")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .unwrap()
        .to_string();

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/api/confidence/sync"))
        .header("Cookie", cookie)
        .json(&json!({"confidenceData": {"a": "high", "b": {"bad": 1}}}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Invalid confidence data");

    assert_eq!(
        remote.fetch_confidence().await.unwrap(),
        map(&[("a", "low")])
    );
}

#[tokio::test]
async fn users_only_see_their_own_data() {
    let (addr, _server) = start_server().await;
    let alice = client(addr);
    let bob = client(addr);
    alice.signup(&creds("alice", "secret")).await.unwrap();
    bob.signup(&creds("bob", "secret")).await.unwrap();

    alice.push_confidence(&map(&[("a", "high")])).await.unwrap();
    assert!(bob.fetch_confidence().await.unwrap().is_empty());
}

#[tokio::test]
async fn update_one_keeps_metadata() {
    let (addr, _server) = start_server().await;
    let remote = client(addr);
    remote.signup(&creds("alice", "secret")).await.unwrap();

    let metadata = EntryMetadata {
        sheet_name: Some("Blind 75".to_string()),
        problem_title: Some("Two Sum".to_string()),
    };
    let entry = remote
        .update_one("blind-75|two sum", "medium", &metadata)
        .await
        .unwrap();
    assert_eq!(entry.problem_key, "blind-75|two sum");
    assert_eq!(entry.confidence_level, "medium");
    assert_eq!(entry.sheet_name.as_deref(), Some("Blind 75"));

    let entry = remote
        .update_one("blind-75|two sum", "high", &EntryMetadata::default())
        .await
        .unwrap();
    assert_eq!(entry.confidence_level, "high");
    assert_eq!(entry.problem_title.as_deref(), Some("Two Sum"));

    let err = remote
        .update_one("blind-75|two sum", "", &EntryMetadata::default())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        RemoteError::Validation("Confidence level is required".to_string())
    );
}

#[tokio::test]
async fn stats_count_unknown_levels_in_total_only() {
    let (addr, _server) = start_server().await;
    let remote = client(addr);
    remote.signup(&creds("alice", "secret")).await.unwrap();
    remote
        .push_confidence(&map(&[
            ("a", "low"),
            ("b", "low"),
            ("c", "expert"),
            ("d", "legendary"),
        ]))
        .await
        .unwrap();

    let stats = remote.fetch_stats().await.unwrap();
    assert_eq!(stats.total, 4);
    assert_eq!(stats.low, 2);
    assert_eq!(stats.expert, 1);
    assert_eq!(stats.none + stats.medium + stats.high, 0);
}

#[tokio::test]
async fn two_devices_converge_with_local_precedence() {
    let (addr, _server) = start_server().await;
    client(addr).signup(&creds("alice", "secret")).await.unwrap();

    let (laptop, laptop_store) =
        device(addr, "alice", map(&[("a", "low"), ("b", "medium")])).await;
    laptop.sync().await.unwrap();

    let (phone, phone_store) = device(addr, "alice", map(&[("a", "expert"), ("c", "high")])).await;
    let report = phone.sync().await.unwrap();
    assert_eq!(report.entries, 3);
    assert_eq!(report.pulled, 1);
    assert_eq!(report.overridden, 1);
    assert_eq!(
        phone_store.get().await,
        map(&[("a", "expert"), ("b", "medium"), ("c", "high")])
    );

    laptop.sync().await.unwrap();
    // The laptop's local "low" wins on its own device and is pushed back
    assert_eq!(
        laptop_store.get().await,
        map(&[("a", "low"), ("b", "medium"), ("c", "high")])
    );
    let server = client(addr);
    server.login(&creds("alice", "secret")).await.unwrap();
    assert_eq!(server.fetch_confidence().await.unwrap().get("a").unwrap(), "low");
}

#[tokio::test]
async fn fresh_device_pulls_server_data() {
    let (addr, _server) = start_server().await;
    let seeder = client(addr);
    seeder.signup(&creds("alice", "secret")).await.unwrap();
    seeder.push_confidence(&map(&[("p1", "high")])).await.unwrap();

    let (engine, store) = device(addr, "alice", ConfidenceMap::new()).await;
    engine.sync().await.unwrap();

    assert_eq!(store.get().await, map(&[("p1", "high")]));
    assert_eq!(
        seeder.fetch_confidence().await.unwrap(),
        map(&[("p1", "high")])
    );
}

#[tokio::test]
async fn expired_session_invalidates_auth() {
    let (addr, _server) = start_server_with_ttl(chrono::Duration::zero()).await;
    client(addr).signup(&creds("alice", "secret")).await.unwrap();
    let (engine, store) = device(addr, "alice", map(&[("a", "low")])).await;

    let err = engine.sync().await.unwrap_err();
    assert!(matches!(
        err.remote_error(),
        Some(RemoteError::Unauthorized(_))
    ));
    assert!(!engine.session().is_authenticated());
    assert_eq!(store.get().await, map(&[("a", "low")]));
}
