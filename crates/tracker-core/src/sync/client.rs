//! HTTP client for the hosted REST API
//!
//! Wraps `reqwest` with the service's conventions: JSON bodies, a `sid`
//! session cookie captured from `Set-Cookie` and replayed on every request,
//! and status codes mapped onto [`RemoteError`].

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{COOKIE, SET_COOKIE};
use reqwest::{IntoUrl, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use super::error::RemoteError;
use super::message::{
    Credentials, ErrorResponse, MessageResponse, SyncRequest, UpdateRequest, UpdateResponse,
    UserResponse, SESSION_COOKIE,
};
use super::remote::{EntryMetadata, RemoteApi};
use super::state::SessionState;
use crate::config::Config;
use crate::models::{ConfidenceEntry, ConfidenceMap, User};
use crate::stats::ConfidenceStats;

/// REST client for the hosted confidence service
pub struct HttpRemote {
    /// Base URL, without trailing slash
    base: Url,
    client: reqwest::Client,
    timeout: Duration,
    /// Session cookie, optionally persisted
    session: Mutex<SessionState>,
}

impl HttpRemote {
    /// Create a client with an in-memory session
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RemoteError> {
        let base = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| RemoteError::Validation(format!("Invalid API URL '{}': {}", base_url, e)))?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tracker/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        Ok(Self {
            base,
            client,
            timeout,
            session: Mutex::new(SessionState::new()),
        })
    }

    /// Create a client from configuration, persisting the session under the data dir
    pub fn from_config(config: &Config) -> Result<Self, RemoteError> {
        let remote = Self::new(&config.api_url, config.request_timeout())?;
        match SessionState::with_path(config.session_path()) {
            Ok(state) => Ok(remote.with_session_state(state)),
            Err(e) => {
                warn!("Ignoring unreadable session file: {:#}", e);
                Ok(remote)
            }
        }
    }

    /// Replace the session store
    pub fn with_session_state(self, state: SessionState) -> Self {
        Self {
            session: Mutex::new(state),
            ..self
        }
    }

    pub fn base_url(&self) -> &str {
        self.base.as_str().trim_end_matches('/')
    }

    /// Whether a session cookie is currently held
    pub fn has_session(&self) -> bool {
        self.with_session(|s| s.token().is_some())
    }

    /// Whether credentials may be sent to this server
    ///
    /// Plain HTTP is only accepted for loopback hosts.
    pub fn is_secure_transport(&self) -> bool {
        if self.base.scheme() == "https" {
            return true;
        }
        matches!(
            self.base.host_str(),
            Some("localhost") | Some("127.0.0.1") | Some("[::1]") | Some("::1")
        )
    }

    fn with_session<T>(&self, f: impl FnOnce(&mut SessionState) -> T) -> T {
        let mut guard = match self.session.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.request_to(method, self.url(path))
    }

    fn request_to(&self, method: Method, url: impl IntoUrl) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match self.with_session(|s| s.token().map(str::to_string)) {
            Some(token) => builder.header(COOKIE, format!("{}={}", SESSION_COOKIE, token)),
            None => builder,
        }
    }

    /// Send a request and map the status onto [`RemoteError`]
    async fn send(&self, builder: RequestBuilder) -> Result<Response, RemoteError> {
        let response = builder.send().await.map_err(|e| self.transport_error(e))?;
        self.capture_cookie(&response);

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = error_message(response).await;
        debug!("Request failed with {}: {}", status, message);
        Err(classify(status, message))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, RemoteError> {
        let response = self.send(builder).await?;
        let status = response.status();
        response.json::<T>().await.map_err(|e| RemoteError::Server {
            status: status.as_u16(),
            message: format!("Unexpected response body: {}", e),
        })
    }

    fn capture_cookie(&self, response: &Response) {
        for value in response.headers().get_all(SET_COOKIE) {
            let Ok(raw) = value.to_str() else { continue };
            let Some(cookie) = parse_session_cookie(raw) else {
                continue;
            };

            let result = self.with_session(|s| match cookie {
                SessionCookie::Set(token) => s.set(token),
                SessionCookie::Cleared => s.clear(),
            });
            if let Err(e) = result {
                warn!("Failed to persist session: {:#}", e);
            }
        }
    }

    fn clear_session(&self) {
        if let Err(e) = self.with_session(|s| s.clear()) {
            warn!("Failed to remove session: {:#}", e);
        }
    }

    fn transport_error(&self, e: reqwest::Error) -> RemoteError {
        if e.is_timeout() {
            RemoteError::Network(format!("Request timed out after {:?}", self.timeout))
        } else if e.is_connect() {
            RemoteError::Network(format!("Unable to connect to {}", self.base_url()))
        } else {
            RemoteError::Network(e.to_string())
        }
    }

    async fn authenticate(&self, path: &str, credentials: &Credentials) -> Result<User, RemoteError> {
        if !credentials.is_complete() {
            return Err(RemoteError::Validation(
                "Username and password are required".to_string(),
            ));
        }
        if !self.is_secure_transport() {
            return Err(RemoteError::Validation(format!(
                "Refusing to send credentials over plain HTTP to {}",
                self.base_url()
            )));
        }

        let response: UserResponse = self
            .send_json(self.request(Method::POST, path).json(credentials))
            .await?;
        Ok(response.user)
    }
}

#[async_trait]
impl RemoteApi for HttpRemote {
    async fn signup(&self, credentials: &Credentials) -> Result<User, RemoteError> {
        let user = self.authenticate("/api/auth/signup", credentials).await?;
        info!("Signed up as {}", user.username);
        Ok(user)
    }

    async fn login(&self, credentials: &Credentials) -> Result<User, RemoteError> {
        let user = self.authenticate("/api/auth/login", credentials).await?;
        info!("Logged in as {}", user.username);
        Ok(user)
    }

    async fn logout(&self) -> Result<(), RemoteError> {
        let result = self
            .send_json::<MessageResponse>(self.request(Method::POST, "/api/auth/logout"))
            .await;
        // The local session ends whatever the server says
        self.clear_session();
        result.map(|_| ())
    }

    async fn current_user(&self) -> Result<User, RemoteError> {
        if !self.has_session() {
            return Err(RemoteError::Unauthorized("No session".to_string()));
        }
        let response: UserResponse = self
            .send_json(self.request(Method::GET, "/api/auth/me"))
            .await?;
        Ok(response.user)
    }

    async fn fetch_confidence(&self) -> Result<ConfidenceMap, RemoteError> {
        let map: ConfidenceMap = self
            .send_json(self.request(Method::GET, "/api/confidence"))
            .await?;
        debug!("Fetched {} remote entries", map.len());
        Ok(map)
    }

    async fn push_confidence(&self, map: &ConfidenceMap) -> Result<(), RemoteError> {
        let body = SyncRequest {
            confidence_data: map.clone(),
        };
        self.send_json::<MessageResponse>(
            self.request(Method::POST, "/api/confidence/sync").json(&body),
        )
        .await?;
        debug!("Pushed {} entries", map.len());
        Ok(())
    }

    async fn update_one(
        &self,
        problem_key: &str,
        level: &str,
        metadata: &EntryMetadata,
    ) -> Result<ConfidenceEntry, RemoteError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteError::Validation("API URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["api", "confidence", problem_key]);

        let body = UpdateRequest {
            confidence_level: Some(level.to_string()),
            sheet_name: metadata.sheet_name.clone(),
            problem_title: metadata.problem_title.clone(),
        };
        let response: UpdateResponse = self
            .send_json(self.request_to(Method::PUT, url).json(&body))
            .await?;
        Ok(response.confidence)
    }

    async fn fetch_stats(&self) -> Result<ConfidenceStats, RemoteError> {
        self.send_json(self.request(Method::GET, "/api/stats")).await
    }
}

/// Outcome of a `Set-Cookie` header for the session cookie
#[derive(Debug, PartialEq, Eq)]
enum SessionCookie {
    Set(String),
    Cleared,
}

fn parse_session_cookie(raw: &str) -> Option<SessionCookie> {
    let mut parts = raw.split(';').map(str::trim);
    let (name, value) = parts.next()?.split_once('=')?;
    if name != SESSION_COOKIE {
        return None;
    }

    let expired = parts.any(|attr| {
        attr.split_once('=')
            .map(|(k, v)| k.eq_ignore_ascii_case("max-age") && v.trim() == "0")
            .unwrap_or(false)
    });

    if value.is_empty() || expired {
        Some(SessionCookie::Cleared)
    } else {
        Some(SessionCookie::Set(value.to_string()))
    }
}

async fn error_message(response: Response) -> String {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorResponse>(&text) {
        Ok(body) => body.error,
        Err(_) if !text.trim().is_empty() => text,
        Err(_) => status
            .canonical_reason()
            .unwrap_or("Request failed")
            .to_string(),
    }
}

fn classify(status: StatusCode, message: String) -> RemoteError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteError::Unauthorized(message),
        s if s.is_client_error() => RemoteError::Validation(message),
        s => RemoteError::Server {
            status: s.as_u16(),
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_session_cookie() {
        assert_eq!(
            parse_session_cookie("sid=abc; HttpOnly; Path=/; Max-Age=604800"),
            Some(SessionCookie::Set("abc".to_string()))
        );
        assert_eq!(
            parse_session_cookie("sid=; Path=/; Max-Age=0"),
            Some(SessionCookie::Cleared)
        );
        assert_eq!(
            parse_session_cookie("sid=abc; max-age=0"),
            Some(SessionCookie::Cleared)
        );
        assert_eq!(parse_session_cookie("other=abc; Path=/"), None);
        assert_eq!(parse_session_cookie("garbage"), None);
    }

    #[test]
    fn test_classify_status() {
        assert!(matches!(
            classify(StatusCode::UNAUTHORIZED, "x".into()),
            RemoteError::Unauthorized(_)
        ));
        assert!(matches!(
            classify(StatusCode::BAD_REQUEST, "x".into()),
            RemoteError::Validation(_)
        ));
        assert!(matches!(
            classify(StatusCode::BAD_GATEWAY, "x".into()),
            RemoteError::Server { status: 502, .. }
        ));
    }

    #[test]
    fn test_secure_transport() {
        let timeout = Duration::from_secs(1);
        assert!(HttpRemote::new("https://example.com", timeout)
            .unwrap()
            .is_secure_transport());
        assert!(HttpRemote::new("http://localhost:5001", timeout)
            .unwrap()
            .is_secure_transport());
        assert!(HttpRemote::new("http://127.0.0.1:5001/", timeout)
            .unwrap()
            .is_secure_transport());
        assert!(HttpRemote::new("http://[::1]:5001", timeout)
            .unwrap()
            .is_secure_transport());
        assert!(!HttpRemote::new("http://example.com", timeout)
            .unwrap()
            .is_secure_transport());
    }

    #[test]
    fn test_invalid_base_url() {
        let err = HttpRemote::new("not a url", Duration::from_secs(1))
            .err()
            .unwrap();
        assert!(matches!(err, RemoteError::Validation(_)));
    }

    #[test]
    fn test_base_url_trims_slash() {
        let remote = HttpRemote::new("http://localhost:5001/", Duration::from_secs(1)).unwrap();
        assert_eq!(remote.base_url(), "http://localhost:5001");
        assert_eq!(remote.url("/api/stats"), "http://localhost:5001/api/stats");
    }

    #[tokio::test]
    async fn test_login_over_plain_http_is_refused() {
        let remote = HttpRemote::new("http://example.com", Duration::from_secs(1)).unwrap();
        let err = remote
            .login(&Credentials::new("alice", "pw"))
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Validation(_)));
    }

    #[tokio::test]
    async fn test_me_without_session_is_unauthorized() {
        let remote = HttpRemote::new("http://localhost:1", Duration::from_secs(1)).unwrap();
        let err = remote.current_user().await.unwrap_err();
        assert!(matches!(err, RemoteError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        // Port 1 on loopback is not listening
        let remote = HttpRemote::new("http://127.0.0.1:1", Duration::from_secs(2)).unwrap();
        let err = remote.fetch_confidence().await.unwrap_err();
        assert!(matches!(err, RemoteError::Network(_)));
    }
}
