//! # Network
//!
//! Requests to the remote data service, behind the [`Network`] trait.
//!
//! ## Request Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  NetworkRequest ──► execute(network, timeout)                          │
//! │                         │                                               │
//! │                         │  tokio::time::timeout                        │
//! │                         ▼                                               │
//! │                  ┌──────────────┐       ┌──────────────────────────┐   │
//! │                  │ dyn Network  │──────►│ HttpNetwork (reqwest)    │   │
//! │                  └──────────────┘       │ MockNetwork (tests)      │   │
//! │                                         └──────────────────────────┘   │
//! │                                                                         │
//! │  Status mapping:                                                       │
//! │    401 / 403            ──► InsufficientCredentials                    │
//! │    404                  ──► NotFound                                   │
//! │    400                  ──► Parameter                                  │
//! │    other 4xx / 5xx      ──► Server { status }                          │
//! │    no response          ──► Network                                    │
//! │    deadline exceeded    ──► Timeout                                    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nimbus_core::Query;
use nimbus_db::Method;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::error::{SyncError, SyncResult};
use crate::session::Session;

// =============================================================================
// Request
// =============================================================================

/// Which credentials sign a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthType {
    /// Active user's token if signed in, else master secret, else app secret.
    #[default]
    Default,
    /// Active user's token; fails without one.
    Session,
    /// App key and app secret.
    App,
    /// App key and master secret.
    Master,
    None,
}

#[derive(Debug, Clone)]
pub struct NetworkRequest {
    pub method: Method,
    /// Path relative to the service base URL, e.g. `/appdata/kid_app/books/b1`.
    pub path: String,
    pub query: Option<Query>,
    pub body: Option<Value>,
    pub auth: AuthType,
    /// Overrides the client default timeout.
    pub timeout: Option<Duration>,
}

impl NetworkRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        NetworkRequest {
            method,
            path: path.into(),
            query: None,
            body: None,
            auth: AuthType::Default,
            timeout: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Post, path).body(body)
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Put, path).body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn query(mut self, query: Option<Query>) -> Self {
        self.query = query;
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn auth(mut self, auth: AuthType) -> Self {
        self.auth = auth;
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sends the request, failing with `SyncError::Timeout` once the
    /// request timeout (or `default_timeout`) elapses.
    pub async fn execute(self, network: &dyn Network, default_timeout: Duration) -> SyncResult<Value> {
        let timeout = self.timeout.unwrap_or(default_timeout);
        let method = self.method;
        let path = self.path.clone();

        debug!(%method, %path, "Sending network request");

        match tokio::time::timeout(timeout, network.send(self)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(%method, %path, timeout_ms = timeout.as_millis() as u64, "Network request timed out");
                Err(SyncError::Timeout(timeout.as_millis() as u64))
            }
        }
    }
}

// =============================================================================
// Network Trait
// =============================================================================

/// The remote data service.
#[async_trait]
pub trait Network: Send + Sync {
    /// Sends one request and returns the response body as JSON
    /// (`Value::Null` for an empty body).
    async fn send(&self, request: NetworkRequest) -> SyncResult<Value>;
}

// =============================================================================
// HTTP Implementation
// =============================================================================

/// [`Network`] over HTTP with `reqwest`.
pub struct HttpNetwork {
    client: reqwest::Client,
    base_url: Url,
    session: Arc<Session>,
}

enum Credentials {
    Basic(String, String),
    Bearer(String),
    None,
}

impl HttpNetwork {
    /// ## Errors
    /// `SyncError::InvalidUrl` if `base_url` does not parse.
    pub fn new(base_url: &str, session: Arc<Session>) -> SyncResult<Self> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(HttpNetwork {
            client: reqwest::Client::new(),
            base_url,
            session,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, request: &NetworkRequest) -> SyncResult<Url> {
        let mut url = self.base_url.join(request.path.trim_start_matches('/'))?;
        if let Some(query) = &request.query {
            let params = query.to_query_params()?;
            if !params.is_empty() {
                url.query_pairs_mut().extend_pairs(params);
            }
        }
        Ok(url)
    }

    async fn credentials(&self, auth: AuthType) -> SyncResult<Credentials> {
        let app_key = self.session.app_key().to_string();
        let master = || {
            self.session
                .master_secret()
                .map(|secret| Credentials::Basic(app_key.clone(), secret.to_string()))
        };

        match auth {
            AuthType::None => Ok(Credentials::None),
            AuthType::App => Ok(Credentials::Basic(
                app_key.clone(),
                self.session.app_secret().to_string(),
            )),
            AuthType::Master => master().ok_or_else(|| {
                SyncError::InsufficientCredentials("no master secret configured".into())
            }),
            AuthType::Session => self
                .session
                .authtoken()
                .await
                .map(Credentials::Bearer)
                .ok_or_else(|| SyncError::InsufficientCredentials("no active user".into())),
            AuthType::Default => match self.session.authtoken().await {
                Some(token) => Ok(Credentials::Bearer(token)),
                None => Ok(master().unwrap_or_else(|| {
                    Credentials::Basic(app_key.clone(), self.session.app_secret().to_string())
                })),
            },
        }
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn send(&self, request: NetworkRequest) -> SyncResult<Value> {
        let url = self.url(&request)?;
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self.client.request(method, url);
        builder = match self.credentials(request.auth).await? {
            Credentials::Basic(user, password) => builder.basic_auth(user, Some(password)),
            Credentials::Bearer(token) => builder.bearer_auth(token),
            Credentials::None => builder,
        };
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                SyncError::Timeout(request.timeout.map(|t| t.as_millis() as u64).unwrap_or(0))
            } else {
                SyncError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let text = response.text().await?;

        if !(200..300).contains(&status) {
            return Err(map_status(status, &text));
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

/// Maps an error response to a `SyncError`.
///
/// The body's `error` name wins over the status code when it is one the
/// SDK knows.
pub fn map_status(status: u16, body: &str) -> SyncError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let name = parsed
        .as_ref()
        .and_then(|v| v.get("error"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    let message = parsed
        .as_ref()
        .and_then(|v| v.get("description").or_else(|| v.get("debug")))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string());

    match name {
        "InsufficientCredentials" | "InvalidCredentials" => {
            return SyncError::InsufficientCredentials(message)
        }
        "EntityNotFound" | "CollectionNotFound" | "AppNotFound" => {
            return SyncError::NotFound(message)
        }
        _ => {}
    }

    match status {
        401 | 403 => SyncError::InsufficientCredentials(message),
        404 => SyncError::NotFound(message),
        400 => SyncError::Parameter(message),
        _ => SyncError::Server { status, message },
    }
}

// =============================================================================
// Mock Network (tests)
// =============================================================================


// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::mock::MockNetwork;
    use super::*;
    use crate::config::AppConfig;
    use serde_json::json;

    #[test]
    fn test_status_mapping() {
        assert!(map_status(401, "").is_insufficient_credentials());
        assert!(map_status(403, "{}").is_insufficient_credentials());
        assert!(map_status(404, "").is_not_found());
        assert!(matches!(map_status(400, "bad"), SyncError::Parameter(_)));
        assert!(matches!(
            map_status(503, "down"),
            SyncError::Server { status: 503, .. }
        ));
        assert!(matches!(
            map_status(409, "conflict"),
            SyncError::Server { status: 409, .. }
        ));
    }

    #[test]
    fn test_error_name_overrides_status() {
        let body = r#"{"error":"EntityNotFound","description":"gone"}"#;
        match map_status(500, body) {
            SyncError::NotFound(message) => assert_eq!(message, "gone"),
            other => panic!("unexpected {other:?}"),
        }
        let body = r#"{"error":"InvalidCredentials"}"#;
        assert!(map_status(400, body).is_insufficient_credentials());
    }

    #[test]
    fn test_http_url_building() {
        let session = Arc::new(Session::new(&AppConfig {
            key: "kid_app".into(),
            secret: "s".into(),
            master_secret: None,
        }));
        let network = HttpNetwork::new("https://baas.example.com/api", session).unwrap();
        assert_eq!(network.base_url().as_str(), "https://baas.example.com/api/");

        let request = NetworkRequest::get("/appdata/kid_app/books")
            .query(Some(Query::new().equal_to("title", "Dune").limit(5)));
        let url = network.url(&request).unwrap();
        assert_eq!(url.path(), "/api/appdata/kid_app/books");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("limit".to_string(), "5".to_string())));
        assert!(pairs.iter().any(|(k, _)| k == "query"));
    }

    #[tokio::test]
    async fn test_session_auth_requires_active_user() {
        let session = Arc::new(Session::new(&AppConfig {
            key: "kid_app".into(),
            secret: "s".into(),
            master_secret: None,
        }));
        let network = HttpNetwork::new("http://localhost:7007", session).unwrap();
        assert!(network.credentials(AuthType::Session).await.is_err());
        assert!(network.credentials(AuthType::Master).await.is_err());
        assert!(matches!(
            network.credentials(AuthType::Default).await.unwrap(),
            Credentials::Basic(_, _)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_maps_to_timeout_error() {
        let network = MockNetwork::new();
        network.set_delay(Duration::from_secs(120));

        let err = NetworkRequest::get("/appdata/kid_app/books")
            .execute(&network, Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Timeout(60_000)));

        let err = NetworkRequest::get("/appdata/kid_app/books")
            .timeout(Some(Duration::from_millis(5)))
            .execute(&network, Duration::from_secs(600))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Timeout(5)));
    }

    #[tokio::test]
    async fn test_mock_network_records_and_serves() {
        let network = MockNetwork::new();
        network.seed("books", vec![json!({"_id": "b1", "title": "Dune"})]);

        let found = NetworkRequest::get("/appdata/kid_app/books/b1")
            .execute(&network, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(found["title"], "Dune");

        let created = NetworkRequest::post("/appdata/kid_app/books", json!({"title": "Emma"}))
            .execute(&network, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(created["_id"].as_str().unwrap().starts_with("srv"));

        network.fail(Method::Delete, Some("b1"), SyncError::Network("reset".into()));
        let err = NetworkRequest::delete("/appdata/kid_app/books/b1")
            .execute(&network, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.is_retryable());

        assert_eq!(network.requests().len(), 3);
        assert_eq!(network.remote("books").len(), 2);
    }
}
