//! # HTTP Client Core
//!
//! Issues requests against the backend, attaches the current bearer
//! credential, and applies the configured timeout.
//!
//! ## Response Classification
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  send(request)                                                          │
//! │       │                                                                 │
//! │       ├── no response (DNS, reset, TLS)  → ClientError::Transport       │
//! │       ├── timeout                        → ClientError::Timeout         │
//! │       ├── 2xx                            → Ok(ApiResponse)              │
//! │       ├── 401                            → ClientError::CredentialExpired│
//! │       └── other status                   → ClientError::Api{status,msg} │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! This layer knows nothing about refreshing. The [`crate::auth`] module
//! wraps it and intercepts `CredentialExpired`.

use std::sync::RwLock;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

pub use reqwest::Method;

// =============================================================================
// Request / Response
// =============================================================================

/// One backend call. The path is relative to the configured base URL and may
/// carry a query string.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PATCH, path).with_body(body)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Path without the query string.
    pub fn route(&self) -> &str {
        self.path.split('?').next().unwrap_or(&self.path)
    }
}

/// A successful (2xx) response.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    /// Decoded JSON body. `Null` for an empty body; a JSON string for a
    /// non-JSON body.
    pub body: Value,
}

impl ApiResponse {
    /// Decodes the body into `T`.
    pub fn json<T: DeserializeOwned>(&self) -> ClientResult<T> {
        serde_json::from_value(self.body.clone())
            .map_err(|e| ClientError::DeserializationFailed(e.to_string()))
    }
}

// =============================================================================
// HttpClient
// =============================================================================

/// Thin wrapper over `reqwest::Client` holding the default credential.
#[derive(Debug)]
pub struct HttpClient {
    inner: reqwest::Client,
    base_url: String,
    timeout: Duration,
    default_token: RwLock<Option<String>>,
}

impl HttpClient {
    /// Builds a client from the `[api]` settings.
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let base_url = config.api.base_url.trim_end_matches('/').to_string();
        Url::parse(&base_url)?;

        let inner = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(config.api.user_agent.clone())
            .build()
            .map_err(|e| ClientError::InvalidConfig(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            inner,
            base_url,
            timeout: config.timeout(),
            default_token: RwLock::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The bearer token attached by [`send`](Self::send).
    pub fn default_token(&self) -> Option<String> {
        self.default_token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Replaces (or with `None`, removes) the default bearer token.
    pub fn set_default_token(&self, token: Option<String>) {
        *self
            .default_token
            .write()
            .unwrap_or_else(|e| e.into_inner()) = token;
    }

    /// Sends with the current default token.
    pub async fn send(&self, request: &ApiRequest) -> ClientResult<ApiResponse> {
        let token = self.default_token();
        self.send_with_token(request, token.as_deref()).await
    }

    /// Sends with an explicit token (`None` sends no Authorization header).
    pub async fn send_with_token(
        &self,
        request: &ApiRequest,
        token: Option<&str>,
    ) -> ClientResult<ApiResponse> {
        let url = self.url_for(&request.path)?;
        trace!(method = %request.method, %url, "Dispatching request");

        let mut builder = self.inner.request(request.method.clone(), url);
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| self.map_transport(e))?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| self.map_transport(e))?;
        let body = decode_body(&bytes);

        if status.is_success() {
            return Ok(ApiResponse {
                status: status.as_u16(),
                body,
            });
        }

        debug!(
            method = %request.method,
            path = %request.route(),
            status = status.as_u16(),
            "Request rejected by backend"
        );

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ClientError::CredentialExpired);
        }

        Err(ClientError::Api {
            status: status.as_u16(),
            message: error_message(&body, status),
        })
    }

    /// True if `GET path` answers 2xx. Used as a connectivity signal.
    pub async fn probe(&self, path: &str) -> bool {
        match self.send_with_token(&ApiRequest::get(path), None).await {
            Ok(_) => true,
            Err(e) => {
                trace!(error = %e, "Health probe failed");
                false
            }
        }
    }

    fn url_for(&self, path: &str) -> ClientResult<Url> {
        let joined = if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        };
        Ok(Url::parse(&joined)?)
    }

    fn map_transport(&self, err: reqwest::Error) -> ClientError {
        if err.is_timeout() {
            ClientError::Timeout(self.timeout.as_secs())
        } else {
            ClientError::Transport(err.to_string())
        }
    }
}

fn decode_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

/// Best human-readable message from an error body.
fn error_message(body: &Value, status: reqwest::StatusCode) -> String {
    let from_field = |v: &Value| {
        ["message", "error", "detail"]
            .iter()
            .find_map(|k| v.get(*k).and_then(Value::as_str).map(str::to_string))
    };

    match body {
        Value::String(text) if !text.is_empty() => text.clone(),
        Value::Object(_) => from_field(body)
            .or_else(|| body.get("data").and_then(from_field))
            .unwrap_or_else(|| status.to_string()),
        _ => status.to_string(),
    }
}
