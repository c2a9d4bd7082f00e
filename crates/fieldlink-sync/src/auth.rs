//! # Token Refresh Coordinator
//!
//! Wraps the HTTP client core and turns an expired credential into exactly
//! one refresh call, no matter how many requests fail at once.
//!
//! ## Single-Flight Refresh
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Concurrent 401 Handling                            │
//! │                                                                         │
//! │  req A ──► 401 ─┐                                                       │
//! │  req B ──► 401 ─┤   lock(state)                                         │
//! │  req C ──► 401 ─┤   ├── token already rotated? → replay with it         │
//! │                 │   ├── push waiter                                     │
//! │                 │   └── Idle? → Refreshing, spawn refresh task (once)   │
//! │                 │   unlock                                              │
//! │                 ▼                                                       │
//! │        ┌──────────────────────┐                                         │
//! │        │ POST /auth/refresh   │  (spawned; finishes even if every       │
//! │        │ {refresh_token: R1}  │   caller gives up)                      │
//! │        └──────────┬───────────┘                                         │
//! │                   │                                                     │
//! │          ok {T2,R2}        err                                          │
//! │           │                 │                                           │
//! │        persist              │                                           │
//! │           └────────┬────────┘                                           │
//! │                    ▼                                                    │
//! │   lock(state): set default (ok), take waiters, phase = Idle; unlock     │
//! │   send outcome to every waiter                                          │
//! │                    │                                                    │
//! │   A, B, C replay once with T2 (second 401 → CredentialExpired)          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The check-and-set of the phase happens under a `std::sync::Mutex` with no
//! `.await` inside, so two tasks on different worker threads cannot both
//! observe `Idle`.
//!
//! Requests to the login, refresh and logout endpoints never enter this flow.
//! A failed refresh never clears the session; callers decide whether to log
//! the agent out.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use fieldlink_core::Credentials;
use fieldlink_store::CredentialStore;
use futures_util::FutureExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::config::AuthSettings;
use crate::error::{ClientError, ClientResult};
use crate::http::{ApiRequest, ApiResponse, HttpClient};

type RefreshOutcome = Result<String, ClientError>;

// =============================================================================
// Refresh State
// =============================================================================

/// Whether a refresh call is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPhase {
    Idle,
    Refreshing,
}

#[derive(Debug)]
struct RefreshState {
    phase: RefreshPhase,
    waiters: Vec<oneshot::Sender<RefreshOutcome>>,
}

// =============================================================================
// TokenRefresher
// =============================================================================

/// Single-flight refresh coordinator. Cheap to clone.
#[derive(Debug, Clone)]
pub struct TokenRefresher {
    inner: Arc<RefresherInner>,
}

#[derive(Debug)]
struct RefresherInner {
    http: Arc<HttpClient>,
    credentials: CredentialStore,
    auth: AuthSettings,
    state: Mutex<RefreshState>,
    refresh_attempts: AtomicU64,
}

impl TokenRefresher {
    pub fn new(http: Arc<HttpClient>, credentials: CredentialStore, auth: AuthSettings) -> Self {
        Self {
            inner: Arc::new(RefresherInner {
                http,
                credentials,
                auth,
                state: Mutex::new(RefreshState {
                    phase: RefreshPhase::Idle,
                    waiters: Vec::new(),
                }),
                refresh_attempts: AtomicU64::new(0),
            }),
        }
    }

    pub fn http(&self) -> &Arc<HttpClient> {
        &self.inner.http
    }

    /// Current phase. Diagnostic only; it may change right after reading.
    pub fn phase(&self) -> RefreshPhase {
        self.inner.lock_state().phase
    }

    /// Number of refresh calls started since construction.
    pub fn refresh_attempts(&self) -> u64 {
        self.inner.refresh_attempts.load(Ordering::SeqCst)
    }

    /// Sends `request`, transparently refreshing once on an expired credential.
    ///
    /// ## Returns
    /// - The response of the first attempt, or of the single replay
    /// - `CredentialExpired` if the replay is rejected again, or if the
    ///   request targets an auth lifecycle endpoint
    /// - `RefreshFailed` if no new credential could be obtained
    pub async fn request(&self, request: &ApiRequest) -> ClientResult<ApiResponse> {
        let sent_with = self.inner.http.default_token();

        match self
            .inner
            .http
            .send_with_token(request, sent_with.as_deref())
            .await
        {
            Err(ClientError::CredentialExpired) if !self.is_lifecycle_path(request.route()) => {
                debug!(path = %request.route(), "Credential rejected, awaiting fresh token");
                let token = self.fresh_token(sent_with).await?;
                self.inner.http.send_with_token(request, Some(&token)).await
            }
            other => other,
        }
    }

    /// True for the login, refresh and logout endpoints and their sub-paths.
    ///
    /// Matching is per path segment: `/auth/refresh/` is excluded,
    /// `/auth/refreshments` is not.
    pub fn is_lifecycle_path(&self, route: &str) -> bool {
        let route = route.split('?').next().unwrap_or(route);
        [
            &self.inner.auth.login_path,
            &self.inner.auth.refresh_path,
            &self.inner.auth.logout_path,
        ]
        .iter()
        .any(|p| {
            let prefix = p.trim_end_matches('/');
            match route.strip_prefix(prefix) {
                Some(rest) => rest.is_empty() || rest.starts_with('/'),
                None => false,
            }
        })
    }

    /// Returns a token newer than `sent_with`, refreshing if none exists yet.
    async fn fresh_token(&self, sent_with: Option<String>) -> ClientResult<String> {
        let (rx, start) = {
            let mut state = self.inner.lock_state();

            if let Some(current) = self.inner.http.default_token() {
                if sent_with.as_deref() != Some(current.as_str()) {
                    debug!("Credential already rotated, replaying without refresh");
                    return Ok(current);
                }
            }

            let (tx, rx) = oneshot::channel();
            state.waiters.push(tx);

            let start = state.phase == RefreshPhase::Idle;
            if start {
                state.phase = RefreshPhase::Refreshing;
            }
            (rx, start)
        };

        if start {
            self.inner.refresh_attempts.fetch_add(1, Ordering::SeqCst);
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move { inner.run_refresh().await });
        }

        rx.await.unwrap_or_else(|_| {
            Err(ClientError::RefreshFailed(
                "refresh task ended without a result".into(),
            ))
        })
    }

    // =========================================================================
    // Session Lifecycle
    // =========================================================================

    /// Exchanges agent credentials for a token pair and stores it.
    pub async fn login(&self, identifier: &str, secret: &str) -> ClientResult<()> {
        let request = ApiRequest::post(
            self.inner.auth.login_path.clone(),
            json!({ "identifier": identifier, "password": secret }),
        );
        let response = self.inner.http.send_with_token(&request, None).await?;

        let credentials = parse_token_pair(&response.body).ok_or_else(|| {
            ClientError::DeserializationFailed("login response missing tokens".into())
        })?;

        self.set_credentials(&credentials).await;
        info!("Agent logged in");
        Ok(())
    }

    /// Ends the session: best-effort logout call, then local credentials are
    /// removed whether or not the backend answered.
    pub async fn logout(&self) {
        if let Some(refresh_token) = self.inner.credentials.refresh_token().await {
            let request = ApiRequest::post(
                self.inner.auth.logout_path.clone(),
                json!({ "refresh_token": refresh_token }),
            );
            if let Err(e) = self.inner.http.send(&request).await {
                debug!(error = %e, "Logout call failed, clearing local session anyway");
            }
        }

        self.inner.credentials.clear().await;
        self.inner.http.set_default_token(None);
        info!("Agent logged out");
    }

    /// Installs and persists a token pair.
    pub async fn set_credentials(&self, credentials: &Credentials) {
        self.inner.credentials.save(credentials).await;
        self.inner
            .http
            .set_default_token(Some(credentials.access_token.clone()));
    }

    /// Loads the persisted pair into the HTTP client. Returns whether a
    /// session was found.
    pub async fn restore_session(&self) -> bool {
        match self.inner.credentials.load().await {
            Some(credentials) => {
                self.inner
                    .http
                    .set_default_token(Some(credentials.access_token));
                debug!("Session restored from storage");
                true
            }
            None => false,
        }
    }

    pub fn current_access_token(&self) -> Option<String> {
        self.inner.http.default_token()
    }
}

impl RefresherInner {
    fn lock_state(&self) -> std::sync::MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Performs the refresh call and settles every waiter.
    async fn run_refresh(self: Arc<Self>) {
        let outcome = match AssertUnwindSafe(self.call_refresh_endpoint())
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(ClientError::RefreshFailed("refresh task panicked".into())),
        };

        if let Ok(credentials) = &outcome {
            self.credentials.save(credentials).await;
        }

        // Installing the token and returning to Idle share one critical
        // section: a 401 for the new token must start its own refresh.
        let (result, waiters) = {
            let mut state = self.lock_state();
            let result = outcome.map(|credentials| {
                self.http
                    .set_default_token(Some(credentials.access_token.clone()));
                credentials.access_token
            });
            state.phase = RefreshPhase::Idle;
            (result, std::mem::take(&mut state.waiters))
        };

        match &result {
            Ok(_) => info!(waiters = waiters.len(), "Token refreshed"),
            Err(e) => warn!(waiters = waiters.len(), error = %e, "Token refresh failed"),
        }

        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
    }

    async fn call_refresh_endpoint(&self) -> Result<Credentials, ClientError> {
        let refresh_token = self
            .credentials
            .refresh_token()
            .await
            .ok_or_else(|| ClientError::RefreshFailed("no refresh credential stored".into()))?;

        let request = ApiRequest::post(
            self.auth.refresh_path.clone(),
            json!({ "refresh_token": refresh_token }),
        );

        let response = self
            .http
            .send_with_token(&request, None)
            .await
            .map_err(|e| ClientError::RefreshFailed(e.to_string()))?;

        parse_token_pair(&response.body).ok_or_else(|| {
            ClientError::RefreshFailed("refresh response missing access or refresh token".into())
        })
    }
}

// =============================================================================
// Token Response Parsing
// =============================================================================

#[derive(Debug, Deserialize)]
struct TokenPairBody {
    #[serde(default, alias = "accessToken")]
    access_token: Option<String>,
    #[serde(default, alias = "refreshToken")]
    refresh_token: Option<String>,
}

/// Extracts a complete token pair from a login/refresh response.
///
/// Accepts snake_case or camelCase fields, at the top level or under `data`.
/// A pair with either token missing or empty is rejected.
fn parse_token_pair(body: &Value) -> Option<Credentials> {
    let candidate = body
        .get("data")
        .filter(|data| data.is_object())
        .unwrap_or(body);
    let pair: TokenPairBody = serde_json::from_value(candidate.clone()).ok()?;

    match (pair.access_token, pair.refresh_token) {
        (Some(access), Some(refresh)) if !access.is_empty() && !refresh.is_empty() => {
            Some(Credentials::new(access, refresh))
        }
        _ => None,
    }
}
