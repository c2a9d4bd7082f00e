//! # Client Error Types
//!
//! Error types for the resilient API client.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Client Error Categories                           │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │ Authentication  │  │   Transient network     │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │ CredentialExp.  │  │  Transport              │ │
//! │  │  InvalidUrl     │  │ RefreshFailed   │  │  Timeout                │ │
//! │  │  ConfigLoad/Save│  │                 │  │  Api (5xx, 408, 429)    │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Offline queue  │  │    Payload      │  │      Internal           │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  PermanentAction│  │  Validation     │  │  Storage                │ │
//! │  │  Failure        │  │  Serialization  │  │  ChannelError           │ │
//! │  │  ActionDiscarded│  │  Deserialization│  │  ShuttingDown           │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Propagation Policy
//! - Authentication errors always reach the caller, who decides whether to
//!   prompt a new login.
//! - Storage errors are absorbed by the cache and credential store. The
//!   offline queue surfaces them as `Storage` so a failed read is never
//!   written back as an empty list.
//! - Offline-queue execution errors become retry counts, then a terminal
//!   `ActionDropped` event carrying `PermanentActionFailure`.

use thiserror::Error;

/// Result type alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Every failure the API client can report.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid client configuration.
    #[error("Invalid client configuration: {0}")]
    InvalidConfig(String),

    /// Invalid base URL or request path.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Authentication Errors
    // =========================================================================
    /// The backend rejected the credential and a fresh one did not help.
    ///
    /// ## When This Occurs
    /// - A replay after a successful refresh got 401 again
    /// - A login/refresh/logout endpoint answered 401
    #[error("Credential expired")]
    CredentialExpired,

    /// The single-flight refresh attempt did not yield a new credential pair.
    ///
    /// ## When This Occurs
    /// - No stored refresh credential
    /// - Network error or non-2xx from the refresh endpoint
    /// - Response missing either token
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    // =========================================================================
    // Transient Network Errors
    // =========================================================================
    /// The request never got an HTTP response.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The request exceeded the configured timeout.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// The device is offline and nothing usable is cached for this path.
    #[error("Offline with no cached data for {0}")]
    Offline(String),

    // =========================================================================
    // Backend Errors
    // =========================================================================
    /// Non-2xx response other than an intercepted 401.
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    // =========================================================================
    // Offline Queue Errors
    // =========================================================================
    /// An offline action exhausted its retries and was dropped.
    #[error("Action {action_id} dropped after {attempts} failed attempts: {last_error}")]
    PermanentActionFailure {
        action_id: String,
        attempts: u32,
        last_error: String,
    },

    /// An offline action was removed without replay (retention elapsed, or
    /// discarded on request).
    #[error("Action {action_id} discarded: {reason}")]
    ActionDiscarded { action_id: String, reason: String },

    // =========================================================================
    // Payload Errors
    // =========================================================================
    /// Action payload rejected before queueing.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Failed to encode a request body.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// Failed to decode a response body.
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Persistence failed during setup or on the offline action list.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// The client is shutting down.
    #[error("Client is shutting down")]
    ShuttingDown,

    /// Internal client error.
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<fieldlink_store::StoreError> for ClientError {
    fn from(err: fieldlink_store::StoreError) -> Self {
        ClientError::Storage(err.to_string())
    }
}

impl From<fieldlink_core::ValidationError> for ClientError {
    fn from(err: fieldlink_core::ValidationError) -> Self {
        ClientError::Validation(err.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::SerializationFailed(err.to_string())
    }
}

impl From<url::ParseError> for ClientError {
    fn from(err: url::ParseError) -> Self {
        ClientError::InvalidUrl(err.to_string())
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for ClientError {
    fn from(err: toml::de::Error) -> Self {
        ClientError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for ClientError {
    fn from(err: toml::ser::Error) -> Self {
        ClientError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl ClientError {
    /// Returns true if retrying the same call later may succeed.
    ///
    /// ## Transient Errors
    /// - Transport failures and timeouts
    /// - 5xx, 408 Request Timeout, 429 Too Many Requests
    ///
    /// ## Non-Transient Errors
    /// - Authentication failures
    /// - Other 4xx (the backend rejected the request itself)
    /// - Configuration and payload errors
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Transport(_) | ClientError::Timeout(_) | ClientError::Offline(_) => true,
            ClientError::Api { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            _ => false,
        }
    }

    /// Returns true if the caller should treat the session as unusable.
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            ClientError::CredentialExpired | ClientError::RefreshFailed(_)
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            ClientError::InvalidConfig(_)
                | ClientError::InvalidUrl(_)
                | ClientError::ConfigLoadFailed(_)
                | ClientError::ConfigSaveFailed(_)
        )
    }
}
