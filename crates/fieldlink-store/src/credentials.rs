//! # Credential Store
//!
//! Persists the session token pair under `auth:access_token` and
//! `auth:refresh_token`. Like the cache, it never surfaces storage errors:
//! a failed write is logged and the in-memory session keeps working.

use std::sync::Arc;

use fieldlink_core::Credentials;
use tracing::{debug, warn};

use crate::kv::KeyValueStore;

pub const ACCESS_TOKEN_KEY: &str = "auth:access_token";
pub const REFRESH_TOKEN_KEY: &str = "auth:refresh_token";

/// Typed view over the `auth:` keys.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    store: Arc<dyn KeyValueStore>,
}

impl CredentialStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Loads the stored pair. Both tokens must be present.
    pub async fn load(&self) -> Option<Credentials> {
        let access_token = self.read(ACCESS_TOKEN_KEY).await?;
        let refresh_token = self.read(REFRESH_TOKEN_KEY).await?;
        Some(Credentials {
            access_token,
            refresh_token,
        })
    }

    /// Returns only the stored refresh token.
    pub async fn refresh_token(&self) -> Option<String> {
        self.read(REFRESH_TOKEN_KEY).await
    }

    /// Returns only the stored access token.
    pub async fn access_token(&self) -> Option<String> {
        self.read(ACCESS_TOKEN_KEY).await
    }

    /// Persists both tokens.
    pub async fn save(&self, credentials: &Credentials) {
        self.write(ACCESS_TOKEN_KEY, &credentials.access_token).await;
        self.write(REFRESH_TOKEN_KEY, &credentials.refresh_token).await;
        debug!("Credentials persisted");
    }

    /// Removes both tokens.
    pub async fn clear(&self) {
        for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY] {
            if let Err(e) = self.store.remove(key).await {
                warn!(key, error = %e, "Failed to clear credential");
            }
        }
        debug!("Credentials cleared");
    }

    async fn read(&self, key: &str) -> Option<String> {
        match self.store.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str::<String>(&raw) {
                Ok(token) if !token.is_empty() => Some(token),
                Ok(_) => None,
                Err(e) => {
                    warn!(key, error = %e, "Stored credential is corrupt, ignoring");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key, error = %e, "Credential read failed");
                None
            }
        }
    }

    async fn write(&self, key: &str, token: &str) {
        let encoded = match serde_json::to_string(token) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(key, error = %e, "Credential not serializable");
                return;
            }
        };
        if let Err(e) = self.store.set(key, &encoded).await {
            warn!(key, error = %e, "Credential write failed");
        }
    }
}
