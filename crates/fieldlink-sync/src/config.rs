//! # Client Configuration
//!
//! Configuration management for the API client.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     FIELDLINK_API_URL=https://api.example.com/v1                       │
//! │     FIELDLINK_MAX_RETRIES=5                                            │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/fieldlink/client.toml (Linux)                            │
//! │     ~/Library/Application Support/com.fieldlink.agent/client.toml      │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [api]
//! base_url = "https://api.example.com/v1"
//! timeout_secs = 15
//!
//! [auth]
//! refresh_path = "/auth/refresh"
//!
//! [cache]
//! default_ttl_secs = 300
//!
//! [queue]
//! max_retries = 3
//!
//! [network]
//! probe_enabled = true
//! probe_path = "/health"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{ClientError, ClientResult};

// =============================================================================
// API Settings
// =============================================================================

/// Where and how requests are sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    /// Backend base URL. Request paths are appended to it.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout (seconds).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// User-Agent header value.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_base_url() -> String {
    "http://localhost:5000/api".to_string()
}

fn default_timeout() -> u64 {
    15
}

fn default_user_agent() -> String {
    format!("fieldlink-agent/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for ApiSettings {
    fn default() -> Self {
        ApiSettings {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

// =============================================================================
// Auth Settings
// =============================================================================

/// Authentication-lifecycle endpoints.
///
/// Requests to any of these paths never trigger a token refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSettings {
    #[serde(default = "default_login_path")]
    pub login_path: String,

    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,

    #[serde(default = "default_logout_path")]
    pub logout_path: String,
}

fn default_login_path() -> String {
    "/auth/login".to_string()
}

fn default_refresh_path() -> String {
    "/auth/refresh".to_string()
}

fn default_logout_path() -> String {
    "/auth/logout".to_string()
}

impl Default for AuthSettings {
    fn default() -> Self {
        AuthSettings {
            login_path: default_login_path(),
            refresh_path: default_refresh_path(),
            logout_path: default_logout_path(),
        }
    }
}

impl AuthSettings {
    /// All paths excluded from the refresh flow.
    pub fn lifecycle_paths(&self) -> Vec<String> {
        vec![
            self.login_path.clone(),
            self.refresh_path.clone(),
            self.logout_path.clone(),
        ]
    }
}

// =============================================================================
// Cache Settings
// =============================================================================

/// TTL cache behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// TTL used when a caller doesn't pass one (seconds).
    #[serde(default = "default_cache_ttl")]
    pub default_ttl_secs: u64,

    /// Key prefix for cached entries.
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

fn default_cache_ttl() -> u64 {
    300
}

fn default_namespace() -> String {
    fieldlink_store::DEFAULT_NAMESPACE.to_string()
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings {
            default_ttl_secs: default_cache_ttl(),
            namespace: default_namespace(),
        }
    }
}

// =============================================================================
// Queue Settings
// =============================================================================

/// Offline action queue behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSettings {
    /// Failed replays after which an action is dropped.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// How long the persisted queue survives without being rewritten (hours).
    #[serde(default = "default_retention")]
    pub retention_hours: u64,
}

fn default_max_retries() -> u32 {
    fieldlink_core::DEFAULT_MAX_RETRIES
}

fn default_retention() -> u64 {
    24 * 30
}

impl Default for QueueSettings {
    fn default() -> Self {
        QueueSettings {
            max_retries: default_max_retries(),
            retention_hours: default_retention(),
        }
    }
}

// =============================================================================
// Network Settings
// =============================================================================

/// Optional health probe used as a connectivity signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSettings {
    /// Poll the health endpoint. Off by default: the platform signal is
    /// normally fed through `report`.
    #[serde(default)]
    pub probe_enabled: bool,

    #[serde(default = "default_probe_path")]
    pub probe_path: String,

    /// Poll interval while online (seconds).
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,

    /// Cap for the backed-off interval while offline (seconds).
    #[serde(default = "default_probe_max_interval")]
    pub probe_max_interval_secs: u64,
}

fn default_probe_path() -> String {
    "/health".to_string()
}

fn default_probe_interval() -> u64 {
    30
}

fn default_probe_max_interval() -> u64 {
    300
}

impl Default for NetworkSettings {
    fn default() -> Self {
        NetworkSettings {
            probe_enabled: false,
            probe_path: default_probe_path(),
            probe_interval_secs: default_probe_interval(),
            probe_max_interval_secs: default_probe_max_interval(),
        }
    }
}

// =============================================================================
// Storage Settings
// =============================================================================

/// On-device persistence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    /// SQLite file. `None` means the platform data directory.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

// =============================================================================
// Main Client Configuration
// =============================================================================

/// Complete client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub api: ApiSettings,

    #[serde(default)]
    pub auth: AuthSettings,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub queue: QueueSettings,

    #[serde(default)]
    pub network: NetworkSettings,

    #[serde(default)]
    pub storage: StorageSettings,
}

impl ClientConfig {
    /// Creates a config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a default config pointed at `base_url`.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let mut config = Self::default();
        config.api.base_url = base_url.into();
        config
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (client.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ClientResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading client config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load client config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> ClientResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| ClientError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ClientError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| ClientError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Client config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ClientResult<()> {
        let base = &self.api.base_url;
        if !base.starts_with("http://") && !base.starts_with("https://") {
            return Err(ClientError::InvalidUrl(format!(
                "Base URL must start with http:// or https://, got: {}",
                base
            )));
        }
        url::Url::parse(base)?;

        if self.api.timeout_secs == 0 {
            return Err(ClientError::InvalidConfig(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if self.queue.max_retries == 0 {
            return Err(ClientError::InvalidConfig(
                "max_retries must be greater than 0".into(),
            ));
        }

        for path in self.auth.lifecycle_paths() {
            if !path.starts_with('/') {
                return Err(ClientError::InvalidConfig(format!(
                    "auth paths must start with '/', got: {}",
                    path
                )));
            }
        }

        // Cache clear and purge work by prefix; they must not match the
        // action list or the stored session.
        let namespace = &self.cache.namespace;
        if [
            fieldlink_store::ACTION_QUEUE_KEY,
            fieldlink_store::credentials::ACCESS_TOKEN_KEY,
            fieldlink_store::credentials::REFRESH_TOKEN_KEY,
        ]
        .iter()
        .any(|key| key.starts_with(namespace.as_str()))
        {
            return Err(ClientError::InvalidConfig(format!(
                "cache namespace {:?} overlaps a reserved key",
                namespace
            )));
        }

        if self.network.probe_interval_secs == 0
            || self.network.probe_max_interval_secs < self.network.probe_interval_secs
        {
            return Err(ClientError::InvalidConfig(
                "probe_max_interval_secs must be >= probe_interval_secs > 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("FIELDLINK_API_URL") {
            debug!(url = %url, "Overriding base URL from environment");
            self.api.base_url = url;
        }

        if let Ok(timeout) = std::env::var("FIELDLINK_TIMEOUT_SECS") {
            match timeout.parse::<u64>() {
                Ok(t) => self.api.timeout_secs = t,
                Err(_) => warn!(value = %timeout, "Ignoring invalid FIELDLINK_TIMEOUT_SECS"),
            }
        }

        if let Ok(retries) = std::env::var("FIELDLINK_MAX_RETRIES") {
            if let Ok(r) = retries.parse::<u32>() {
                debug!(max_retries = r, "Overriding max retries from environment");
                self.queue.max_retries = r;
            }
        }

        if let Ok(ttl) = std::env::var("FIELDLINK_CACHE_TTL_SECS") {
            if let Ok(t) = ttl.parse::<u64>() {
                self.cache.default_ttl_secs = t;
            }
        }

        if let Ok(probe) = std::env::var("FIELDLINK_HEALTH_PROBE") {
            match probe.to_lowercase().as_str() {
                "1" | "true" | "on" => self.network.probe_enabled = true,
                "0" | "false" | "off" => self.network.probe_enabled = false,
                _ => warn!(value = %probe, "Unknown FIELDLINK_HEALTH_PROBE value"),
            }
        }

        if let Ok(path) = std::env::var("FIELDLINK_DB_PATH") {
            self.storage.database_path = Some(PathBuf::from(path));
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "fieldlink", "agent")
            .map(|dirs| dirs.config_dir().join("client.toml"))
    }

    /// Returns the default SQLite file path.
    pub fn default_database_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "fieldlink", "agent")
            .map(|dirs| dirs.data_dir().join("fieldlink.db"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.default_ttl_secs)
    }

    pub fn queue_retention(&self) -> Duration {
        Duration::from_secs(self.queue.retention_hours.saturating_mul(3600))
    }

    /// Resolved database path: configured, else platform default.
    pub fn database_path(&self) -> Option<PathBuf> {
        self.storage
            .database_path
            .clone()
            .or_else(Self::default_database_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.api.timeout_secs, 15);
        assert_eq!(config.auth.refresh_path, "/auth/refresh");
        assert_eq!(config.cache.namespace, "cache:");
        assert_eq!(config.queue.max_retries, 3);
        assert!(!config.network.probe_enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = ClientConfig::default();

        config.api.base_url = "ftp://example.com".to_string();
        assert!(matches!(config.validate(), Err(ClientError::InvalidUrl(_))));

        config.api.base_url = "https://api.example.com/v1".to_string();
        config.api.timeout_secs = 0;
        assert!(config.validate().is_err());

        config.api.timeout_secs = 10;
        config.auth.refresh_path = "auth/refresh".to_string();
        assert!(config.validate().is_err());

        config.auth.refresh_path = "/auth/refresh".to_string();
        config.network.probe_max_interval_secs = 1;
        assert!(config.validate().is_err());

        config.network.probe_max_interval_secs = 300;
        assert!(config.validate().is_ok());

        for namespace in ["", "queue:", "auth:"] {
            config.cache.namespace = namespace.to_string();
            assert!(matches!(config.validate(), Err(ClientError::InvalidConfig(_))));
        }
        config.cache.namespace = "responses:".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: ClientConfig = toml::from_str(
            r#"
            [api]
            base_url = "https://api.example.com/v1"

            [queue]
            max_retries = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.api.base_url, "https://api.example.com/v1");
        assert_eq!(config.api.timeout_secs, 15);
        assert_eq!(config.queue.max_retries, 5);
        assert_eq!(config.auth.login_path, "/auth/login");
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("client.toml");

        let mut config = ClientConfig::with_base_url("https://api.example.com/v1");
        config.cache.default_ttl_secs = 42;
        config.save(Some(path.clone())).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[api]"));
        assert!(contents.contains("[queue]"));

        let loaded: ClientConfig = toml::from_str(&contents).unwrap();
        assert_eq!(loaded.cache.default_ttl_secs, 42);
        assert_eq!(loaded.api.base_url, "https://api.example.com/v1");
    }

    #[test]
    fn test_durations() {
        let config = ClientConfig::default();
        assert_eq!(config.timeout(), Duration::from_secs(15));
        assert_eq!(config.queue_retention(), Duration::from_secs(720 * 3600));
    }
}
