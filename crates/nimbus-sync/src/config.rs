//! # Client Configuration
//!
//! Configuration management for the SDK client.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     NIMBUS_APP_KEY=kid_abc                                             │
//! │     NIMBUS_API_HOST=https://api.example.com                            │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/nimbus/nimbus.toml (Linux)                               │
//! │     ~/Library/Application Support/dev.nimbus.nimbus/nimbus.toml (macOS)│
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [app]
//! key = "kid_abc"
//! secret = "app-secret"
//!
//! [api]
//! host = "https://baas.nimbus.dev"
//! namespace = "appdata"
//! timeout_secs = 60
//!
//! [sync]
//! push_batch_size = 100
//! delta_fetch = false
//!
//! [storage]
//! path = "/var/lib/myapp/nimbus.db"
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// App Credentials
// =============================================================================

/// Application credentials issued by the backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application key; scopes every request and every local row.
    #[serde(default)]
    pub key: String,

    #[serde(default)]
    pub secret: String,

    /// Master secret, for trusted environments only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_secret: Option<String>,
}

// =============================================================================
// API Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    /// Base URL of the remote service.
    #[serde(default = "default_host")]
    pub host: String,

    /// REST namespace for collection data.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Default per-request timeout (seconds).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_host() -> String {
    "https://baas.nimbus.dev".to_string()
}

fn default_namespace() -> String {
    nimbus_core::DEFAULT_NAMESPACE.to_string()
}

fn default_timeout() -> u64 {
    60
}

impl Default for ApiSettings {
    fn default() -> Self {
        ApiSettings {
            host: default_host(),
            namespace: default_namespace(),
            timeout_secs: default_timeout(),
        }
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Pending operations pushed concurrently per batch.
    #[serde(default = "default_push_batch_size")]
    pub push_batch_size: usize,

    /// Fetch only changed entities on network reads.
    #[serde(default)]
    pub delta_fetch: bool,
}

fn default_push_batch_size() -> usize {
    100
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            push_batch_size: default_push_batch_size(),
            delta_fetch: false,
        }
    }
}

// =============================================================================
// Storage Settings
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    /// SQLite database file. `None` keeps the cache in memory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub app: AppConfig,

    #[serde(default)]
    pub api: ApiSettings,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub storage: StorageSettings,
}

impl ClientConfig {
    /// Creates a config for the given app credentials with defaults elsewhere.
    pub fn new(app_key: impl Into<String>, app_secret: impl Into<String>) -> Self {
        ClientConfig {
            app: AppConfig {
                key: app_key.into(),
                secret: app_secret.into(),
                master_secret: None,
            },
            ..Self::default()
        }
    }

    /// Sets the remote service base URL.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.api.host = host.into();
        self
    }

    pub fn master_secret(mut self, secret: impl Into<String>) -> Self {
        self.app.master_secret = Some(secret.into());
        self
    }

    pub fn push_batch_size(mut self, size: usize) -> Self {
        self.sync.push_batch_size = size;
        self
    }

    pub fn delta_fetch(mut self, enabled: bool) -> Self {
        self.sync.delta_fetch = enabled;
        self
    }

    pub fn storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage.path = Some(path.into());
        self
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (nimbus.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
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

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Client config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.app.key.trim().is_empty() {
            return Err(SyncError::InvalidConfig("app key must not be empty".into()));
        }

        let url = Url::parse(&self.api.host)?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(SyncError::InvalidUrl(format!(
                "API host must start with http:// or https://, got: {}",
                self.api.host
            )));
        }

        if self.api.namespace.trim().is_empty() {
            return Err(SyncError::InvalidConfig("namespace must not be empty".into()));
        }

        if self.sync.push_batch_size == 0 {
            return Err(SyncError::InvalidConfig(
                "push_batch_size must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("NIMBUS_APP_KEY") {
            debug!(app_key = %key, "Overriding app key from environment");
            self.app.key = key;
        }

        if let Ok(secret) = std::env::var("NIMBUS_APP_SECRET") {
            self.app.secret = secret;
        }

        if let Ok(secret) = std::env::var("NIMBUS_MASTER_SECRET") {
            self.app.master_secret = Some(secret);
        }

        if let Ok(host) = std::env::var("NIMBUS_API_HOST") {
            debug!(host = %host, "Overriding API host from environment");
            self.api.host = host;
        }

        if let Ok(timeout) = std::env::var("NIMBUS_TIMEOUT_SECS") {
            match timeout.parse::<u64>() {
                Ok(secs) => self.api.timeout_secs = secs,
                Err(_) => warn!(value = %timeout, "Ignoring invalid NIMBUS_TIMEOUT_SECS"),
            }
        }

        if let Ok(size) = std::env::var("NIMBUS_PUSH_BATCH_SIZE") {
            match size.parse::<usize>() {
                Ok(n) => self.sync.push_batch_size = n,
                Err(_) => warn!(value = %size, "Ignoring invalid NIMBUS_PUSH_BATCH_SIZE"),
            }
        }

        if let Ok(delta) = std::env::var("NIMBUS_DELTA_FETCH") {
            match delta.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.sync.delta_fetch = true,
                "0" | "false" | "no" | "off" => self.sync.delta_fetch = false,
                _ => warn!(value = %delta, "Unknown NIMBUS_DELTA_FETCH value"),
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "nimbus", "nimbus")
            .map(|dirs| dirs.config_dir().join("nimbus.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn app_key(&self) -> &str {
        &self.app.key
    }

    pub fn namespace(&self) -> &str {
        &self.api.namespace
    }

    /// Default per-request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }
}
