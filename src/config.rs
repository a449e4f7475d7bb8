//! Configuration module for MinuTAG.
//!
//! Settings come from an optional TOML file and are then overridden by
//! environment variables, which is how the service is usually deployed.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::{MinutagError, Result};

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum accepted request body in bytes (larger bodies get 413).
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_max_body_bytes() -> usize {
    5 * 1024 * 1024 // 5MB
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Admission control for outbound Drive calls.
#[derive(Debug, Clone, Deserialize)]
pub struct AdmissionConfig {
    /// Maximum number of uploads talking to Drive at once.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Maximum number of uploads waiting for a slot.
    #[serde(default = "default_max_queue")]
    pub max_queue: usize,
    /// Retry hint sent with 429/503 responses.
    #[serde(default = "default_retry_after")]
    pub retry_after_secs: u64,
    /// How long a queued upload may wait for a slot (0 = no limit).
    #[serde(default)]
    pub queue_timeout_secs: u64,
}

fn default_max_concurrency() -> usize {
    5
}

fn default_max_queue() -> usize {
    50
}

fn default_retry_after() -> u64 {
    3
}

impl AdmissionConfig {
    /// Queue wait timeout, if one is configured.
    pub fn queue_timeout(&self) -> Option<Duration> {
        (self.queue_timeout_secs > 0).then(|| Duration::from_secs(self.queue_timeout_secs))
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            max_queue: default_max_queue(),
            retry_after_secs: default_retry_after(),
            queue_timeout_secs: 0,
        }
    }
}

/// Which remote storage implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DriveBackend {
    /// Google Drive v3 over HTTPS.
    #[default]
    Google,
    /// Process-local storage, nothing leaves the machine.
    Memory,
}

/// Google Drive configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DriveConfig {
    /// Storage backend.
    #[serde(default)]
    pub backend: DriveBackend,
    /// Folder under which the owner folders are created.
    #[serde(default)]
    pub root_folder_id: String,
    /// OAuth2 client ID (refresh-token flow).
    #[serde(default)]
    pub client_id: String,
    /// OAuth2 client secret (refresh-token flow).
    #[serde(default)]
    pub client_secret: String,
    /// OAuth2 refresh token (refresh-token flow).
    #[serde(default)]
    pub refresh_token: String,
    /// Path to a service-account JSON key (takes precedence when set).
    #[serde(default)]
    pub service_account_key_path: String,
    /// Drive REST endpoint.
    #[serde(default = "default_api_base")]
    pub api_base_url: String,
    /// Drive upload endpoint.
    #[serde(default = "default_upload_base")]
    pub upload_base_url: String,
    /// OAuth token endpoint.
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Total request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_api_base() -> String {
    "https://www.googleapis.com/drive/v3".to_string()
}

fn default_upload_base() -> String {
    "https://www.googleapis.com/upload/drive/v3".to_string()
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    60
}

impl DriveConfig {
    /// Whether all three refresh-token fields are present.
    pub fn has_refresh_token(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty() && !self.refresh_token.is_empty()
    }

    /// Whether a service-account key path is configured.
    pub fn has_service_account(&self) -> bool {
        !self.service_account_key_path.is_empty()
    }

    /// Whether the service has everything it needs to reach Drive.
    pub fn is_complete(&self) -> bool {
        match self.backend {
            DriveBackend::Memory => true,
            DriveBackend::Google => {
                !self.root_folder_id.is_empty()
                    && (self.has_service_account() || self.has_refresh_token())
            }
        }
    }
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            backend: DriveBackend::default(),
            root_folder_id: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            refresh_token: String::new(),
            service_account_key_path: String::new(),
            api_base_url: default_api_base(),
            upload_base_url: default_upload_base(),
            token_uri: default_token_uri(),
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file (empty = console only).
    #[serde(default)]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: String::new(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Admission control configuration.
    #[serde(default)]
    pub admission: AdmissionConfig,
    /// Google Drive configuration.
    #[serde(default)]
    pub drive: DriveConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(MinutagError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    ///
    /// A missing file is not an error: the defaults are used instead.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = if path.as_ref().exists() {
            Self::load(path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| MinutagError::Config(format!("config parse error: {e}")))
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides using the given variable lookup.
    ///
    /// Supported variables:
    /// - `HOST`, `PORT`, `MAX_BODY_BYTES`
    /// - `MAX_DRIVE_CONCURRENCY`, `MAX_QUEUE`, `RETRY_AFTER_SECONDS`, `QUEUE_TIMEOUT_SECONDS`
    /// - `GDRIVE_CLIENT_ID`, `GDRIVE_CLIENT_SECRET`, `GDRIVE_REFRESH_TOKEN`
    /// - `GDRIVE_SERVICE_ACCOUNT_KEY`, `GDRIVE_FOLDER_ID`
    /// - `LOG_LEVEL`
    ///
    /// Empty values and numbers that fail to parse are ignored.
    pub fn apply_env_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("HOST") {
            self.server.host = v;
        }
        if let Some(v) = get("PORT").and_then(|v| v.trim().parse().ok()) {
            self.server.port = v;
        }
        if let Some(v) = get("MAX_BODY_BYTES").and_then(|v| v.trim().parse().ok()) {
            self.server.max_body_bytes = v;
        }

        if let Some(v) = get("MAX_DRIVE_CONCURRENCY").and_then(|v| v.trim().parse().ok()) {
            self.admission.max_concurrency = v;
        }
        if let Some(v) = get("MAX_QUEUE").and_then(|v| v.trim().parse().ok()) {
            self.admission.max_queue = v;
        }
        if let Some(v) = get("RETRY_AFTER_SECONDS").and_then(|v| v.trim().parse().ok()) {
            self.admission.retry_after_secs = v;
        }
        if let Some(v) = get("QUEUE_TIMEOUT_SECONDS").and_then(|v| v.trim().parse().ok()) {
            self.admission.queue_timeout_secs = v;
        }

        if let Some(v) = get("GDRIVE_CLIENT_ID") {
            self.drive.client_id = v;
        }
        if let Some(v) = get("GDRIVE_CLIENT_SECRET") {
            self.drive.client_secret = v;
        }
        if let Some(v) = get("GDRIVE_REFRESH_TOKEN") {
            self.drive.refresh_token = v;
        }
        if let Some(v) = get("GDRIVE_SERVICE_ACCOUNT_KEY") {
            self.drive.service_account_key_path = v;
        }
        if let Some(v) = get("GDRIVE_FOLDER_ID") {
            self.drive.root_folder_id = v;
        }

        if let Some(v) = get("LOG_LEVEL") {
            self.logging.level = v;
        }
    }

    /// Validate the configuration.
    ///
    /// Missing Drive credentials are not an error here; the server starts
    /// and answers uploads with a configuration error instead.
    pub fn validate(&self) -> Result<()> {
        if self.admission.max_concurrency == 0 {
            return Err(MinutagError::Config(
                "admission.max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.server.max_body_bytes == 0 {
            return Err(MinutagError::Config(
                "server.max_body_bytes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
