//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auth::{AuthenticatorConfig, IdentityConfig};
use crate::provider::ProviderConfig;
use crate::websocket::{IntervalPolicy, RegistryConfig, SchedulerConfig};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub provider: DataProviderConfig,

    #[serde(default)]
    pub realtime: RealtimeConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Allowed CORS origins; empty means permissive
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8082
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Handshake authentication configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Shared HS256 secret for bearer credentials
    #[serde(default)]
    pub jwt_secret: String,

    #[serde(default = "default_identity_url")]
    pub identity_url: String,

    #[serde(default = "default_identity_timeout")]
    pub identity_timeout_secs: u64,

    /// Domain suffixes stripped from resolved company scopes
    #[serde(default = "default_strip_suffixes")]
    pub strip_suffixes: Vec<String>,
}

fn default_identity_url() -> String {
    "http://localhost:9000".to_string()
}

fn default_identity_timeout() -> u64 {
    5
}

fn default_strip_suffixes() -> Vec<String> {
    vec![".com".to_string()]
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            identity_url: default_identity_url(),
            identity_timeout_secs: default_identity_timeout(),
            strip_suffixes: default_strip_suffixes(),
        }
    }
}

impl AuthConfig {
    pub fn identity_config(&self) -> IdentityConfig {
        IdentityConfig {
            base_url: self.identity_url.clone(),
            request_timeout_ms: self.identity_timeout_secs * 1000,
        }
    }

    pub fn authenticator_config(&self) -> AuthenticatorConfig {
        AuthenticatorConfig {
            identity_timeout: Duration::from_secs(self.identity_timeout_secs),
            strip_suffixes: self.strip_suffixes.clone(),
        }
    }
}

/// Time-series query layer configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DataProviderConfig {
    #[serde(default = "default_provider_url")]
    pub url: String,

    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
}

fn default_provider_url() -> String {
    "http://localhost:8086".to_string()
}

fn default_provider_timeout() -> u64 {
    10
}

impl Default for DataProviderConfig {
    fn default() -> Self {
        Self {
            url: default_provider_url(),
            timeout_secs: default_provider_timeout(),
        }
    }
}

impl DataProviderConfig {
    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            base_url: self.url.clone(),
            request_timeout_ms: self.timeout_secs * 1000,
        }
    }
}

/// Real-time delivery configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    /// Concurrent push ticks
    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_min_interval")]
    pub min_interval_secs: u64,

    #[serde(default = "default_max_interval")]
    pub max_interval_secs: u64,

    #[serde(default = "default_interval")]
    pub default_interval_secs: u64,

    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// A frame write stalled longer than this drops the session
    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u64,
}

fn default_workers() -> usize {
    10
}

fn default_min_interval() -> u64 {
    5
}

fn default_max_interval() -> u64 {
    60
}

fn default_interval() -> u64 {
    10
}

fn default_max_sessions() -> usize {
    10_000
}

fn default_send_timeout() -> u64 {
    10
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            min_interval_secs: default_min_interval(),
            max_interval_secs: default_max_interval(),
            default_interval_secs: default_interval(),
            max_sessions: default_max_sessions(),
            send_timeout_secs: default_send_timeout(),
        }
    }
}

impl RealtimeConfig {
    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            max_sessions: self.max_sessions,
            send_timeout: Duration::from_secs(self.send_timeout_secs),
        }
    }

    /// The fetch timeout comes from the provider section
    pub fn scheduler_config(&self, provider: &DataProviderConfig) -> SchedulerConfig {
        SchedulerConfig {
            workers: self.workers,
            fetch_timeout: Duration::from_secs(provider.timeout_secs),
        }
    }

    pub fn interval_policy(&self) -> IntervalPolicy {
        IntervalPolicy {
            min_secs: self.min_interval_secs,
            max_secs: self.max_interval_secs,
            default_secs: self.default_interval_secs,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("opspulse").join("config.toml")),
            Some(PathBuf::from("/etc/opspulse/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Check settings the server cannot run without
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.jwt_secret.is_empty() {
            return Err(ConfigError::Invalid(
                "auth.jwt_secret must be set (or OPSPULSE_JWT_SECRET)".to_string(),
            ));
        }

        let rt = &self.realtime;
        if rt.min_interval_secs == 0
            || rt.min_interval_secs > rt.max_interval_secs
            || !(rt.min_interval_secs..=rt.max_interval_secs).contains(&rt.default_interval_secs)
        {
            return Err(ConfigError::Invalid(format!(
                "realtime intervals must satisfy 0 < min ({}) <= default ({}) <= max ({})",
                rt.min_interval_secs, rt.default_interval_secs, rt.max_interval_secs
            )));
        }

        if rt.workers == 0 {
            return Err(ConfigError::Invalid("realtime.workers must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("OPSPULSE_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("OPSPULSE_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }

        if let Ok(secret) = std::env::var("OPSPULSE_JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Ok(url) = std::env::var("OPSPULSE_IDENTITY_URL") {
            self.auth.identity_url = url;
        }
        if let Ok(url) = std::env::var("OPSPULSE_PROVIDER_URL") {
            self.provider.url = url;
        }

        if let Ok(workers) = std::env::var("OPSPULSE_WORKERS") {
            if let Ok(w) = workers.parse() {
                self.realtime.workers = w;
            }
        }

        if let Ok(level) = std::env::var("OPSPULSE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("OPSPULSE_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# OpsPulse Configuration
#
# Environment variables override these settings:
# - OPSPULSE_HOST
# - OPSPULSE_PORT
# - OPSPULSE_JWT_SECRET
# - OPSPULSE_IDENTITY_URL
# - OPSPULSE_PROVIDER_URL
# - OPSPULSE_WORKERS
# - OPSPULSE_LOG_LEVEL
# - OPSPULSE_LOG_FORMAT

[server]
host = "0.0.0.0"
port = 8082

# Allowed CORS origins (empty = permissive)
cors_origins = []

[auth]
# Shared secret used to verify bearer credentials (HS256)
jwt_secret = ""

# Identity service resolving a caller's company scope
identity_url = "http://localhost:9000"
identity_timeout_secs = 5

# Suffixes stripped from resolved company scopes
strip_suffixes = [".com"]

[provider]
# Time-series query service
url = "http://localhost:8086"
timeout_secs = 10

[realtime]
# Push ticks allowed to run concurrently
workers = 10

# Subscription push interval bounds (seconds)
min_interval_secs = 5
max_interval_secs = 60
default_interval_secs = 10

# Maximum concurrent WebSocket sessions
max_sessions = 10000

# Drop a session whose frame write stalls longer than this
send_timeout_secs = 10

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
