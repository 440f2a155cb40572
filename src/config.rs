//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Secret used when none is configured. Only suitable for local development.
pub const DEV_JWT_SECRET: &str = "dev-secret-key-change-me";

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub realtime: RealtimeConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// API server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Allowed CORS origins; empty means permissive
    #[serde(default)]
    pub cors_origins: Vec<String>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    5
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(),
                "http://127.0.0.1:3000".to_string(),
                "http://127.0.0.1:5173".to_string(),
            ],
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl ApiConfig {
    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Deadline for store lookups made while serving a request
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Document store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

fn default_database_path() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("chatline").join("chat.db").to_string_lossy().to_string())
        .unwrap_or_else(|| "./chatline_data/chat.db".to_string())
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Bearer token verification
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
}

fn default_jwt_secret() -> String {
    DEV_JWT_SECRET.to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
        }
    }
}

impl AuthConfig {
    pub fn uses_dev_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }
}

/// Real-time push channel configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    /// Outbound queue capacity per connection
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Idle time before a keep-alive ping is sent
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Deadline for writing one event frame
    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,

    /// Deadline for writing a ping frame
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout_secs: u64,

    /// Soft limit on concurrently joined connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_queue_capacity() -> usize {
    32
}

fn default_idle_timeout() -> u64 {
    25
}

fn default_write_timeout() -> u64 {
    10
}

fn default_ping_timeout() -> u64 {
    5
}

fn default_max_connections() -> usize {
    10_000
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            idle_timeout_secs: default_idle_timeout(),
            write_timeout_secs: default_write_timeout(),
            ping_timeout_secs: default_ping_timeout(),
            max_connections: default_max_connections(),
        }
    }
}

impl RealtimeConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout_secs)
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

impl LoggingConfig {
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
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
            dirs::config_dir().map(|p| p.join("chatline").join("config.toml")),
            Some(PathBuf::from("/etc/chatline/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        // API overrides
        if let Some(host) = var("CHATLINE_API_HOST") {
            self.api.host = host;
        }
        if let Some(port) = var("CHATLINE_API_PORT").and_then(|p| p.parse().ok()) {
            self.api.port = port;
        }

        // Store overrides
        if let Some(path) = var("CHATLINE_DATABASE_PATH") {
            self.store.database_path = path;
        }

        // Auth overrides
        if let Some(secret) = var("CHATLINE_JWT_SECRET").or_else(|| var("JWT_SECRET")) {
            if !secret.is_empty() {
                self.auth.jwt_secret = secret;
            }
        }

        // Real-time overrides
        if let Some(n) = var("CHATLINE_WS_QUEUE_CAPACITY").and_then(|v| v.parse().ok()) {
            self.realtime.queue_capacity = n;
        }
        if let Some(secs) = var("CHATLINE_WS_IDLE_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.realtime.idle_timeout_secs = secs;
        }

        // Logging overrides
        if let Some(level) = var("CHATLINE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("CHATLINE_LOG_FORMAT") {
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
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Chatline Configuration
#
# Environment variables override these settings:
# - CHATLINE_API_HOST
# - CHATLINE_API_PORT
# - CHATLINE_DATABASE_PATH
# - CHATLINE_JWT_SECRET (or JWT_SECRET)
# - CHATLINE_WS_QUEUE_CAPACITY
# - CHATLINE_WS_IDLE_TIMEOUT_SECS
# - CHATLINE_LOG_LEVEL
# - CHATLINE_LOG_FORMAT

[api]
# API server host
host = "0.0.0.0"

# API server port
port = 8080

# Allowed CORS origins (empty list allows any origin)
cors_origins = ["http://localhost:3000", "http://localhost:5173"]

# Request timeout in seconds (REST handlers only)
request_timeout_secs = 5

[store]
# SQLite database file
database_path = "./chatline_data/chat.db"

[auth]
# HS256 secret shared with the token issuer
jwt_secret = "dev-secret-key-change-me"

[realtime]
# Outbound queue capacity per connection; a full queue disconnects the client
queue_capacity = 32

# Seconds without traffic before a keep-alive ping is sent
idle_timeout_secs = 25

# Deadline for writing one event (seconds)
write_timeout_secs = 10

# Deadline for writing a ping (seconds)
ping_timeout_secs = 5

# Soft limit on concurrent connections
max_connections = 10000

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
