//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and `HUDDLE_*` environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::websocket::{ConnectionConfig, HubConfig};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub hub: HubConfig,

    #[serde(default)]
    pub connection: ConnectionConfig,

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

    /// Allowed CORS origins; empty allows any origin
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

impl ServerConfig {
    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Database location
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    #[serde(default = "default_database")]
    pub database: String,
}

fn default_data_dir() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("huddle").to_string_lossy().to_string())
        .unwrap_or_else(|| "./huddle_data".to_string())
}

fn default_database() -> String {
    "huddle.db".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database: default_database(),
        }
    }
}

impl StorageConfig {
    /// Data directory with a leading `~/` expanded
    pub fn data_dir(&self) -> PathBuf {
        match (self.data_dir.strip_prefix("~/"), dirs::home_dir()) {
            (Some(rest), Some(home)) => home.join(rest),
            _ => PathBuf::from(&self.data_dir),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir().join(&self.database)
    }
}

/// Token issuance settings
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC signing secret. When unset a random secret is generated and
    /// kept in the data directory.
    #[serde(default)]
    pub jwt_secret: Option<String>,

    #[serde(default = "default_token_ttl")]
    pub token_ttl_hours: i64,

    #[serde(default = "default_issuer")]
    pub issuer: String,
}

fn default_token_ttl() -> i64 {
    24
}

fn default_issuer() -> String {
    "huddle".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            token_ttl_hours: default_token_ttl(),
            issuer: default_issuer(),
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

    pub file: Option<String>,
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
            file: None,
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

        Self::parse(&content).map_err(|error| ConfigError::Parse {
            path: path.to_path_buf(),
            error,
        })
    }

    fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
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
            dirs::config_dir().map(|p| p.join("huddle").join("config.toml")),
            Some(PathBuf::from("/etc/huddle/config.toml")),
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

    /// Apply `HUDDLE_*` environment variable overrides
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        // Server overrides
        if let Some(host) = lookup("HUDDLE_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("HUDDLE_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }

        // Storage overrides
        if let Some(data_dir) = lookup("HUDDLE_DATA_DIR") {
            self.storage.data_dir = data_dir;
        }

        // Auth overrides
        if let Some(secret) = lookup("HUDDLE_JWT_SECRET").filter(|s| !s.is_empty()) {
            self.auth.jwt_secret = Some(secret);
        }

        // Hub overrides
        if let Some(echo) = lookup("HUDDLE_ECHO_TO_SENDER").and_then(|v| v.parse().ok()) {
            self.hub.echo_to_sender = echo;
        }

        // Logging overrides
        if let Some(level) = lookup("HUDDLE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("HUDDLE_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.connection.ping_interval_secs == 0 {
            return invalid("connection.ping_interval_secs must be positive");
        }
        if self.connection.ping_interval_secs >= self.connection.read_timeout_secs {
            return invalid("connection.ping_interval_secs must be less than read_timeout_secs");
        }
        if self.connection.write_timeout_secs == 0 {
            return invalid("connection.write_timeout_secs must be positive");
        }
        if self.connection.max_frame_bytes == 0 {
            return invalid("connection.max_frame_bytes must be positive");
        }
        if self.hub.command_capacity == 0 || self.hub.outbound_capacity == 0 {
            return invalid("hub capacities must be positive");
        }
        if self.hub.max_connections == 0 {
            return invalid("hub.max_connections must be positive");
        }
        if self.auth.token_ttl_hours <= 0 {
            return invalid("auth.token_ttl_hours must be positive");
        }
        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return invalid("logging.format must be 'pretty' or 'json'");
        }
        Ok(())
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
    r#"# Huddle Configuration
#
# Environment variables override these settings:
# - HUDDLE_HOST
# - HUDDLE_PORT
# - HUDDLE_DATA_DIR
# - HUDDLE_JWT_SECRET
# - HUDDLE_ECHO_TO_SENDER
# - HUDDLE_LOG_LEVEL
# - HUDDLE_LOG_FORMAT

[server]
# Server host
host = "0.0.0.0"

# Server port
port = 8080

# Allowed CORS origins (empty allows any origin)
cors_origins = ["http://localhost:3000"]

[storage]
# Directory for the database and generated signing key
data_dir = "~/.local/share/huddle"

# SQLite database file name
database = "huddle.db"

[auth]
# Token signing secret. Leave unset to generate one in data_dir.
# jwt_secret = "change-me"

# Token lifetime (hours)
token_ttl_hours = 24

# Token issuer
issuer = "huddle"

[hub]
# Queued hub commands before senders wait
command_capacity = 1024

# Queued outbound messages per connection before it is dropped
outbound_capacity = 256

# Deliver a message back to the connection that sent it
echo_to_sender = true

# Maximum concurrent WebSocket connections
max_connections = 10000

[connection]
# Largest accepted inbound frame (bytes)
max_frame_bytes = 4096

# Close a connection after this long without any inbound frame (seconds)
read_timeout_secs = 60

# Ping interval, must be less than read_timeout_secs (seconds)
ping_interval_secs = 54

# Upper bound on a single write (seconds)
write_timeout_secs = 10

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"

# Optional log file path
# file = "/var/log/huddle/huddle.log"
"#
    .to_string()
}
