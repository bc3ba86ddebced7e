//! Server configuration loading from file and environment variables.

use axum::http::HeaderValue;
use nevira_voice::LiveKitConfig;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// LiveKit signing credentials and grant defaults.
    #[serde(default)]
    pub livekit: LiveKitConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// The single browser origin allowed to call the API.
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "nevira_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    3001
}

fn default_cors_origin() -> String {
    "http://localhost:5173".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// The LiveKit key pair is incomplete.
    #[error("LIVEKIT_API_KEY and LIVEKIT_API_SECRET must be set")]
    MissingCredentials,

    #[error("invalid CORS origin: {0:?}")]
    InvalidOrigin(String),
}

impl Config {
    /// Checks the settings the server cannot run without.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingCredentials` when either half of the
    /// LiveKit key pair is empty, and `ConfigError::InvalidOrigin` when the
    /// CORS origin is not a valid header value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.livekit.has_credentials() {
            return Err(ConfigError::MissingCredentials);
        }
        self.cors_origin()?;
        Ok(())
    }

    /// The configured CORS origin as a header value.
    pub fn cors_origin(&self) -> Result<HeaderValue, ConfigError> {
        let origin = self.server.cors_origin.trim();
        if origin.is_empty() || origin == "*" {
            return Err(ConfigError::InvalidOrigin(origin.to_string()));
        }
        HeaderValue::from_str(origin).map_err(|_| ConfigError::InvalidOrigin(origin.to_string()))
    }
}

/// Loads configuration from a TOML file, falling back to defaults, then
/// applies environment variable overrides.
///
/// Environment variable overrides:
/// - `LIVEKIT_API_KEY` / `LIVEKIT_API_SECRET` / `LIVEKIT_URL` override `livekit.*`
/// - `CORS_ORIGIN` overrides `server.cors_origin`
/// - `PORT` overrides `server.port`
/// - `NEVIRA_HOST` overrides `server.host`
/// - `NEVIRA_ROOM_NAME` overrides `livekit.room_name`
/// - `NEVIRA_TOKEN_TTL_SECONDS` overrides `livekit.token_ttl_seconds`
/// - `NEVIRA_LOG_LEVEL` overrides `logging.level`
/// - `NEVIRA_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Applies overrides from `lookup`, which maps a variable name to its value.
///
/// Unparseable numeric or address values are ignored.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(key) = lookup("LIVEKIT_API_KEY") {
        config.livekit.api_key = key;
    }
    if let Some(secret) = lookup("LIVEKIT_API_SECRET") {
        config.livekit.api_secret = secret;
    }
    if let Some(url) = lookup("LIVEKIT_URL") {
        config.livekit.url = url;
    }
    if let Some(origin) = lookup("CORS_ORIGIN") {
        config.server.cors_origin = origin;
    }
    if let Some(host) = lookup("NEVIRA_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = lookup("PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(room) = lookup("NEVIRA_ROOM_NAME") {
        if !room.trim().is_empty() {
            config.livekit.room_name = room;
        }
    }
    if let Some(ttl) = lookup("NEVIRA_TOKEN_TTL_SECONDS") {
        if let Ok(parsed) = ttl.parse() {
            config.livekit.token_ttl_seconds = parsed;
        }
    }
    if let Some(level) = lookup("NEVIRA_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("NEVIRA_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
}
