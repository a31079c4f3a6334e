//! Configuration management for the ticketing service.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Malformed values are errors rather than silently replaced by defaults.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Allows running without `JWT_SECRET` using a fixed development secret.
pub const INSECURE_DEV_SECRET_FLAG: &str = "HORIZON_ALLOW_INSECURE_DEV_SECRET";

const DEV_JWT_SECRET: &str = "horizon-insecure-dev-secret";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Application configuration.
#[derive(Debug, Clone, Serialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    /// `None` runs the service on the in-memory store.
    pub database: Option<DatabaseConfig>,
    pub auth: AuthConfig,
    pub reaper: ReaperConfig,
    /// `json` or `pretty`.
    pub log_format: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseConfig {
    #[serde(skip)]
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthConfig {
    #[serde(skip)]
    pub jwt_secret: String,
    /// The secret is the built-in development value.
    pub insecure_dev_secret: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReaperConfig {
    pub interval_secs: u64,
}

impl ReaperConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl AppConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns the raw value of a key.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let server = ServerConfig {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&get, "PORT", 8080)?,
        };

        let database = match get("DATABASE_URL") {
            Some(url) => Some(DatabaseConfig {
                url,
                max_connections: parse_or(&get, "DATABASE_MAX_CONNECTIONS", 10)?,
                acquire_timeout_secs: parse_or(&get, "DATABASE_ACQUIRE_TIMEOUT_SECS", 30)?,
            }),
            None => None,
        };

        let insecure_allowed = parse_or(&get, INSECURE_DEV_SECRET_FLAG, false)?;
        let auth = match get("JWT_SECRET") {
            Some(jwt_secret) => AuthConfig {
                jwt_secret,
                insecure_dev_secret: false,
            },
            None if insecure_allowed => AuthConfig {
                jwt_secret: DEV_JWT_SECRET.to_string(),
                insecure_dev_secret: true,
            },
            None => return Err(ConfigError::Missing("JWT_SECRET")),
        };

        let interval_secs: u64 = parse_or(&get, "REAPER_INTERVAL_SECS", 3600)?;
        if interval_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "REAPER_INTERVAL_SECS",
                value: "0".to_string(),
            });
        }

        let log_format = get("LOG_FORMAT").unwrap_or_else(|| "json".to_string());
        if !matches!(log_format.as_str(), "json" | "pretty") {
            return Err(ConfigError::Invalid {
                key: "LOG_FORMAT",
                value: log_format,
            });
        }

        Ok(Self {
            server,
            database,
            auth,
            reaper: ReaperConfig { interval_secs },
            log_format,
        })
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(default),
    }
}
