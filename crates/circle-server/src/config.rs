//! Server configuration loaded from `CIRCLE_*` environment variables.
//!
//! # Environment Variables
//!
//! | Variable | Default |
//! |---|---|
//! | `CIRCLE_BIND_ADDR` | `0.0.0.0:8080` |
//! | `CIRCLE_DB_PATH` | unset (in-memory database) |
//! | `CIRCLE_JWT_KEY` | development key, with a warning |
//! | `CIRCLE_TOKEN_TTL_SECS` | `7200` |
//! | `CIRCLE_OUTBOUND_CAPACITY` | `256` |
//! | `CIRCLE_CLOSE_TIMEOUT_SECS` | `5` |
//! | `CIRCLE_RATE_LIMIT` | `20` |
//! | `CIRCLE_RATE_REFILL_MS` | `50` |
//! | `CIRCLE_LOG_FORMAT` | `pretty` |
//!
//! ```bash
//! CIRCLE_JWT_KEY=change-me CIRCLE_DB_PATH=./data/circle.db cargo run
//! ```

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use circle_hub::HubConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Key used when `CIRCLE_JWT_KEY` is not set. Only suitable for development.
const DEV_JWT_KEY: &str = "circle-development-key-do-not-use-in-production";

/// Configuration errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?} ({reason})")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(name: &'static str, value: &str, reason: impl fmt::Display) -> Self {
        Self::InvalidValue {
            name,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable multi-line output
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

impl LogFormat {
    /// Parse a log format, case-insensitively. Unknown values fall back to `Pretty`.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }

    /// Read `CIRCLE_LOG_FORMAT` from the environment.
    pub fn from_env() -> Self {
        std::env::var("CIRCLE_LOG_FORMAT")
            .map(|s| Self::parse(&s))
            .unwrap_or_default()
    }
}

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to
    pub bind_addr: SocketAddr,
    /// Database file path (None for in-memory)
    pub db_path: Option<String>,
    /// HMAC key for signing access tokens
    pub jwt_key: String,
    /// Access token lifetime
    pub token_ttl: Duration,
    /// Per-connection outbound queue capacity
    pub outbound_capacity: usize,
    /// How long teardown waits for a connection's second loop
    pub close_timeout: Duration,
    /// Burst size of the auth endpoint rate limiter
    pub rate_limit: u32,
    /// Interval at which the rate limiter regains one token
    pub rate_refill: Duration,
    /// Log output format
    pub log_format: LogFormat,
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("db_path", &self.db_path)
            .field("jwt_key", &"<redacted>")
            .field("token_ttl", &self.token_ttl)
            .field("outbound_capacity", &self.outbound_capacity)
            .field("close_timeout", &self.close_timeout)
            .field("rate_limit", &self.rate_limit)
            .field("rate_refill", &self.rate_refill)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            db_path: None,
            jwt_key: DEV_JWT_KEY.to_string(),
            token_ttl: Duration::from_secs(2 * 60 * 60),
            outbound_capacity: circle_hub::connection::DEFAULT_OUTBOUND_CAPACITY,
            close_timeout: Duration::from_secs(5),
            rate_limit: 20,
            rate_refill: Duration::from_millis(50),
            log_format: LogFormat::Pretty,
        }
    }
}

impl ServerConfig {
    /// Load server configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let jwt_key = match lookup("CIRCLE_JWT_KEY").filter(|key| !key.is_empty()) {
            Some(key) => key,
            None => {
                warn!("CIRCLE_JWT_KEY not set, using the development signing key");
                defaults.jwt_key
            }
        };

        let outbound_capacity: usize = parse_var(&lookup, "CIRCLE_OUTBOUND_CAPACITY")?
            .unwrap_or(defaults.outbound_capacity);
        if outbound_capacity == 0 {
            return Err(ConfigError::invalid(
                "CIRCLE_OUTBOUND_CAPACITY",
                "0",
                "must be at least 1",
            ));
        }

        let rate_limit: u32 =
            parse_var(&lookup, "CIRCLE_RATE_LIMIT")?.unwrap_or(defaults.rate_limit);
        let rate_refill_ms: u64 = parse_var(&lookup, "CIRCLE_RATE_REFILL_MS")?
            .unwrap_or(defaults.rate_refill.as_millis() as u64);
        if rate_refill_ms == 0 {
            return Err(ConfigError::invalid(
                "CIRCLE_RATE_REFILL_MS",
                "0",
                "must be at least 1",
            ));
        }

        Ok(Self {
            bind_addr: parse_var(&lookup, "CIRCLE_BIND_ADDR")?.unwrap_or(defaults.bind_addr),
            db_path: lookup("CIRCLE_DB_PATH").filter(|path| !path.is_empty()),
            jwt_key,
            token_ttl: parse_var(&lookup, "CIRCLE_TOKEN_TTL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.token_ttl),
            outbound_capacity,
            close_timeout: parse_var(&lookup, "CIRCLE_CLOSE_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.close_timeout),
            rate_limit,
            rate_refill: Duration::from_millis(rate_refill_ms),
            log_format: lookup("CIRCLE_LOG_FORMAT")
                .map(|s| LogFormat::parse(&s))
                .unwrap_or_default(),
        })
    }

    /// Hub settings derived from this configuration.
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            outbound_capacity: self.outbound_capacity,
            close_timeout: self.close_timeout,
        }
    }

    /// Log the current server configuration.
    pub fn log_config(&self) {
        info!("Bind address: {}", self.bind_addr);
        match &self.db_path {
            Some(path) => info!("Database: {}", path),
            None => info!("Database: in-memory (development mode)"),
        }
        info!("Token lifetime: {}s", self.token_ttl.as_secs());
        info!(
            "Outbound queue capacity: {}, close timeout: {}s",
            self.outbound_capacity,
            self.close_timeout.as_secs()
        );
        info!(
            "Auth rate limit: burst {}, one token every {}ms",
            self.rate_limit,
            self.rate_refill.as_millis()
        );
        info!("Log format: {}", self.log_format);
    }

    /// Create a test configuration.
    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            jwt_key: "test-signing-key".to_string(),
            ..Self::default()
        }
    }
}

fn parse_var<T, F>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| ConfigError::invalid(name, &raw, e)),
        _ => Ok(None),
    }
}
