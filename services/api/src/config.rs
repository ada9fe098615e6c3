//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::str::FromStr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Where the rows live.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DatabaseBackend {
    Postgres(String),
    /// `memory://` keeps everything in process; nothing survives a restart.
    Memory,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database: DatabaseBackend,
    pub log_level: Level,
    pub cors_origin: String,
    pub db_max_connections: u32,
    pub session_ttl_days: i64,
    pub min_password_length: usize,
    pub default_page_size: u32,
    pub change_feed_capacity: usize,
    pub review_window_days: i64,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Server and Database Settings ---
        let bind_address_str = lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?;
        let database = if database_url.trim() == "memory://" {
            DatabaseBackend::Memory
        } else {
            DatabaseBackend::Postgres(database_url)
        };

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origin =
            lookup("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:3000".to_string());

        // --- Tunables ---
        let db_max_connections = parse_or(&lookup, "DB_MAX_CONNECTIONS", 5)?;
        let session_ttl_days = parse_or(&lookup, "SESSION_TTL_DAYS", 30)?;
        let min_password_length = parse_or(&lookup, "MIN_PASSWORD_LENGTH", 8)?;
        let default_page_size = parse_or(&lookup, "DEFAULT_PAGE_SIZE", 10)?;
        let change_feed_capacity = parse_or(&lookup, "CHANGE_FEED_CAPACITY", 256)?;
        let review_window_days = parse_or(&lookup, "REVIEW_WINDOW_DAYS", 30)?;

        Ok(Self {
            bind_address,
            database,
            log_level,
            cors_origin,
            db_max_connections,
            session_ttl_days,
            min_password_length,
            default_page_size,
            change_feed_capacity,
            review_window_days,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        None => Ok(default),
    }
}
