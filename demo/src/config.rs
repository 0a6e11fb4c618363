//! Demo configuration loaded from environment variables with defaults.

use std::env;

/// Default ticket price in token units.
pub const DEFAULT_TICKET_PRICE: u128 = 10;

/// Default delay between deployment and the sale start.
pub const DEFAULT_START_OFFSET_SECS: i64 = 3600;

/// Demo configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// `PostgreSQL` store; in-memory when absent.
    pub database: Option<DatabaseConfig>,
    /// Initial ticket price in token units.
    pub ticket_price: u128,
    /// Seconds from deployment until the sale closes and redemption opens.
    pub start_offset_secs: i64,
    /// `tracing` filter directive.
    pub log_filter: String,
}

/// `PostgreSQL` connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable values fall back to their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            database: env::var("ATTENDANCE_DATABASE_URL").ok().map(|url| DatabaseConfig {
                url,
                max_connections: env::var("ATTENDANCE_DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(attendance_postgres::DEFAULT_MAX_CONNECTIONS),
            }),
            ticket_price: env::var("ATTENDANCE_TICKET_PRICE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_TICKET_PRICE),
            start_offset_secs: env::var("ATTENDANCE_START_OFFSET_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|secs: &i64| *secs > 0)
                .unwrap_or(DEFAULT_START_OFFSET_SECS),
            log_filter: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        }
    }
}
