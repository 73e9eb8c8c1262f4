use std::env;
use std::str::FromStr;

use booking_services::BookingPolicy;

const DEFAULT_DATABASE_URL: &str = "sqlite://campsite.db?mode=rwc";
const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Error raised when an environment variable holds an unusable value
#[derive(Debug, thiserror::Error)]
#[error("Invalid value for {name}: {value:?}")]
pub struct ConfigError {
    name: &'static str,
    value: String,
}

/// Server settings read from the environment
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Connection URL; the scheme selects PostgreSQL or SQLite
    pub database_url: String,
    /// Upper bound on pooled database connections
    pub max_connections: u32,
    /// Address the HTTP server listens on
    pub bind_address: String,
    /// Booking rules enforced by the service
    pub policy: BookingPolicy,
}

impl ServerConfig {
    /// Reads the configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = BookingPolicy::default();

        Ok(Self {
            database_url: lookup("DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            max_connections: parse_or(
                &lookup,
                "DATABASE_MAX_CONNECTIONS",
                DEFAULT_MAX_CONNECTIONS,
            )?,
            bind_address: lookup("BIND_ADDRESS")
                .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string()),
            policy: BookingPolicy {
                max_nights: parse_or(&lookup, "BOOKING_MAX_NIGHTS", defaults.max_nights)?,
                min_days_ahead: parse_or(
                    &lookup,
                    "BOOKING_MIN_DAYS_AHEAD",
                    defaults.min_days_ahead,
                )?,
                max_days_ahead: parse_or(
                    &lookup,
                    "BOOKING_MAX_DAYS_AHEAD",
                    defaults.max_days_ahead,
                )?,
                availability_max_window_days: parse_or(
                    &lookup,
                    "AVAILABILITY_MAX_WINDOW_DAYS",
                    defaults.availability_max_window_days,
                )?,
            },
        })
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError { name, value }),
        None => Ok(default),
    }
}
