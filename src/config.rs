// config.rs
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::analytics::MAX_WINDOW_DAYS;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub cors_origin: Option<String>,
    pub max_timeframe_days: i64,
    pub store_backend: StoreBackend,
    pub memory_seed_path: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let store_backend = parse(&lookup, "STORE_BACKEND", StoreBackend::Postgres)?;
        let database_url = lookup("DATABASE_URL").filter(|url| !url.is_empty());
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let max_timeframe_days = parse(&lookup, "MAX_TIMEFRAME_DAYS", 365)?;
        if max_timeframe_days <= 0 || max_timeframe_days > MAX_WINDOW_DAYS {
            return Err(ConfigError::Invalid {
                name: "MAX_TIMEFRAME_DAYS",
                value: max_timeframe_days.to_string(),
            });
        }

        Ok(Self {
            port: parse(&lookup, "PORT", 3030)?,
            database_url,
            max_connections: parse(&lookup, "DATABASE_MAX_CONNECTIONS", 5)?,
            cors_origin: lookup("CORS_ORIGIN").filter(|origin| !origin.is_empty()),
            max_timeframe_days,
            store_backend,
            memory_seed_path: lookup("MEMORY_SEED_PATH")
                .filter(|path| !path.is_empty())
                .map(PathBuf::from),
        })
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}
