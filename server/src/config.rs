//! Server configuration.

use std::str::FromStr;
use std::time::Duration;

use finledger_common::{LedgerError, Result};
use finledger_ledger::{EngineConfig, StoreConfig};

use crate::logging::LogFormat;

/// Main server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address.
    pub listen_addr: String,
    /// Listen port.
    pub listen_port: u16,
    /// Connection pool configuration.
    pub store: StoreConfig,
    /// Engine timeouts, retries and limits.
    pub engine: EngineConfig,
    /// Apply schema migrations at startup.
    pub run_migrations: bool,
    /// Log level, used when `RUST_LOG` is unset.
    pub log_level: String,
    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0".to_string(),
            listen_port: 8080,
            store: StoreConfig::default(),
            engine: EngineConfig::default(),
            run_migrations: true,
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(addr) = lookup("LISTEN_ADDR") {
            config.listen_addr = addr;
        }

        if let Some(port) = parse(&lookup, "PORT")? {
            config.listen_port = port;
        }

        if let Some(url) = lookup("DATABASE_URL") {
            config.store.database_url = url;
        }

        if let Some(size) = parse(&lookup, "DB_MAX_CONNECTIONS")? {
            config.store.max_connections = size;
        }

        if let Some(ms) = parse(&lookup, "DB_ACQUIRE_TIMEOUT_MS")? {
            config.store.acquire_timeout = Duration::from_millis(ms);
        }

        if let Some(ms) = parse(&lookup, "OPERATION_TIMEOUT_MS")? {
            config.engine.operation_timeout = Duration::from_millis(ms);
        }

        if let Some(retries) = parse(&lookup, "MAX_RETRIES")? {
            config.engine.max_retries = retries;
        }

        if let Some(limit) = parse(&lookup, "HISTORY_LIMIT")? {
            config.engine.history_limit = limit;
        }

        if let Some(run) = parse(&lookup, "RUN_MIGRATIONS")? {
            config.run_migrations = run;
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            config.log_level = level;
        }

        if let Some(format) = parse(&lookup, "LOG_FORMAT")? {
            config.log_format = format;
        }

        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.listen_port == 0 {
            return Err(LedgerError::ConfigurationError(
                "Listen port cannot be 0".to_string(),
            ));
        }

        self.store.validate()?;
        self.engine.validate()
    }
}

fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>> {
    match lookup(name) {
        Some(raw) => raw.trim().parse().map(Some).map_err(|_| {
            LedgerError::ConfigurationError(format!("Invalid value for {}: {:?}", name, raw))
        }),
        None => Ok(None),
    }
}
