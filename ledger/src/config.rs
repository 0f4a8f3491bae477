//! Engine and store configuration.

use std::time::Duration;

use finledger_common::{constants, LedgerError, Result};

/// Ledger engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Budget of one attempt, unit of work included. On expiry the unit of
    /// work is rolled back.
    pub operation_timeout: Duration,
    /// Retries of a transient store failure.
    pub max_retries: u32,
    /// Base backoff between retries (multiplied by the attempt number).
    pub retry_backoff: Duration,
    /// Records returned by a transaction history listing.
    pub history_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            operation_timeout: constants::operation_timeout(),
            max_retries: constants::MAX_RETRIES,
            retry_backoff: constants::retry_backoff(),
            history_limit: constants::HISTORY_LIMIT,
        }
    }
}

impl EngineConfig {
    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.operation_timeout.is_zero() {
            return Err(LedgerError::ConfigurationError(
                "Operation timeout cannot be 0".to_string(),
            ));
        }

        if self.history_limit == 0 {
            return Err(LedgerError::ConfigurationError(
                "History limit cannot be 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Connection pool configuration for the Postgres store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database URL.
    pub database_url: String,
    /// Maximum pooled connections.
    pub max_connections: u32,
    /// Time to wait for a pooled connection.
    pub acquire_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/finledger".to_string(),
            max_connections: 10,
            acquire_timeout: constants::acquire_timeout(),
        }
    }
}

impl StoreConfig {
    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.database_url.is_empty() {
            return Err(LedgerError::ConfigurationError(
                "Database URL cannot be empty".to_string(),
            ));
        }

        if self.max_connections == 0 {
            return Err(LedgerError::ConfigurationError(
                "Pool size cannot be 0".to_string(),
            ));
        }

        if self.acquire_timeout.is_zero() {
            return Err(LedgerError::ConfigurationError(
                "Acquire timeout cannot be 0".to_string(),
            ));
        }

        Ok(())
    }
}
