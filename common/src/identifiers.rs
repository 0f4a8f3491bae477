//! Identifier types for ledger entities.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{LedgerError, Result};

/// Identifier of an account (the owning user).
///
/// Accounts are provisioned outside the ledger with database-assigned
/// serial ids, so a valid identifier is always strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(i64);

impl AccountId {
    /// Create an account ID, rejecting non-positive values.
    pub fn new(id: i64) -> Result<Self> {
        if id <= 0 {
            return Err(LedgerError::InvalidAccount(format!(
                "account id must be positive, got {}",
                id
            )));
        }
        Ok(Self(id))
    }

    /// Get the raw integer value.
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AccountId {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        let id = s
            .trim()
            .parse::<i64>()
            .map_err(|_| LedgerError::InvalidAccount(format!("invalid account id: {:?}", s)))?;
        Self::new(id)
    }
}

impl TryFrom<i64> for AccountId {
    type Error = LedgerError;

    fn try_from(id: i64) -> Result<Self> {
        Self::new(id)
    }
}

/// Store-assigned surrogate identifier of a transaction record.
/// Monotonic within a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(i64);

impl RecordId {
    /// Wrap a raw store id.
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the raw integer value.
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
