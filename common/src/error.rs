//! Error types for ledger operations.

use std::fmt;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::AccountId;

/// Store primitive that was executing when a store failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreStep {
    /// Acquiring a pooled connection.
    Acquire,
    /// Opening a unit of work.
    Begin,
    /// Point read of a balance outside a unit of work.
    ReadBalance,
    /// Locking read of a balance inside a unit of work.
    LockBalance,
    /// Applying a balance delta.
    UpdateBalance,
    /// Appending a transaction record.
    InsertRecord,
    /// Listing transaction records.
    ListRecords,
    /// Committing a unit of work.
    Commit,
    /// Rolling back a unit of work.
    Rollback,
    /// Applying schema migrations.
    Migrate,
}

impl StoreStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreStep::Acquire => "acquire",
            StoreStep::Begin => "begin",
            StoreStep::ReadBalance => "read_balance",
            StoreStep::LockBalance => "lock_balance",
            StoreStep::UpdateBalance => "update_balance",
            StoreStep::InsertRecord => "insert_record",
            StoreStep::ListRecords => "list_records",
            StoreStep::Commit => "commit",
            StoreStep::Rollback => "rollback",
            StoreStep::Migrate => "migrate",
        }
    }
}

impl fmt::Display for StoreStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-facing category of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or out-of-range input; the caller must fix the request.
    InvalidInput,
    /// The referenced account does not exist.
    NotFound,
    /// A business rule refused the operation.
    Rejected,
    /// Store, timeout or configuration failure.
    Internal,
}

/// Main error type for ledger operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    /// Non-positive or malformed amount.
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Malformed account identifier.
    #[error("Invalid account: {0}")]
    InvalidAccount(String),

    /// Source and destination of a transfer are the same account.
    #[error("Cannot transfer from account {0} to itself")]
    SelfTransfer(AccountId),

    /// Account does not exist.
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    /// Balance too low for the requested debit.
    #[error("Insufficient funds in account {account}: required {required}, available {available}")]
    InsufficientFunds {
        account: AccountId,
        required: Decimal,
        available: Decimal,
    },

    /// Connection, constraint or commit failure in the store.
    #[error("Store error during {step}{}: {message}", account_suffix(.account))]
    Store {
        step: StoreStep,
        account: Option<AccountId>,
        message: String,
        transient: bool,
    },

    /// Operation exceeded its time budget and was rolled back.
    #[error("Operation {operation} timed out after {after_ms}ms")]
    Timeout {
        operation: &'static str,
        after_ms: u64,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl LedgerError {
    /// Build a store failure for `step`.
    pub fn store(step: StoreStep, account: Option<AccountId>, message: impl Into<String>) -> Self {
        LedgerError::Store {
            step,
            account,
            message: message.into(),
            transient: false,
        }
    }

    /// Build a store failure that is safe to retry.
    pub fn transient(step: StoreStep, account: Option<AccountId>, message: impl Into<String>) -> Self {
        LedgerError::Store {
            step,
            account,
            message: message.into(),
            transient: true,
        }
    }

    /// Caller-facing category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::InvalidAmount(_)
            | LedgerError::InvalidAccount(_)
            | LedgerError::SelfTransfer(_) => ErrorKind::InvalidInput,
            LedgerError::AccountNotFound(_) => ErrorKind::NotFound,
            LedgerError::InsufficientFunds { .. } => ErrorKind::Rejected,
            LedgerError::Store { .. }
            | LedgerError::Timeout { .. }
            | LedgerError::ConfigurationError(_) => ErrorKind::Internal,
        }
    }

    /// Check if this error is retryable. Timeouts are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Store { transient: true, .. })
    }

    /// Get error code for client responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            LedgerError::InvalidAmount(_) => "INVALID_AMOUNT",
            LedgerError::InvalidAccount(_) => "INVALID_ACCOUNT",
            LedgerError::SelfTransfer(_) => "SELF_TRANSFER",
            LedgerError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            LedgerError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            LedgerError::Store { .. } => "STORE_ERROR",
            LedgerError::Timeout { .. } => "TIMEOUT",
            LedgerError::ConfigurationError(_) => "CONFIGURATION_ERROR",
        }
    }
}

fn account_suffix(account: &Option<AccountId>) -> String {
    account
        .map(|a| format!(" for account {}", a))
        .unwrap_or_default()
}

/// Result type alias for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
