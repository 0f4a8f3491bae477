//! Observation hooks for ledger operations.
//!
//! The engine reports every outcome through an injected [`LedgerObserver`]
//! instead of writing to a process-wide logger of its own.

use std::fmt;
use std::time::Duration;

use finledger_common::{millis, AccountId, ErrorKind, LedgerError};
use rust_decimal::Decimal;
use tracing::{error, info, warn};

/// Ledger operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Balance lookup.
    GetBalance,
    /// Credit of one account.
    Deposit,
    /// Move between two accounts.
    Transfer,
    /// Recent transaction history.
    ListTransactions,
}

impl Operation {
    /// Name used in logs and errors.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::GetBalance => "get_balance",
            Operation::Deposit => "deposit",
            Operation::Transfer => "transfer",
            Operation::ListTransactions => "list_transactions",
        }
    }

    /// Whether the operation mutates balances.
    pub fn is_mutation(&self) -> bool {
        matches!(self, Operation::Deposit | Operation::Transfer)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Context of one operation, as reported to observers.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationEvent {
    pub operation: Operation,
    /// Accounts touched, source first for transfers.
    pub accounts: Vec<AccountId>,
    pub amount: Option<Decimal>,
    /// Time spent so far, retries included.
    pub elapsed: Duration,
}

impl OperationEvent {
    /// Event with zero elapsed time.
    pub fn new(operation: Operation, accounts: Vec<AccountId>, amount: Option<Decimal>) -> Self {
        Self {
            operation,
            accounts,
            amount,
            elapsed: Duration::ZERO,
        }
    }

    fn accounts_display(&self) -> String {
        self.accounts
            .iter()
            .map(|a| a.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Receiver of ledger operation outcomes.
pub trait LedgerObserver: Send + Sync {
    /// The operation finished successfully (committed, for mutations).
    fn operation_committed(&self, event: &OperationEvent);

    /// The operation failed; nothing it staged was applied.
    fn operation_failed(&self, event: &OperationEvent, error: &LedgerError);

    /// A transient failure is about to be retried.
    fn operation_retrying(&self, _event: &OperationEvent, _attempt: u32, _error: &LedgerError) {}
}

/// Observer that emits structured `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl LedgerObserver for TracingObserver {
    fn operation_committed(&self, event: &OperationEvent) {
        info!(
            operation = %event.operation,
            accounts = %event.accounts_display(),
            amount = ?event.amount,
            elapsed_ms = millis(event.elapsed),
            "Ledger operation completed"
        );
    }

    fn operation_failed(&self, event: &OperationEvent, err: &LedgerError) {
        match err.kind() {
            ErrorKind::Internal => error!(
                operation = %event.operation,
                accounts = %event.accounts_display(),
                amount = ?event.amount,
                code = err.error_code(),
                error = %err,
                elapsed_ms = millis(event.elapsed),
                "Ledger operation failed"
            ),
            _ => warn!(
                operation = %event.operation,
                accounts = %event.accounts_display(),
                amount = ?event.amount,
                code = err.error_code(),
                error = %err,
                "Ledger operation rejected"
            ),
        }
    }

    fn operation_retrying(&self, event: &OperationEvent, attempt: u32, err: &LedgerError) {
        warn!(
            operation = %event.operation,
            accounts = %event.accounts_display(),
            attempt,
            error = %err,
            "Retrying ledger operation after transient failure"
        );
    }
}
