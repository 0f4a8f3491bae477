//! Metrics collection for ledger monitoring.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use finledger_common::{ErrorKind, LedgerError};
use finledger_ledger::{LedgerObserver, Operation, OperationEvent};

/// Outcome counters of one operation kind.
#[derive(Debug, Default)]
pub struct OperationCounters {
    /// Completed operations.
    pub committed: AtomicU64,
    /// Operations refused for caller-side reasons.
    pub rejected: AtomicU64,
    /// Operations that failed internally.
    pub failed: AtomicU64,
    /// Retries after transient store failures.
    pub retries: AtomicU64,
}

impl OperationCounters {
    fn snapshot(&self) -> OperationSnapshot {
        OperationSnapshot {
            committed: self.committed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }
}

/// Ledger metrics.
///
/// Counts every outcome reported by the engine, then forwards it to the
/// wrapped observer.
pub struct LedgerMetrics {
    inner: Arc<dyn LedgerObserver>,
    get_balance: OperationCounters,
    deposit: OperationCounters,
    transfer: OperationCounters,
    list_transactions: OperationCounters,
}

impl LedgerMetrics {
    /// Create new metrics wrapping `inner`.
    pub fn new(inner: Arc<dyn LedgerObserver>) -> Self {
        Self {
            inner,
            get_balance: OperationCounters::default(),
            deposit: OperationCounters::default(),
            transfer: OperationCounters::default(),
            list_transactions: OperationCounters::default(),
        }
    }

    /// Counters of one operation kind.
    pub fn counters(&self, operation: Operation) -> &OperationCounters {
        match operation {
            Operation::GetBalance => &self.get_balance,
            Operation::Deposit => &self.deposit,
            Operation::Transfer => &self.transfer,
            Operation::ListTransactions => &self.list_transactions,
        }
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            get_balance: self.get_balance.snapshot(),
            deposit: self.deposit.snapshot(),
            transfer: self.transfer.snapshot(),
            list_transactions: self.list_transactions.snapshot(),
        }
    }
}

impl LedgerObserver for LedgerMetrics {
    fn operation_committed(&self, event: &OperationEvent) {
        self.counters(event.operation)
            .committed
            .fetch_add(1, Ordering::Relaxed);
        self.inner.operation_committed(event);
    }

    fn operation_failed(&self, event: &OperationEvent, error: &LedgerError) {
        let counters = self.counters(event.operation);
        match error.kind() {
            ErrorKind::Internal => counters.failed.fetch_add(1, Ordering::Relaxed),
            _ => counters.rejected.fetch_add(1, Ordering::Relaxed),
        };
        self.inner.operation_failed(event, error);
    }

    fn operation_retrying(&self, event: &OperationEvent, attempt: u32, error: &LedgerError) {
        self.counters(event.operation)
            .retries
            .fetch_add(1, Ordering::Relaxed);
        self.inner.operation_retrying(event, attempt, error);
    }
}

/// Snapshot of one operation's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OperationSnapshot {
    pub committed: u64,
    pub rejected: u64,
    pub failed: u64,
    pub retries: u64,
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub get_balance: OperationSnapshot,
    pub deposit: OperationSnapshot,
    pub transfer: OperationSnapshot,
    pub list_transactions: OperationSnapshot,
}
