//! Ledger store abstraction.
//!
//! A store owns account balances and the transaction log. Every mutation
//! goes through a [`UnitOfWork`]: an all-or-nothing group of statements that
//! either commits entirely or leaves no trace.

use async_trait::async_trait;
use rust_decimal::Decimal;

use finledger_common::{AccountId, Result};

use crate::record::{TransactionRecord, TransactionType};

/// Durable storage of balances and transaction records.
///
/// Implementations are cheap to clone and share one connection pool (or
/// one in-memory state) between clones.
#[async_trait]
pub trait LedgerStore: Send + Sync + Clone + 'static {
    /// Handle of an open unit of work.
    type Unit: UnitOfWork;

    /// Open a unit of work.
    async fn begin(&self) -> Result<Self::Unit>;

    /// Point read of a committed balance. Fails with `AccountNotFound`.
    async fn read_balance(&self, account: AccountId) -> Result<Decimal>;

    /// Most recent records of an account, newest first, at most `limit`.
    ///
    /// Ordered by creation time, then by record id, both descending.
    async fn list_recent_transactions(
        &self,
        account: AccountId,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>>;

    /// Check the store is reachable.
    async fn ping(&self) -> Result<()>;
}

/// An open, uncommitted unit of work.
///
/// Dropping a unit of work without calling [`UnitOfWork::commit`] discards
/// every change staged in it. This holds on every exit path: early `?`
/// returns, a timeout dropping the enclosing future, or a panic.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Read a balance and lock the account row until the unit of work ends.
    ///
    /// Concurrent units of work locking the same account wait for this one
    /// to finish and then observe its committed effect.
    async fn lock_balance(&mut self, account: AccountId) -> Result<Decimal>;

    /// Add `delta` to the account's balance and return the new balance.
    async fn apply_balance_delta(&mut self, account: AccountId, delta: Decimal) -> Result<Decimal>;

    /// Append one record to the account's history.
    async fn append_transaction_record(
        &mut self,
        account: AccountId,
        amount: Decimal,
        kind: TransactionType,
    ) -> Result<TransactionRecord>;

    /// Make every staged change durable and visible.
    async fn commit(self) -> Result<()>;

    /// Discard every staged change.
    async fn rollback(self) -> Result<()>;
}
