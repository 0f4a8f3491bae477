//! Accessor facade over the ledger engine.
//!
//! Takes raw caller input, validates it into ledger types and forwards it to
//! the engine. Nothing invalid ever reaches the store.

use rust_decimal::Decimal;

use finledger_common::{AccountId, Amount, LedgerError, Result};

use crate::engine::LedgerEngine;
use crate::record::{TransactionRecord, TransferReceipt};
use crate::store::LedgerStore;

/// Entry point for request handlers.
pub struct LedgerService<S> {
    engine: LedgerEngine<S>,
}

impl<S: LedgerStore> LedgerService<S> {
    /// Create a service over `engine`.
    pub fn new(engine: LedgerEngine<S>) -> Self {
        Self { engine }
    }

    /// Get the underlying engine.
    pub fn engine(&self) -> &LedgerEngine<S> {
        &self.engine
    }

    /// Current balance of `user_id`.
    pub async fn get_balance(&self, user_id: i64) -> Result<Decimal> {
        let account = AccountId::new(user_id)?;
        self.engine.get_balance(account).await
    }

    /// Deposit `amount` into `user_id`.
    pub async fn deposit(&self, user_id: i64, amount: Decimal) -> Result<TransactionRecord> {
        let account = AccountId::new(user_id)?;
        let amount = Amount::new(amount)?;
        self.engine.deposit(account, amount.value()).await
    }

    /// Transfer `amount` between two users.
    pub async fn transfer(
        &self,
        from_user_id: i64,
        to_user_id: i64,
        amount: Decimal,
    ) -> Result<TransferReceipt> {
        let from = AccountId::new(from_user_id)?;
        let to = AccountId::new(to_user_id)?;
        let amount = Amount::new(amount)?;
        if from == to {
            return Err(LedgerError::SelfTransfer(from));
        }

        self.engine.transfer(from, to, amount.value()).await
    }

    /// Most recent transactions of `user_id`, newest first.
    pub async fn last_transactions(&self, user_id: i64) -> Result<Vec<TransactionRecord>> {
        let account = AccountId::new(user_id)?;
        self.engine.last_transactions(account).await
    }

    /// Check that the store is reachable.
    pub async fn health(&self) -> Result<()> {
        self.engine.store().ping().await
    }
}
