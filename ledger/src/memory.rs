//! In-memory ledger store.
//!
//! Same contract as the Postgres store, used as a test double. A unit of
//! work holds the store-wide lock for its whole lifetime, so units of work
//! are fully serialized; staged changes are published only on commit.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex as FaultLock;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};

use finledger_common::{max_amount, now, AccountId, LedgerError, RecordId, Result, StoreStep, Timestamp};

use crate::record::{TransactionRecord, TransactionType};
use crate::store::{LedgerStore, UnitOfWork};

#[derive(Debug, Default)]
struct State {
    balances: BTreeMap<AccountId, Decimal>,
    records: Vec<TransactionRecord>,
    last_record_id: i64,
}

#[derive(Debug, Clone, Copy)]
struct Fault {
    step: StoreStep,
    transient: bool,
}

#[derive(Debug, Default)]
struct Faults(FaultLock<Vec<Fault>>);

impl Faults {
    /// Consume the first pending fault registered for `step`.
    fn take(&self, step: StoreStep, account: Option<AccountId>) -> Result<()> {
        let mut faults = self.0.lock();
        match faults.iter().position(|f| f.step == step) {
            Some(index) => {
                let fault = faults.remove(index);
                let message = "injected failure";
                if fault.transient {
                    Err(LedgerError::transient(step, account, message))
                } else {
                    Err(LedgerError::store(step, account, message))
                }
            }
            None => Ok(()),
        }
    }
}

/// Ledger store kept entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedgerStore {
    state: Arc<Mutex<State>>,
    faults: Arc<Faults>,
}

impl MemoryLedgerStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding the given accounts.
    pub fn with_accounts(accounts: impl IntoIterator<Item = (AccountId, Decimal)>) -> Self {
        let state = State {
            balances: accounts.into_iter().collect(),
            ..State::default()
        };

        Self {
            state: Arc::new(Mutex::new(state)),
            faults: Arc::default(),
        }
    }

    /// Provision an account, replacing any existing balance.
    pub async fn open_account(&self, account: AccountId, balance: Decimal) {
        self.state.lock().await.balances.insert(account, balance);
    }

    /// Make the next use of `step` fail. Faults queue up and fire once each.
    pub fn inject_failure(&self, step: StoreStep, transient: bool) {
        self.faults.0.lock().push(Fault { step, transient });
    }

    /// Committed balances of every account.
    pub async fn balances(&self) -> BTreeMap<AccountId, Decimal> {
        self.state.lock().await.balances.clone()
    }

    /// Every committed record, oldest first.
    pub async fn records(&self) -> Vec<TransactionRecord> {
        self.state.lock().await.records.clone()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    type Unit = MemoryUnitOfWork;

    async fn begin(&self) -> Result<MemoryUnitOfWork> {
        self.faults.take(StoreStep::Begin, None)?;
        let guard = self.state.clone().lock_owned().await;

        Ok(MemoryUnitOfWork {
            guard,
            faults: self.faults.clone(),
            staged_balances: BTreeMap::new(),
            staged_records: Vec::new(),
            started_at: now(),
        })
    }

    async fn read_balance(&self, account: AccountId) -> Result<Decimal> {
        self.faults.take(StoreStep::ReadBalance, Some(account))?;
        self.state
            .lock()
            .await
            .balances
            .get(&account)
            .copied()
            .ok_or(LedgerError::AccountNotFound(account))
    }

    async fn list_recent_transactions(
        &self,
        account: AccountId,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>> {
        self.faults.take(StoreStep::ListRecords, Some(account))?;
        let state = self.state.lock().await;

        let mut records: Vec<TransactionRecord> = state
            .records
            .iter()
            .filter(|r| r.user_id == account)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        records.truncate(limit);

        Ok(records)
    }

    async fn ping(&self) -> Result<()> {
        self.faults.take(StoreStep::Acquire, None)
    }
}

/// Unit of work over a [`MemoryLedgerStore`].
pub struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<State>,
    faults: Arc<Faults>,
    staged_balances: BTreeMap<AccountId, Decimal>,
    staged_records: Vec<TransactionRecord>,
    // Shared by every record of the unit of work, like `now()` in Postgres.
    started_at: Timestamp,
}

impl MemoryUnitOfWork {
    fn current_balance(&self, account: AccountId) -> Result<Decimal> {
        self.staged_balances
            .get(&account)
            .or_else(|| self.guard.balances.get(&account))
            .copied()
            .ok_or(LedgerError::AccountNotFound(account))
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn lock_balance(&mut self, account: AccountId) -> Result<Decimal> {
        self.faults.take(StoreStep::LockBalance, Some(account))?;
        self.current_balance(account)
    }

    async fn apply_balance_delta(&mut self, account: AccountId, delta: Decimal) -> Result<Decimal> {
        self.faults.take(StoreStep::UpdateBalance, Some(account))?;
        let balance = self
            .current_balance(account)?
            .checked_add(delta)
            .filter(|b| *b < max_amount())
            .ok_or_else(|| {
                LedgerError::store(StoreStep::UpdateBalance, Some(account), "numeric field overflow")
            })?;

        // Mirrors the CHECK (balance >= 0) constraint of the relational schema.
        if balance < Decimal::ZERO {
            return Err(LedgerError::store(
                StoreStep::UpdateBalance,
                Some(account),
                "balance would become negative",
            ));
        }

        self.staged_balances.insert(account, balance);
        Ok(balance)
    }

    async fn append_transaction_record(
        &mut self,
        account: AccountId,
        amount: Decimal,
        kind: TransactionType,
    ) -> Result<TransactionRecord> {
        self.faults.take(StoreStep::InsertRecord, Some(account))?;

        let id = self.guard.last_record_id + self.staged_records.len() as i64 + 1;
        let record = TransactionRecord {
            id: RecordId::new(id),
            user_id: account,
            amount,
            kind,
            created_at: self.started_at,
        };

        self.staged_records.push(record.clone());
        Ok(record)
    }

    async fn commit(mut self) -> Result<()> {
        self.faults.take(StoreStep::Commit, None)?;

        let balances = std::mem::take(&mut self.staged_balances);
        let records = std::mem::take(&mut self.staged_records);
        let state = &mut *self.guard;

        state.balances.extend(balances);
        state.last_record_id += records.len() as i64;
        state.records.extend(records);

        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.faults.take(StoreStep::Rollback, None)
    }
}
