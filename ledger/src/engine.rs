//! Core ledger engine implementation.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use rust_decimal::Decimal;
use tracing::{instrument, warn};

use finledger_common::{millis, AccountId, Amount, LedgerError, Result};

use crate::config::EngineConfig;
use crate::observer::{LedgerObserver, Operation, OperationEvent, TracingObserver};
use crate::record::{TransactionRecord, TransactionType, TransferReceipt};
use crate::store::{LedgerStore, UnitOfWork};

/// The ledger engine enforces the balance invariants on top of a store.
///
/// Every mutation runs in exactly one unit of work: the balance changes and
/// their transaction records commit together or not at all.
pub struct LedgerEngine<S> {
    store: S,
    config: EngineConfig,
    observer: Arc<dyn LedgerObserver>,
}

impl<S: LedgerStore> LedgerEngine<S> {
    /// Create a new ledger engine reporting through `tracing`.
    pub fn new(store: S, config: EngineConfig) -> Self {
        Self {
            store,
            config,
            observer: Arc::new(TracingObserver),
        }
    }

    /// Replace the observer.
    pub fn with_observer(mut self, observer: Arc<dyn LedgerObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Get the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current committed balance of an account.
    #[instrument(skip(self))]
    pub async fn get_balance(&self, account: AccountId) -> Result<Decimal> {
        let event = OperationEvent::new(Operation::GetBalance, vec![account], None);
        self.execute(event, || self.store.read_balance(account)).await
    }

    /// Credit `amount` to an account and record a `deposit`.
    #[instrument(skip(self))]
    pub async fn deposit(&self, account: AccountId, amount: Decimal) -> Result<TransactionRecord> {
        let event = OperationEvent::new(Operation::Deposit, vec![account], Some(amount));
        self.execute(event, || async move {
            let amount = Amount::new(amount)?;
            self.deposit_once(account, amount).await
        })
        .await
    }

    /// Move `amount` from one account to another.
    ///
    /// Fails with `InsufficientFunds`, touching nothing, when the source
    /// balance observed under lock is below `amount`.
    #[instrument(skip(self))]
    pub async fn transfer(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Decimal,
    ) -> Result<TransferReceipt> {
        let event = OperationEvent::new(Operation::Transfer, vec![from, to], Some(amount));
        self.execute(event, || async move {
            let amount = Amount::new(amount)?;
            if from == to {
                return Err(LedgerError::SelfTransfer(from));
            }
            self.transfer_once(from, to, amount).await
        })
        .await
    }

    /// Most recent transaction records of an account, newest first.
    #[instrument(skip(self))]
    pub async fn last_transactions(&self, account: AccountId) -> Result<Vec<TransactionRecord>> {
        let event = OperationEvent::new(Operation::ListTransactions, vec![account], None);
        let limit = self.config.history_limit;
        self.execute(event, || self.store.list_recent_transactions(account, limit))
            .await
    }

    async fn deposit_once(&self, account: AccountId, amount: Amount) -> Result<TransactionRecord> {
        let mut unit = self.store.begin().await?;

        unit.apply_balance_delta(account, amount.value()).await?;
        let record = unit
            .append_transaction_record(account, amount.value(), TransactionType::Deposit)
            .await?;

        unit.commit().await?;
        Ok(record)
    }

    async fn transfer_once(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<TransferReceipt> {
        let mut unit = self.store.begin().await?;

        // Rows are locked in ascending id order so that opposing transfers
        // between the same pair of accounts cannot deadlock.
        let (first, second) = if from < to { (from, to) } else { (to, from) };
        let first_balance = unit.lock_balance(first).await?;
        let second_balance = unit.lock_balance(second).await?;
        let available = if first == from {
            first_balance
        } else {
            second_balance
        };

        if available < amount.value() {
            // Dropping the unit of work rolls it back even if this fails.
            if let Err(err) = unit.rollback().await {
                warn!(error = %err, "Rollback after insufficient funds failed");
            }
            return Err(LedgerError::InsufficientFunds {
                account: from,
                required: amount.value(),
                available,
            });
        }

        unit.apply_balance_delta(from, amount.negated()).await?;
        unit.apply_balance_delta(to, amount.value()).await?;

        let debit = unit
            .append_transaction_record(from, amount.negated(), TransactionType::TransferOut)
            .await?;
        let credit = unit
            .append_transaction_record(to, amount.value(), TransactionType::TransferIn)
            .await?;

        unit.commit().await?;
        Ok(TransferReceipt { debit, credit })
    }

    /// Run one operation under the timeout and retry policy and report the
    /// outcome. Each attempt gets the full timeout; an attempt cut short
    /// drops its unit of work, which rolls it back.
    async fn execute<T, F, Fut>(&self, mut event: OperationEvent, attempt_once: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let timeout = self.config.operation_timeout;
        let mut attempt = 0;

        let result = loop {
            let outcome = match tokio::time::timeout(timeout, attempt_once()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(LedgerError::Timeout {
                    operation: event.operation.as_str(),
                    after_ms: millis(timeout),
                }),
            };

            match outcome {
                Err(err) if err.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    event.elapsed = started.elapsed();
                    self.observer.operation_retrying(&event, attempt, &err);
                    tokio::time::sleep(self.config.retry_backoff * attempt).await;
                }
                other => break other,
            }
        };

        event.elapsed = started.elapsed();
        match &result {
            Ok(_) => self.observer.operation_committed(&event),
            Err(err) => self.observer.operation_failed(&event, err),
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryLedgerStore, MemoryUnitOfWork};
    use async_trait::async_trait;
    use finledger_common::StoreStep;
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn id(n: i64) -> AccountId {
        AccountId::new(n).unwrap()
    }

    fn engine_with(accounts: &[(i64, Decimal)]) -> LedgerEngine<MemoryLedgerStore> {
        let store = MemoryLedgerStore::with_accounts(accounts.iter().map(|(n, b)| (id(*n), *b)));
        LedgerEngine::new(store, EngineConfig::default())
    }

    #[derive(Default)]
    struct RecordingObserver {
        events: Mutex<Vec<String>>,
    }

    impl LedgerObserver for RecordingObserver {
        fn operation_committed(&self, event: &OperationEvent) {
            self.events.lock().push(format!("ok {}", event.operation));
        }

        fn operation_failed(&self, event: &OperationEvent, error: &LedgerError) {
            self.events
                .lock()
                .push(format!("failed {} {}", event.operation, error.error_code()));
        }

        fn operation_retrying(&self, event: &OperationEvent, attempt: u32, _error: &LedgerError) {
            self.events
                .lock()
                .push(format!("retry {} #{}", event.operation, attempt));
        }
    }

    #[tokio::test]
    async fn test_deposit_then_transfer_scenario() {
        let engine = engine_with(&[(1, dec!(100.00)), (2, dec!(0))]);

        engine.deposit(id(1), dec!(50.00)).await.unwrap();
        assert_eq!(engine.get_balance(id(1)).await.unwrap(), dec!(150.00));

        let err = engine.transfer(id(1), id(2), dec!(200.00)).await.unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientFunds {
                account: id(1),
                required: dec!(200.00),
                available: dec!(150.00),
            }
        );
        assert_eq!(engine.get_balance(id(1)).await.unwrap(), dec!(150.00));
        assert_eq!(engine.store().records().await.len(), 1);

        let receipt = engine.transfer(id(1), id(2), dec!(150.00)).await.unwrap();
        assert!(receipt.is_balanced());
        assert_eq!(engine.get_balance(id(1)).await.unwrap(), dec!(0));
        assert_eq!(engine.get_balance(id(2)).await.unwrap(), dec!(150.00));
        assert_eq!(engine.store().records().await.len(), 3);
    }

    #[tokio::test]
    async fn test_deposit_writes_one_record() {
        let engine = engine_with(&[(1, dec!(10))]);

        let record = engine.deposit(id(1), dec!(2.50)).await.unwrap();
        assert_eq!(record.kind, TransactionType::Deposit);
        assert_eq!(record.amount, dec!(2.50));
        assert_eq!(record.user_id, id(1));
        assert_eq!(engine.store().records().await, vec![record]);
    }

    #[tokio::test]
    async fn test_transfer_records_signed_legs() {
        let engine = engine_with(&[(1, dec!(30)), (2, dec!(5))]);

        let receipt = engine.transfer(id(2), id(1), dec!(5)).await.unwrap();
        assert_eq!(receipt.debit.user_id, id(2));
        assert_eq!(receipt.debit.amount, dec!(-5));
        assert_eq!(receipt.debit.kind, TransactionType::TransferOut);
        assert_eq!(receipt.credit.user_id, id(1));
        assert_eq!(receipt.credit.amount, dec!(5));
        assert_eq!(receipt.credit.kind, TransactionType::TransferIn);
        assert_eq!(engine.get_balance(id(2)).await.unwrap(), dec!(0));
    }

    #[tokio::test]
    async fn test_non_positive_amounts_rejected_before_store() {
        let engine = engine_with(&[(1, dec!(10)), (2, dec!(10))]);
        // A store touch would consume this fault and fail differently.
        engine.store().inject_failure(StoreStep::Begin, false);

        for amount in [dec!(0), dec!(-1)] {
            assert!(matches!(
                engine.deposit(id(1), amount).await,
                Err(LedgerError::InvalidAmount(_))
            ));
            assert!(matches!(
                engine.transfer(id(1), id(2), amount).await,
                Err(LedgerError::InvalidAmount(_))
            ));
        }
        assert!(engine.store().records().await.is_empty());
    }

    #[tokio::test]
    async fn test_self_transfer_rejected() {
        let engine = engine_with(&[(1, dec!(10))]);
        assert_eq!(
            engine.transfer(id(1), id(1), dec!(1)).await,
            Err(LedgerError::SelfTransfer(id(1)))
        );
        assert!(engine.store().records().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_accounts() {
        let engine = engine_with(&[(1, dec!(10))]);

        assert_eq!(
            engine.get_balance(id(9)).await,
            Err(LedgerError::AccountNotFound(id(9)))
        );
        assert_eq!(
            engine.deposit(id(9), dec!(1)).await,
            Err(LedgerError::AccountNotFound(id(9)))
        );
        assert_eq!(
            engine.transfer(id(1), id(9), dec!(1)).await,
            Err(LedgerError::AccountNotFound(id(9)))
        );
        assert_eq!(engine.get_balance(id(1)).await.unwrap(), dec!(10));
        assert!(engine.last_transactions(id(9)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failure_at_any_step_rolls_back_transfer() {
        for step in [
            StoreStep::LockBalance,
            StoreStep::UpdateBalance,
            StoreStep::InsertRecord,
            StoreStep::Commit,
        ] {
            let engine = engine_with(&[(1, dec!(100)), (2, dec!(0))]);
            engine.store().inject_failure(step, false);

            let err = engine.transfer(id(1), id(2), dec!(40)).await.unwrap_err();
            assert!(
                matches!(err, LedgerError::Store { step: failed, .. } if failed == step),
                "unexpected error for {step}: {err:?}"
            );
            assert_eq!(engine.get_balance(id(1)).await.unwrap(), dec!(100));
            assert_eq!(engine.get_balance(id(2)).await.unwrap(), dec!(0));
            assert!(engine.store().records().await.is_empty());
        }
    }

    #[tokio::test]
    async fn test_failed_record_insert_rolls_back_deposit() {
        let engine = engine_with(&[(1, dec!(100))]);
        engine.store().inject_failure(StoreStep::InsertRecord, false);

        let err = engine.deposit(id(1), dec!(5)).await.unwrap_err();
        assert_eq!(err.error_code(), "STORE_ERROR");
        assert_eq!(engine.get_balance(id(1)).await.unwrap(), dec!(100));
        assert!(engine.store().records().await.is_empty());
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let observer = Arc::new(RecordingObserver::default());
        let engine = engine_with(&[(1, dec!(100))]).with_observer(observer.clone());
        engine.store().inject_failure(StoreStep::Commit, true);

        engine.deposit(id(1), dec!(1)).await.unwrap();

        assert_eq!(engine.get_balance(id(1)).await.unwrap(), dec!(101));
        assert_eq!(engine.store().records().await.len(), 1);
        assert_eq!(
            observer.events.lock()[..2],
            ["retry deposit #1".to_string(), "ok deposit".to_string()]
        );
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let mut config = EngineConfig::default();
        config.max_retries = 1;
        config.retry_backoff = Duration::from_millis(1);
        let store = MemoryLedgerStore::with_accounts([(id(1), dec!(0))]);
        let engine = LedgerEngine::new(store, config);

        engine.store().inject_failure(StoreStep::Begin, true);
        engine.store().inject_failure(StoreStep::Begin, true);

        let err = engine.deposit(id(1), dec!(1)).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(engine.get_balance(id(1)).await.unwrap(), dec!(0));
    }

    #[tokio::test]
    async fn test_timeout_rolls_back() {
        let mut config = EngineConfig::default();
        config.operation_timeout = Duration::from_millis(50);
        let store = MemoryLedgerStore::with_accounts([(id(1), dec!(10))]);
        let engine = LedgerEngine::new(store.clone(), config);

        // An open unit of work elsewhere holds the store until it is dropped.
        let blocker = store.begin().await.unwrap();
        let err = engine.deposit(id(1), dec!(1)).await.unwrap_err();
        assert_eq!(
            err,
            LedgerError::Timeout {
                operation: "deposit",
                after_ms: 50,
            }
        );
        drop(blocker);

        assert_eq!(engine.get_balance(id(1)).await.unwrap(), dec!(10));
        assert!(store.records().await.is_empty());
    }

    /// Store whose units of work stall before writing a record, after the
    /// balance change has been staged.
    #[derive(Clone)]
    struct StallingStore(MemoryLedgerStore);

    struct StallingUnit(MemoryUnitOfWork);

    #[async_trait]
    impl LedgerStore for StallingStore {
        type Unit = StallingUnit;

        async fn begin(&self) -> Result<StallingUnit> {
            Ok(StallingUnit(self.0.begin().await?))
        }

        async fn read_balance(&self, account: AccountId) -> Result<Decimal> {
            self.0.read_balance(account).await
        }

        async fn list_recent_transactions(
            &self,
            account: AccountId,
            limit: usize,
        ) -> Result<Vec<TransactionRecord>> {
            self.0.list_recent_transactions(account, limit).await
        }

        async fn ping(&self) -> Result<()> {
            self.0.ping().await
        }
    }

    #[async_trait]
    impl UnitOfWork for StallingUnit {
        async fn lock_balance(&mut self, account: AccountId) -> Result<Decimal> {
            self.0.lock_balance(account).await
        }

        async fn apply_balance_delta(&mut self, account: AccountId, delta: Decimal) -> Result<Decimal> {
            self.0.apply_balance_delta(account, delta).await
        }

        async fn append_transaction_record(
            &mut self,
            account: AccountId,
            amount: Decimal,
            kind: TransactionType,
        ) -> Result<TransactionRecord> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            self.0.append_transaction_record(account, amount, kind).await
        }

        async fn commit(self) -> Result<()> {
            self.0.commit().await
        }

        async fn rollback(self) -> Result<()> {
            self.0.rollback().await
        }
    }

    #[tokio::test]
    async fn test_timeout_mid_unit_of_work_leaves_no_trace() {
        let mut config = EngineConfig::default();
        config.operation_timeout = Duration::from_millis(50);
        let memory = MemoryLedgerStore::with_accounts([(id(1), dec!(100)), (id(2), dec!(0))]);
        let engine = LedgerEngine::new(StallingStore(memory.clone()), config);

        let err = engine.deposit(id(1), dec!(5)).await.unwrap_err();
        assert!(matches!(err, LedgerError::Timeout { operation: "deposit", .. }));

        let err = engine.transfer(id(1), id(2), dec!(30)).await.unwrap_err();
        assert!(matches!(err, LedgerError::Timeout { operation: "transfer", .. }));

        assert_eq!(memory.read_balance(id(1)).await.unwrap(), dec!(100));
        assert_eq!(memory.read_balance(id(2)).await.unwrap(), dec!(0));
        assert!(memory.records().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_rollback_still_reports_insufficient_funds() {
        let engine = engine_with(&[(1, dec!(10)), (2, dec!(0))]);
        engine.store().inject_failure(StoreStep::Rollback, true);

        let err = engine.transfer(id(1), id(2), dec!(50)).await.unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientFunds {
                account: id(1),
                required: dec!(50),
                available: dec!(10),
            }
        );
        assert_eq!(engine.get_balance(id(1)).await.unwrap(), dec!(10));
        assert!(engine.store().records().await.is_empty());
    }

    #[tokio::test]
    async fn test_out_of_range_deposit_rejected() {
        let engine = engine_with(&[(1, dec!(0))]);

        for amount in [dec!(1000000000000000000), Decimal::MAX] {
            assert!(matches!(
                engine.deposit(id(1), amount).await,
                Err(LedgerError::InvalidAmount(_))
            ));
        }
        assert_eq!(engine.get_balance(id(1)).await.unwrap(), dec!(0));
    }

    #[tokio::test]
    async fn test_history_is_bounded_and_newest_first() {
        let engine = engine_with(&[(1, dec!(0))]);
        for n in 1..=12 {
            engine.deposit(id(1), Decimal::from(n)).await.unwrap();
        }

        let history = engine.last_transactions(id(1)).await.unwrap();
        assert_eq!(history.len(), 10);
        assert_eq!(history[0].amount, dec!(12));
        assert_eq!(history[9].amount, dec!(3));
        assert!(history.windows(2).all(|w| w[0].id > w[1].id));
    }

    #[tokio::test]
    async fn test_observer_sees_every_outcome() {
        let observer = Arc::new(RecordingObserver::default());
        let engine = engine_with(&[(1, dec!(5)), (2, dec!(0))]).with_observer(observer.clone());

        engine.get_balance(id(1)).await.unwrap();
        let _ = engine.transfer(id(1), id(2), dec!(6)).await;
        let _ = engine.deposit(id(1), dec!(-1)).await;

        assert_eq!(
            *observer.events.lock(),
            vec![
                "ok get_balance".to_string(),
                "failed transfer INSUFFICIENT_FUNDS".to_string(),
                "failed deposit INVALID_AMOUNT".to_string(),
            ]
        );
    }
}
