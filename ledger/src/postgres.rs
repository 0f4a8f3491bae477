//! Postgres ledger store.
//!
//! Balance checks inside a unit of work use `SELECT ... FOR UPDATE`, so a
//! concurrent unit of work touching the same account blocks until this one
//! commits or rolls back, then reads the committed balance.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use tracing::{debug, info};

use finledger_common::{millis, AccountId, LedgerError, RecordId, Result, StoreStep, Timestamp};

use crate::config::StoreConfig;
use crate::record::{TransactionRecord, TransactionType};
use crate::store::{LedgerStore, UnitOfWork};

/// SQLSTATE codes after which the aborted transaction may simply be retried.
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
        sqlx::Error::Database(db) => matches!(
            db.code().as_deref(),
            Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED)
        ),
        _ => false,
    }
}

/// Map a driver error to a store failure tagged with the step and account.
fn store_err(step: StoreStep, account: Option<AccountId>) -> impl FnOnce(sqlx::Error) -> LedgerError {
    move |err| {
        // A pool timeout happens before the step itself ever runs.
        let step = if matches!(err, sqlx::Error::PoolTimedOut) {
            StoreStep::Acquire
        } else {
            step
        };

        if is_transient(&err) {
            LedgerError::transient(step, account, err.to_string())
        } else {
            LedgerError::store(step, account, err.to_string())
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: i64,
    user_id: i64,
    amount: Decimal,
    #[sqlx(rename = "type")]
    kind: String,
    created_at: Timestamp,
}

impl TransactionRow {
    fn into_record(self, step: StoreStep) -> Result<TransactionRecord> {
        let user_id = AccountId::new(self.user_id)
            .map_err(|e| LedgerError::store(step, None, e.to_string()))?;
        let kind = self
            .kind
            .parse::<TransactionType>()
            .map_err(|e| LedgerError::store(step, Some(user_id), e.to_string()))?;

        Ok(TransactionRecord {
            id: RecordId::new(self.id),
            user_id,
            amount: self.amount,
            kind,
            created_at: self.created_at,
        })
    }
}

/// Ledger store backed by a Postgres connection pool.
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    /// Connect a new pool.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        config.validate()?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.database_url)
            .await
            .map_err(store_err(StoreStep::Acquire, None))?;

        info!(
            max_connections = config.max_connections,
            acquire_timeout_ms = millis(config.acquire_timeout),
            "Ledger store connected"
        );

        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the embedded schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| LedgerError::store(StoreStep::Migrate, None, e.to_string()))?;

        info!("Ledger schema up to date");
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    type Unit = PgUnitOfWork;

    async fn begin(&self) -> Result<PgUnitOfWork> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(store_err(StoreStep::Begin, None))?;

        Ok(PgUnitOfWork { tx })
    }

    async fn read_balance(&self, account: AccountId) -> Result<Decimal> {
        sqlx::query_scalar::<_, Decimal>("SELECT balance FROM accounts WHERE id = $1")
            .bind(account.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err(StoreStep::ReadBalance, Some(account)))?
            .ok_or(LedgerError::AccountNotFound(account))
    }

    async fn list_recent_transactions(
        &self,
        account: AccountId,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT id, user_id, amount, type, created_at
            FROM transactions
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(account.get())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(store_err(StoreStep::ListRecords, Some(account)))?;

        rows.into_iter()
            .map(|row| row.into_record(StoreStep::ListRecords))
            .collect()
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(store_err(StoreStep::Acquire, None))?;
        Ok(())
    }
}

/// A Postgres transaction. Dropping it without commit rolls it back.
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn lock_balance(&mut self, account: AccountId) -> Result<Decimal> {
        sqlx::query_scalar::<_, Decimal>("SELECT balance FROM accounts WHERE id = $1 FOR UPDATE")
            .bind(account.get())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(store_err(StoreStep::LockBalance, Some(account)))?
            .ok_or(LedgerError::AccountNotFound(account))
    }

    async fn apply_balance_delta(&mut self, account: AccountId, delta: Decimal) -> Result<Decimal> {
        sqlx::query_scalar::<_, Decimal>(
            "UPDATE accounts SET balance = balance + $1 WHERE id = $2 RETURNING balance",
        )
        .bind(delta)
        .bind(account.get())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(store_err(StoreStep::UpdateBalance, Some(account)))?
        .ok_or(LedgerError::AccountNotFound(account))
    }

    async fn append_transaction_record(
        &mut self,
        account: AccountId,
        amount: Decimal,
        kind: TransactionType,
    ) -> Result<TransactionRecord> {
        let row = sqlx::query_as::<_, TransactionRow>(
            r#"
            INSERT INTO transactions (user_id, amount, type)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, amount, type, created_at
            "#,
        )
        .bind(account.get())
        .bind(amount)
        .bind(kind.as_str())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(store_err(StoreStep::InsertRecord, Some(account)))?;

        row.into_record(StoreStep::InsertRecord)
    }

    async fn commit(self) -> Result<()> {
        self.tx
            .commit()
            .await
            .map_err(store_err(StoreStep::Commit, None))
    }

    async fn rollback(self) -> Result<()> {
        self.tx
            .rollback()
            .await
            .map_err(store_err(StoreStep::Rollback, None))?;
        debug!("Unit of work rolled back");
        Ok(())
    }
}
