//! FinLedger Ledger Engine
//!
//! Balance mutations over a transactional store: every deposit or transfer
//! changes balances and appends its transaction records in one unit of work,
//! and no balance ever goes negative.

pub mod config;
pub mod engine;
pub mod facade;
pub mod memory;
pub mod observer;
pub mod postgres;
pub mod record;
pub mod store;

pub use config::{EngineConfig, StoreConfig};
pub use engine::LedgerEngine;
pub use facade::LedgerService;
pub use memory::{MemoryLedgerStore, MemoryUnitOfWork};
pub use observer::{LedgerObserver, Operation, OperationEvent, TracingObserver};
pub use postgres::{PgLedgerStore, PgUnitOfWork};
pub use record::{TransactionRecord, TransactionType, TransferReceipt, UnknownTransactionType};
pub use store::{LedgerStore, UnitOfWork};
