//! FinLedger HTTP Service
//!
//! JSON routes over the ledger service, plus configuration, logging and
//! metrics for the `finledger` binary.

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod routes;

pub use config::ServerConfig;
pub use error::ApiError;
pub use logging::LogFormat;
pub use metrics::{LedgerMetrics, MetricsSnapshot, OperationCounters, OperationSnapshot};
pub use routes::{router, AppState};
