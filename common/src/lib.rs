//! FinLedger Common Types
//!
//! Shared types used across the ledger crates: account and record
//! identifiers, the validated monetary amount, and the error taxonomy.

pub mod identifiers;
pub mod monetary;
pub mod error;
pub mod time;

pub use identifiers::*;
pub use monetary::*;
pub use error::*;
pub use time::*;
