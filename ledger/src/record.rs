//! Transaction records: the append-only history behind every balance.

use std::fmt;
use std::str::FromStr;

use finledger_common::{AccountId, RecordId, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A stored type tag that names no known transaction type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown transaction type {0:?}")]
pub struct UnknownTransactionType(pub String);

/// Type of transaction record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Funds added to an account from outside the ledger.
    Deposit,
    /// Credit side of a transfer.
    TransferIn,
    /// Debit side of a transfer.
    TransferOut,
}

impl TransactionType {
    /// Stored and serialized tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "deposit",
            TransactionType::TransferIn => "transfer_in",
            TransactionType::TransferOut => "transfer_out",
        }
    }

    /// Whether records of this type carry a positive amount.
    pub fn is_credit(&self) -> bool {
        !matches!(self, TransactionType::TransferOut)
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = UnknownTransactionType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(TransactionType::Deposit),
            "transfer_in" => Ok(TransactionType::TransferIn),
            "transfer_out" => Ok(TransactionType::TransferOut),
            other => Err(UnknownTransactionType(other.to_string())),
        }
    }
}

/// A single immutable entry in an account's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Store-assigned surrogate id.
    pub id: RecordId,
    /// Account the record belongs to.
    pub user_id: AccountId,
    /// Signed amount: positive for credits, negative for debits.
    pub amount: Decimal,
    /// Record type.
    #[serde(rename = "type")]
    pub kind: TransactionType,
    /// When the record was created.
    pub created_at: Timestamp,
}

impl TransactionRecord {
    /// Check whether this record credits the account.
    pub fn is_credit(&self) -> bool {
        self.amount > Decimal::ZERO
    }
}

/// The pair of records written by a successful transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferReceipt {
    /// `transfer_out` record of the source account.
    pub debit: TransactionRecord,
    /// `transfer_in` record of the destination account.
    pub credit: TransactionRecord,
}

impl TransferReceipt {
    /// Check the two legs offset each other exactly.
    pub fn is_balanced(&self) -> bool {
        self.debit.amount + self.credit.amount == Decimal::ZERO
    }
}
