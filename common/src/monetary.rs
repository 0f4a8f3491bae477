//! Monetary types for the ledger.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{LedgerError, Result};

/// Maximum number of fractional digits an amount may carry.
/// Matches the `NUMERIC(20,2)` balance and amount columns.
pub const MAX_SCALE: u32 = 2;

/// Exclusive upper bound of an amount or balance: the largest magnitude a
/// `NUMERIC(20,2)` column holds is just below 10^18.
pub fn max_amount() -> Decimal {
    Decimal::new(1_000_000_000_000_000_000, 0)
}

/// A strictly positive monetary amount.
///
/// The only way to obtain an `Amount` is through [`Amount::new`] or
/// [`Amount::parse`], so holding one proves the value was validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Amount(Decimal);

impl Amount {
    /// Validate a decimal as a transferable amount.
    pub fn new(value: Decimal) -> Result<Self> {
        if value <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(format!(
                "amount must be greater than zero, got {}",
                value
            )));
        }

        if value >= max_amount() {
            return Err(LedgerError::InvalidAmount(format!(
                "amount {} must be below {}",
                value,
                max_amount()
            )));
        }

        if value.normalize().scale() > MAX_SCALE {
            return Err(LedgerError::InvalidAmount(format!(
                "amount {} has more than {} decimal places",
                value, MAX_SCALE
            )));
        }

        Ok(Self(value))
    }

    /// Parse and validate an amount from text.
    pub fn parse(s: &str) -> Result<Self> {
        let value = Decimal::from_str(s.trim())
            .map_err(|_| LedgerError::InvalidAmount(format!("not a decimal amount: {:?}", s)))?;
        Self::new(value)
    }

    /// Get the (positive) decimal value.
    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Signed value of a debit of this amount.
    pub fn negated(&self) -> Decimal {
        -self.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = LedgerError;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = <Decimal as Deserialize>::deserialize(deserializer)?;
        Amount::new(value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_positive_amounts_accepted() {
        assert_eq!(Amount::new(dec!(0.01)).unwrap().value(), dec!(0.01));
        assert_eq!(Amount::new(dec!(150)).unwrap().value(), dec!(150));
        // Trailing zeros do not count against the scale limit.
        assert!(Amount::new(dec!(10.5000)).is_ok());
    }

    #[test]
    fn test_non_positive_amounts_rejected() {
        assert!(matches!(Amount::new(Decimal::ZERO), Err(LedgerError::InvalidAmount(_))));
        assert!(matches!(Amount::new(dec!(-5)), Err(LedgerError::InvalidAmount(_))));
    }

    #[test]
    fn test_over_precise_amount_rejected() {
        assert!(matches!(Amount::new(dec!(1.001)), Err(LedgerError::InvalidAmount(_))));
    }

    #[test]
    fn test_out_of_range_amount_rejected() {
        assert!(Amount::new(dec!(999999999999999999.99)).is_ok());
        assert!(matches!(
            Amount::new(dec!(1000000000000000000)),
            Err(LedgerError::InvalidAmount(_))
        ));
        assert!(matches!(Amount::new(Decimal::MAX), Err(LedgerError::InvalidAmount(_))));
    }

    #[test]
    fn test_parse() {
        assert_eq!(Amount::parse(" 50.00 ").unwrap().value(), dec!(50));
        assert!(Amount::parse("fifty").is_err());
        assert!(Amount::parse("-1").is_err());
    }

    #[test]
    fn test_negated() {
        let amount = Amount::new(dec!(25.50)).unwrap();
        assert_eq!(amount.negated(), dec!(-25.50));
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: Amount = serde_json::from_str("\"12.34\"").unwrap();
        assert_eq!(ok.value(), dec!(12.34));
        assert!(serde_json::from_str::<Amount>("\"0\"").is_err());
        assert!(serde_json::from_str::<Amount>("\"1000000000000000000\"").is_err());
    }
}
