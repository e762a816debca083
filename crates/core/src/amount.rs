//! Amount - Non-negative decimal wrapper for peso amounts
//!
//! Every raw input of a declaration (incomes, deductions, credits) is
//! non-negative. This is enforced at the type level; derived rows that can go
//! negative (the net balance) are plain `Decimal`s inside the engine.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use thiserror::Error;

/// Upper bound accepted for a single monetary input: 999_999_999_999
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(3_567_587_327, 232, 0, false, 0);

/// Errors that can occur when working with amounts
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("Amount cannot be negative: {0}")]
    NegativeAmount(Decimal),

    #[error("Amount exceeds the accepted maximum: {0}")]
    TooLarge(Decimal),
}

/// A non-negative decimal amount.
///
/// # Invariant
/// The inner value is always >= 0 and <= [`MAX_AMOUNT`]. This is enforced by
/// the constructor and by deserialization.
///
/// # Example
/// ```
/// use ica_core::Amount;
/// use rust_decimal::Decimal;
///
/// let amount = Amount::new(Decimal::new(100, 0)).unwrap();
/// assert_eq!(amount.value(), Decimal::new(100, 0));
///
/// // Negative amounts are rejected
/// let negative = Amount::new(Decimal::new(-100, 0));
/// assert!(negative.is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    /// Zero amount constant
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create a new Amount from a Decimal.
    pub fn new(value: Decimal) -> Result<Self, AmountError> {
        if value < Decimal::ZERO {
            Err(AmountError::NegativeAmount(value))
        } else if value > MAX_AMOUNT {
            Err(AmountError::TooLarge(value))
        } else {
            Ok(Self(value))
        }
    }

    /// Get the inner Decimal value
    #[inline]
    pub const fn value(&self) -> Decimal {
        self.0
    }

    /// Check if the amount is zero
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = AmountError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl Default for Amount {
    fn default() -> Self {
        Self::ZERO
    }
}

impl<'a> Sum<&'a Amount> for Decimal {
    fn sum<I: Iterator<Item = &'a Amount>>(iter: I) -> Self {
        iter.fold(Decimal::ZERO, |acc, a| acc + a.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_amount_positive() {
        let amount = Amount::new(dec!(100)).unwrap();
        assert_eq!(amount.value(), dec!(100));
    }

    #[test]
    fn test_amount_negative_rejected() {
        let result = Amount::new(dec!(-0.01));
        assert!(matches!(result, Err(AmountError::NegativeAmount(_))));
    }

    #[test]
    fn test_max_amount_boundary() {
        assert_eq!(MAX_AMOUNT, dec!(999_999_999_999));
        assert!(Amount::new(MAX_AMOUNT).is_ok());
        assert!(matches!(
            Amount::new(MAX_AMOUNT + dec!(1)),
            Err(AmountError::TooLarge(_))
        ));
    }

    #[test]
    fn test_sum_of_amounts() {
        let parts = [
            Amount::new(dec!(10)).unwrap(),
            Amount::new(dec!(20)).unwrap(),
            Amount::new(dec!(5)).unwrap(),
        ];
        let total: Decimal = parts.iter().sum();
        assert_eq!(total, dec!(35));
    }

    #[test]
    fn test_deserialize_rejects_negative() {
        let parsed: Result<Amount, _> = serde_json::from_str("\"-5\"");
        assert!(parsed.is_err());

        let parsed: Amount = serde_json::from_str("\"1500.50\"").unwrap();
        assert_eq!(parsed.value(), dec!(1500.50));
    }
}
