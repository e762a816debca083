//! Typed rates
//!
//! Activity rates are always per-mille (‰); municipal surcharges and payment
//! adjustments are always percentages. Keeping them as distinct types means
//! a per-mille rate can only ever be divided by 1000.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

const ONE_HUNDRED: Decimal = Decimal::ONE_HUNDRED;
const ONE_THOUSAND: Decimal = Decimal::ONE_THOUSAND;

/// A rate expressed per thousand (‰).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PerMille(Decimal);

impl PerMille {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub const fn new(value: Decimal) -> Self {
        Self(value)
    }

    #[inline]
    pub const fn value(&self) -> Decimal {
        self.0
    }

    /// `base × rate / 1000`, full precision.
    pub fn apply(&self, base: Decimal) -> Decimal {
        base * self.0 / ONE_THOUSAND
    }
}

impl fmt::Display for PerMille {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}‰", self.0)
    }
}

/// A rate expressed per hundred (%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Percent(Decimal);

impl Percent {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub const fn new(value: Decimal) -> Self {
        Self(value)
    }

    #[inline]
    pub const fn value(&self) -> Decimal {
        self.0
    }

    /// `base × rate / 100`, full precision.
    pub fn apply(&self, base: Decimal) -> Decimal {
        base * self.0 / ONE_HUNDRED
    }
}

impl fmt::Display for Percent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}
