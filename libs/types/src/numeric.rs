//! Fixed-point decimal types for prices and quantities
//!
//! Uses rust_decimal for deterministic arithmetic (no floating-point errors).
//! Prices must be strictly positive; quantities must be non-negative, with
//! strict positivity enforced at order validation.

use crate::errors::NumericError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;

/// Limit price of an order
///
/// Ordered so it can key a price-sorted book directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    /// Create from a whole-number price
    pub fn from_u64(value: u64) -> Self {
        Self(Decimal::from(value))
    }

    /// Create from a decimal, rejecting zero and negative values
    pub fn try_new(value: Decimal) -> Option<Self> {
        if value > Decimal::ZERO {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Parse from a decimal string (e.g. "150.00")
    pub fn from_str(s: &str) -> Result<Self, NumericError> {
        let value: Decimal = s
            .parse()
            .map_err(|_| NumericError::InvalidDecimal(s.to_string()))?;
        Self::try_new(value).ok_or(NumericError::NotPositive)
    }

    /// Get the inner decimal value
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Check strict positivity
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Order or trade quantity
///
/// Non-negative by construction; zero marks a fully consumed remainder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(Decimal);

impl Quantity {
    /// The zero quantity
    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Create from a decimal, rejecting negative values
    pub fn try_new(value: Decimal) -> Option<Self> {
        if value >= Decimal::ZERO {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Parse from a decimal string (e.g. "100.0")
    pub fn from_str(s: &str) -> Result<Self, NumericError> {
        let value: Decimal = s
            .parse()
            .map_err(|_| NumericError::InvalidDecimal(s.to_string()))?;
        Self::try_new(value).ok_or(NumericError::Negative)
    }

    /// Get the inner decimal value
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Check whether the quantity is zero
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Check strict positivity
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// The smaller of two quantities
    pub fn min(self, other: Self) -> Self {
        if self.0 <= other.0 {
            self
        } else {
            other
        }
    }

    /// Subtract, saturating at zero
    ///
    /// Fill arithmetic never legitimately underflows; the saturation mirrors
    /// the invariant `0 <= remaining <= quantity`.
    pub fn saturating_sub(self, other: Self) -> Self {
        Self::try_new(self.0 - other.0).unwrap_or_else(Quantity::zero)
    }
}

impl Add for Quantity {
    type Output = Quantity;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
