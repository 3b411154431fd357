//! Order lifecycle types
//!
//! An order is owned by the matching engine while it rests in a book; once
//! fully filled or cancelled it is removed and survives only as an immutable
//! record in the persistence store.

use crate::errors::OrderError;
use crate::ids::{AccountId, OrderId, Symbol};
use crate::numeric::{Price, Quantity};
use serde::{Deserialize, Serialize};

/// Order side (buyer or seller)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Buy order (bid)
    Buy,
    /// Sell order (ask)
    Sell,
}

impl Side {
    /// Get the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// Order type carried on the wire
///
/// The matching engine applies limit semantics to both; `market` is accepted
/// and recorded for forward compatibility but not priced differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Limit,
    Market,
}

impl Default for OrderType {
    fn default() -> Self {
        OrderType::Limit
    }
}

/// Order status over its lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Accepted, resting unmatched
    Open,
    /// Partially matched, remainder resting
    PartiallyFilled,
    /// Completely matched (terminal)
    Filled,
    /// Cancelled before completion (terminal)
    Cancelled,
}

impl OrderStatus {
    /// Check if status is terminal (no further transitions possible)
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::Cancelled)
    }
}

/// Complete order structure
///
/// `sequence` is the engine-assigned acceptance number used as the
/// time-priority tiebreak. It is monotonic per engine and never derived from
/// wall-clock time, so priority is total even under clock skew.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub account_id: AccountId,
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Price,
    pub quantity: Quantity,
    pub filled_quantity: Quantity,
    pub remaining_quantity: Quantity,
    pub status: OrderStatus,
    pub sequence: u64,
    pub created_at: i64, // Unix nanos
}

impl Order {
    /// Create a new open order with a fresh id
    pub fn new(
        account_id: AccountId,
        symbol: Symbol,
        side: Side,
        price: Price,
        quantity: Quantity,
        order_type: OrderType,
        timestamp: i64,
    ) -> Self {
        Self::with_id(
            OrderId::new(),
            account_id,
            symbol,
            side,
            price,
            quantity,
            order_type,
            timestamp,
        )
    }

    /// Create a new open order with a caller-supplied id
    ///
    /// Used when the id was already generated by the persistence store and
    /// the order is being reconstructed for submission to the engine.
    #[allow(clippy::too_many_arguments)]
    pub fn with_id(
        order_id: OrderId,
        account_id: AccountId,
        symbol: Symbol,
        side: Side,
        price: Price,
        quantity: Quantity,
        order_type: OrderType,
        timestamp: i64,
    ) -> Self {
        Self {
            order_id,
            account_id,
            symbol,
            side,
            order_type,
            price,
            quantity,
            filled_quantity: Quantity::zero(),
            remaining_quantity: quantity,
            status: OrderStatus::Open,
            sequence: 0,
            created_at: timestamp,
        }
    }

    /// Validate the order shape before it may enter a book
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.symbol.as_str().is_empty() {
            return Err(OrderError::InvalidSymbol("<empty>".to_string()));
        }
        if !self.quantity.is_positive() {
            return Err(OrderError::InvalidQuantity(self.quantity.to_string()));
        }
        if !self.price.is_positive() {
            return Err(OrderError::InvalidPrice(self.price.to_string()));
        }
        Ok(())
    }

    /// Check quantity invariant: filled + remaining = total
    pub fn check_invariant(&self) -> bool {
        self.filled_quantity.as_decimal() + self.remaining_quantity.as_decimal()
            == self.quantity.as_decimal()
    }

    /// Check if order is completely filled
    pub fn is_filled(&self) -> bool {
        self.filled_quantity == self.quantity
    }

    /// Check if order has any fills
    pub fn has_fills(&self) -> bool {
        !self.filled_quantity.is_zero()
    }

    /// Update filled quantity and adjust status
    ///
    /// # Panics
    /// Panics if the fill would exceed total quantity or violate invariants.
    /// An overfill is a matching bug, never a recoverable condition.
    pub fn add_fill(&mut self, fill_quantity: Quantity) {
        let new_filled = self.filled_quantity + fill_quantity;

        assert!(
            new_filled.as_decimal() <= self.quantity.as_decimal(),
            "Fill would exceed order quantity"
        );

        self.filled_quantity = new_filled;
        self.remaining_quantity = self.quantity.saturating_sub(new_filled);

        if self.is_filled() {
            self.status = OrderStatus::Filled;
        } else if self.has_fills() {
            self.status = OrderStatus::PartiallyFilled;
        }

        assert!(self.check_invariant(), "Invariant violated after fill");
    }

    /// Cancel the order
    ///
    /// # Panics
    /// Panics if order is already in terminal state
    pub fn cancel(&mut self) {
        assert!(!self.status.is_terminal(), "Cannot cancel terminal order");
        self.status = OrderStatus::Cancelled;
    }
}
