//! Price level with FIFO queue
//!
//! A price level contains all resting orders at one price point. Orders are
//! kept in acceptance-sequence order, so the front of the queue is always
//! the entry with time priority at this price.

use std::collections::VecDeque;
use types::ids::{AccountId, OrderId};
use types::numeric::Quantity;

/// A price level containing orders at a specific price
///
/// Entries are enqueued in acceptance order and only ever consumed from the
/// front, which enforces the sequence tiebreak among equal prices.
#[derive(Debug, Clone)]
pub struct PriceLevel {
    /// Queue of orders at this price level (FIFO order)
    orders: VecDeque<OrderEntry>,
    /// Total quantity available at this level
    total_quantity: Quantity,
}

/// Entry in the price level queue
#[derive(Debug, Clone)]
struct OrderEntry {
    order_id: OrderId,
    account_id: AccountId,
    sequence: u64,
    remaining_quantity: Quantity,
}

/// Front-of-level view handed to the matching loop
#[derive(Debug, Clone, Copy)]
pub struct LevelFront {
    pub order_id: OrderId,
    pub account_id: AccountId,
    pub sequence: u64,
    pub remaining_quantity: Quantity,
}

impl PriceLevel {
    /// Create a new empty price level
    pub fn new() -> Self {
        Self {
            orders: VecDeque::new(),
            total_quantity: Quantity::zero(),
        }
    }

    /// Insert an order at the back of the queue (time priority)
    ///
    /// # Panics
    /// Panics if the order would break sequence ordering within the level.
    pub fn insert(
        &mut self,
        order_id: OrderId,
        account_id: AccountId,
        sequence: u64,
        quantity: Quantity,
    ) {
        if let Some(back) = self.orders.back() {
            assert!(
                back.sequence < sequence,
                "Price level FIFO order violated: {} after {}",
                sequence,
                back.sequence
            );
        }
        self.orders.push_back(OrderEntry {
            order_id,
            account_id,
            sequence,
            remaining_quantity: quantity,
        });
        self.total_quantity = self.total_quantity + quantity;
    }

    /// Remove an order from the queue by OrderId
    ///
    /// Returns the remaining quantity of the removed order, or None if not found
    pub fn remove(&mut self, order_id: &OrderId) -> Option<Quantity> {
        let position = self
            .orders
            .iter()
            .position(|entry| &entry.order_id == order_id)?;
        let entry = self.orders.remove(position)?;

        self.total_quantity = self.total_quantity.saturating_sub(entry.remaining_quantity);
        Some(entry.remaining_quantity)
    }

    /// Peek at the front order without removing it
    pub fn peek_front(&self) -> Option<LevelFront> {
        self.orders.front().map(|entry| LevelFront {
            order_id: entry.order_id,
            account_id: entry.account_id,
            sequence: entry.sequence,
            remaining_quantity: entry.remaining_quantity,
        })
    }

    /// Update the remaining quantity for the front order
    ///
    /// Used when the front order is partially or fully filled. A zero
    /// quantity removes the entry; price and sequence are untouched, so no
    /// re-sort is ever needed.
    pub fn update_front_quantity(&mut self, new_quantity: Quantity) -> bool {
        if let Some(entry) = self.orders.front_mut() {
            let old_quantity = entry.remaining_quantity;

            if new_quantity.is_zero() {
                self.orders.pop_front();
            } else {
                entry.remaining_quantity = new_quantity;
            }

            self.total_quantity = Quantity::try_new(
                self.total_quantity.as_decimal() - old_quantity.as_decimal()
                    + new_quantity.as_decimal(),
            )
            .unwrap_or_else(Quantity::zero);

            true
        } else {
            false
        }
    }

    /// Check if the price level is empty
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Get the total quantity at this price level
    pub fn total_quantity(&self) -> Quantity {
        self.total_quantity
    }

    /// Get the number of orders at this level
    pub fn order_count(&self) -> usize {
        self.orders.len()
    }
}

impl Default for PriceLevel {
    fn default() -> Self {
        Self::new()
    }
}
