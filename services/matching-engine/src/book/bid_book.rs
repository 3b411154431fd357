//! Bid (buy-side) order book
//!
//! Maintains buy orders sorted by price descending (best bid first).
//! Uses BTreeMap for deterministic iteration order.

use std::collections::BTreeMap;
use types::ids::OrderId;
use types::numeric::{Price, Quantity};
use types::order::Order;

use super::price_level::{LevelFront, PriceLevel};

/// Bid (buy) side order book
///
/// Orders are sorted by price descending, so the highest bid is first.
/// At each price level, orders are maintained in FIFO order by acceptance
/// sequence.
#[derive(Debug, Clone)]
pub struct BidBook {
    /// Price levels sorted descending (highest price first)
    /// Using BTreeMap ensures deterministic iteration
    levels: BTreeMap<Price, PriceLevel>,
}

impl BidBook {
    /// Create a new empty bid book
    pub fn new() -> Self {
        Self {
            levels: BTreeMap::new(),
        }
    }

    /// Insert an order into the bid book
    pub fn insert(&mut self, order: &Order) {
        let level = self.levels.entry(order.price).or_default();
        level.insert(
            order.order_id,
            order.account_id,
            order.sequence,
            order.remaining_quantity,
        );
    }

    /// Remove an order from the bid book
    ///
    /// Returns true if the order was found and removed
    pub fn remove(&mut self, order_id: &OrderId, price: Price) -> bool {
        if let Some(level) = self.levels.get_mut(&price) {
            if level.remove(order_id).is_some() {
                // Remove empty price levels to keep book clean
                if level.is_empty() {
                    self.levels.remove(&price);
                }
                return true;
            }
        }
        false
    }

    /// Get the best bid (highest price)
    pub fn best_bid(&self) -> Option<(Price, Quantity)> {
        // BTreeMap iter is ascending, so we need last()
        self.levels
            .iter()
            .next_back()
            .map(|(price, level)| (*price, level.total_quantity()))
    }

    /// Get the best bid price
    pub fn best_bid_price(&self) -> Option<Price> {
        self.levels.keys().next_back().copied()
    }

    /// Front order of the best bid level
    pub fn best_front(&self) -> Option<(Price, LevelFront)> {
        self.levels
            .iter()
            .next_back()
            .and_then(|(price, level)| level.peek_front().map(|front| (*price, front)))
    }

    /// Get mutable reference to the best bid level
    pub(crate) fn best_bid_level_mut(&mut self) -> Option<(Price, &mut PriceLevel)> {
        self.levels
            .iter_mut()
            .next_back()
            .map(|(price, level)| (*price, level))
    }

    /// Drop the best level if it has been emptied
    pub(crate) fn prune_best(&mut self) {
        if let Some((price, level)) = self.levels.iter().next_back() {
            if level.is_empty() {
                let price = *price;
                self.levels.remove(&price);
            }
        }
    }

    /// Check if the bid book is empty
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Get the total number of price levels
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }
}

impl Default for BidBook {
    fn default() -> Self {
        Self::new()
    }
}
