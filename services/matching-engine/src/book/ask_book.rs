//! Ask (sell-side) order book
//!
//! Maintains sell orders sorted by price ascending (best ask first).
//! Uses BTreeMap for deterministic iteration order.

use std::collections::BTreeMap;
use types::ids::OrderId;
use types::numeric::{Price, Quantity};
use types::order::Order;

use super::price_level::{LevelFront, PriceLevel};

/// Ask (sell) side order book
///
/// Orders are sorted by price ascending, so the lowest ask is first.
/// At each price level, orders are maintained in FIFO order by acceptance
/// sequence.
#[derive(Debug, Clone)]
pub struct AskBook {
    /// Price levels sorted ascending (lowest price first)
    /// Using BTreeMap ensures deterministic iteration
    levels: BTreeMap<Price, PriceLevel>,
}

impl AskBook {
    /// Create a new empty ask book
    pub fn new() -> Self {
        Self {
            levels: BTreeMap::new(),
        }
    }

    /// Insert an order into the ask book
    pub fn insert(&mut self, order: &Order) {
        let level = self.levels.entry(order.price).or_default();
        level.insert(
            order.order_id,
            order.account_id,
            order.sequence,
            order.remaining_quantity,
        );
    }

    /// Remove an order from the ask book
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

    /// Get the best ask (lowest price)
    pub fn best_ask(&self) -> Option<(Price, Quantity)> {
        // BTreeMap iter is ascending, so first gives us lowest price
        self.levels
            .iter()
            .next()
            .map(|(price, level)| (*price, level.total_quantity()))
    }

    /// Get the best ask price
    pub fn best_ask_price(&self) -> Option<Price> {
        self.levels.keys().next().copied()
    }

    /// Front order of the best ask level
    pub fn best_front(&self) -> Option<(Price, LevelFront)> {
        self.levels
            .iter()
            .next()
            .and_then(|(price, level)| level.peek_front().map(|front| (*price, front)))
    }

    /// Get mutable reference to the best ask level
    pub(crate) fn best_ask_level_mut(&mut self) -> Option<(Price, &mut PriceLevel)> {
        self.levels
            .iter_mut()
            .next()
            .map(|(price, level)| (*price, level))
    }

    /// Drop the best level if it has been emptied
    pub(crate) fn prune_best(&mut self) {
        if let Some((price, level)) = self.levels.iter().next() {
            if level.is_empty() {
                let price = *price;
                self.levels.remove(&price);
            }
        }
    }

    /// Check if the ask book is empty
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Get the total number of price levels
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }
}

impl Default for AskBook {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::ids::{AccountId, Symbol};
    use types::order::{OrderType, Side};

    fn create_test_order(price: &str, qty: &str, sequence: u64) -> Order {
        let mut order = Order::new(
            AccountId::new(),
            Symbol::new("AAPL"),
            Side::Sell,
            Price::from_str(price).unwrap(),
            Quantity::from_str(qty).unwrap(),
            OrderType::Limit,
            1708123456789000000,
        );
        order.sequence = sequence;
        order
    }

    #[test]
    fn test_ask_book_best_ask_is_lowest_price() {
        let mut book = AskBook::new();

        book.insert(&create_test_order("150.00", "1.0", 1));
        book.insert(&create_test_order("149.00", "2.0", 2)); // Lower price
        book.insert(&create_test_order("151.00", "1.5", 3)); // Higher price

        let (best_price, best_qty) = book.best_ask().unwrap();
        assert_eq!(best_price, Price::from_str("149.00").unwrap()); // Lowest price
        assert_eq!(best_qty, Quantity::from_str("2.0").unwrap());
    }

    #[test]
    fn test_ask_book_remove_prunes_empty_level() {
        let mut book = AskBook::new();
        let order = create_test_order("150.00", "1.0", 1);
        let order_id = order.order_id;
        let price = order.price;

        book.insert(&order);
        assert!(book.remove(&order_id, price));
        assert!(book.is_empty());
        assert_eq!(book.level_count(), 0);
    }

    #[test]
    fn test_ask_book_same_price_fifo() {
        let mut book = AskBook::new();

        let order1 = create_test_order("150.00", "1.0", 1);
        let order2 = create_test_order("150.00", "2.0", 2);

        book.insert(&order1);
        book.insert(&order2);

        let (_, front) = book.best_front().unwrap();
        assert_eq!(front.order_id, order1.order_id);
    }
}
