//! Matching engine core
//!
//! Main coordinator for order books and matching logic. Insert-and-match is
//! a single atomic step per book: trade generation, maker bookkeeping, and
//! remainder insertion all happen before `submit_order` returns, so no
//! caller can observe a half-updated book.

use std::collections::HashMap;
use thiserror::Error;
use types::errors::OrderError;
use types::ids::{OrderId, Symbol};
use types::numeric::Price;
use types::order::{Order, OrderStatus, Side};
use types::trade::Trade;

use crate::book::{AskBook, BidBook};
use crate::matching::{
    crossing,
    executor::{MatchExecutor, MatchParty},
};

/// Main matching engine
pub struct MatchingEngine {
    /// Order books per symbol
    books: HashMap<String, OrderBook>,
    /// Every order currently resting in some book, by id
    ///
    /// The authoritative record for cancel-by-id and restart rebuilds; the
    /// book entries mirror its remaining quantities.
    resting: HashMap<OrderId, Order>,
    /// Acceptance counter: the time-priority tiebreak. Monotonic, never
    /// wall-clock, so priority is total even when two orders arrive within
    /// the same instant.
    order_sequence: u64,
    /// Trade executor with sequence generation
    executor: MatchExecutor,
}

/// Order book for a single symbol
struct OrderBook {
    symbol: Symbol,
    bids: BidBook,
    asks: AskBook,
}

impl OrderBook {
    fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            bids: BidBook::new(),
            asks: AskBook::new(),
        }
    }
}

/// Result of submitting an order
///
/// Trades are ordered oldest first. `maker_updates` lists the status of
/// every resting order the submission touched, in fill order.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub trades: Vec<Trade>,
    /// Post-match snapshot of the submitted order
    pub taker: Order,
    pub maker_updates: Vec<(OrderId, OrderStatus)>,
}

/// Engine errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Invalid order: {0}")]
    InvalidOrder(#[from] OrderError),
}

impl MatchingEngine {
    /// Create a new matching engine with starting trade sequence
    pub fn new(starting_sequence: u64) -> Self {
        Self {
            books: HashMap::new(),
            resting: HashMap::new(),
            order_sequence: 0,
            executor: MatchExecutor::new(starting_sequence),
        }
    }

    /// Submit an order to the matching engine
    ///
    /// This is the main entry point. The order is matched against its
    /// symbol's book; any leftover quantity rests at its price level,
    /// FIFO behind earlier arrivals at the same price.
    pub fn submit_order(
        &mut self,
        mut order: Order,
        timestamp: i64,
    ) -> Result<MatchOutcome, EngineError> {
        order.validate()?;

        self.order_sequence += 1;
        order.sequence = self.order_sequence;

        let symbol_key = order.symbol.as_str().to_string();
        self.books
            .entry(symbol_key.clone())
            .or_insert_with(|| OrderBook::new(order.symbol.clone()));

        // Match the order against the book.
        // Split borrows: book, resting index, and executor are disjoint.
        let mut maker_updates = Vec::new();
        let trades = {
            let book = self.books.get_mut(&symbol_key).unwrap();
            match order.side {
                Side::Buy => Self::match_against_asks(
                    book,
                    &mut self.resting,
                    &mut self.executor,
                    &mut order,
                    &mut maker_updates,
                    timestamp,
                ),
                Side::Sell => Self::match_against_bids(
                    book,
                    &mut self.resting,
                    &mut self.executor,
                    &mut order,
                    &mut maker_updates,
                    timestamp,
                ),
            }
        };

        // Leftover quantity rests in the book
        if !order.is_filled() {
            let book = self.books.get_mut(&symbol_key).unwrap();
            match order.side {
                Side::Buy => book.bids.insert(&order),
                Side::Sell => book.asks.insert(&order),
            }
            self.resting.insert(order.order_id, order.clone());
        }

        debug_assert!(!self.is_crossed(&symbol_key), "Book crossed after match");

        Ok(MatchOutcome {
            trades,
            taker: order,
            maker_updates,
        })
    }

    /// Match incoming buy order against asks
    fn match_against_asks(
        book: &mut OrderBook,
        resting: &mut HashMap<OrderId, Order>,
        executor: &mut MatchExecutor,
        order: &mut Order,
        maker_updates: &mut Vec<(OrderId, OrderStatus)>,
        timestamp: i64,
    ) -> Vec<Trade> {
        let mut trades = Vec::new();

        while let Some((ask_price, ask_level)) = book.asks.best_ask_level_mut() {
            // Check if prices cross
            if !crossing::can_match(order.price, ask_price) {
                break;
            }

            let Some(front) = ask_level.peek_front() else {
                break;
            };

            let match_qty = order.remaining_quantity.min(front.remaining_quantity);

            // Execution price is the maker's price
            let trade = executor.execute_trade(
                book.symbol.clone(),
                Side::Buy,
                MatchParty {
                    order_id: front.order_id,
                    account_id: front.account_id,
                },
                MatchParty {
                    order_id: order.order_id,
                    account_id: order.account_id,
                },
                ask_price,
                match_qty,
                timestamp,
            );
            trades.push(trade);

            order.add_fill(match_qty);

            // Maker record and its book entry move in the same logical step
            // as the trade: a generated trade is never lost.
            let maker = resting
                .get_mut(&front.order_id)
                .expect("Resting maker missing from index");
            maker.add_fill(match_qty);
            let maker_status = maker.status;
            maker_updates.push((front.order_id, maker_status));
            if maker_status == OrderStatus::Filled {
                resting.remove(&front.order_id);
            }

            let new_maker_qty = front.remaining_quantity.saturating_sub(match_qty);
            let level_exhausted = new_maker_qty.is_zero();
            ask_level.update_front_quantity(new_maker_qty);
            if level_exhausted {
                book.asks.prune_best();
            }

            if order.is_filled() {
                break;
            }
        }

        trades
    }

    /// Match incoming sell order against bids
    fn match_against_bids(
        book: &mut OrderBook,
        resting: &mut HashMap<OrderId, Order>,
        executor: &mut MatchExecutor,
        order: &mut Order,
        maker_updates: &mut Vec<(OrderId, OrderStatus)>,
        timestamp: i64,
    ) -> Vec<Trade> {
        let mut trades = Vec::new();

        while let Some((bid_price, bid_level)) = book.bids.best_bid_level_mut() {
            // Check if prices cross
            if !crossing::can_match(bid_price, order.price) {
                break;
            }

            let Some(front) = bid_level.peek_front() else {
                break;
            };

            let match_qty = order.remaining_quantity.min(front.remaining_quantity);

            // Execution price is the maker's price
            let trade = executor.execute_trade(
                book.symbol.clone(),
                Side::Sell,
                MatchParty {
                    order_id: front.order_id,
                    account_id: front.account_id,
                },
                MatchParty {
                    order_id: order.order_id,
                    account_id: order.account_id,
                },
                bid_price,
                match_qty,
                timestamp,
            );
            trades.push(trade);

            order.add_fill(match_qty);

            let maker = resting
                .get_mut(&front.order_id)
                .expect("Resting maker missing from index");
            maker.add_fill(match_qty);
            let maker_status = maker.status;
            maker_updates.push((front.order_id, maker_status));
            if maker_status == OrderStatus::Filled {
                resting.remove(&front.order_id);
            }

            let new_maker_qty = front.remaining_quantity.saturating_sub(match_qty);
            let level_exhausted = new_maker_qty.is_zero();
            bid_level.update_front_quantity(new_maker_qty);
            if level_exhausted {
                book.bids.prune_best();
            }

            if order.is_filled() {
                break;
            }
        }

        trades
    }

    /// Cancel a resting order by id
    ///
    /// Returns whether the order was found resting. Cancelling an already
    /// filled, cancelled, or unknown order is a no-op, not an error:
    /// cancellation races with fills are expected.
    pub fn cancel_order(&mut self, order_id: &OrderId) -> bool {
        let Some(order) = self.resting.get(order_id) else {
            return false;
        };
        let symbol_key = order.symbol.as_str().to_string();
        let side = order.side;
        let price = order.price;

        let book = self
            .books
            .get_mut(&symbol_key)
            .expect("Book missing for resting order");
        let removed = match side {
            Side::Buy => book.bids.remove(order_id, price),
            Side::Sell => book.asks.remove(order_id, price),
        };
        assert!(removed, "Resting order absent from its book");

        let mut order = self
            .resting
            .remove(order_id)
            .expect("Resting order vanished during cancel");
        order.cancel();
        true
    }

    /// Rebuild books from persisted open orders
    ///
    /// The in-memory book is a cache of the store's open-order set, not
    /// durable state; this runs once at startup before any traffic.
    /// Original sequence numbers are preserved so time priority survives
    /// the restart, and the acceptance counter advances past the maximum.
    pub fn restore(&mut self, orders: Vec<Order>) {
        let mut orders: Vec<Order> = orders
            .into_iter()
            .filter(|o| !o.status.is_terminal() && o.remaining_quantity.is_positive())
            .collect();
        orders.sort_by_key(|o| o.sequence);

        for order in orders {
            self.order_sequence = self.order_sequence.max(order.sequence);
            // Trade sequencing resumes above every sequence number already
            // handed out before the restart; the persisted order sequences
            // are the only floor observable from the store.
            self.executor.advance_past(order.sequence);
            let book = self
                .books
                .entry(order.symbol.as_str().to_string())
                .or_insert_with(|| OrderBook::new(order.symbol.clone()));
            match order.side {
                Side::Buy => book.bids.insert(&order),
                Side::Sell => book.asks.insert(&order),
            }
            self.resting.insert(order.order_id, order);
        }
    }

    /// Snapshot of a resting order
    pub fn resting_order(&self, order_id: &OrderId) -> Option<&Order> {
        self.resting.get(order_id)
    }

    /// Number of orders currently resting across all books
    pub fn resting_count(&self) -> usize {
        self.resting.len()
    }

    /// Best bid price for a symbol
    pub fn best_bid(&self, symbol: &str) -> Option<Price> {
        self.books.get(symbol).and_then(|b| b.bids.best_bid_price())
    }

    /// Best ask price for a symbol
    pub fn best_ask(&self, symbol: &str) -> Option<Price> {
        self.books.get(symbol).and_then(|b| b.asks.best_ask_price())
    }

    /// Whether a symbol's book violates the crossed-free-at-rest invariant
    pub fn is_crossed(&self, symbol: &str) -> bool {
        match (self.best_bid(symbol), self.best_ask(symbol)) {
            (Some(bid), Some(ask)) => bid >= ask,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::ids::AccountId;
    use types::numeric::Quantity;
    use types::order::OrderType;

    const TS: i64 = 1708123456789000000;

    fn order(side: Side, price: &str, qty: &str) -> Order {
        Order::new(
            AccountId::new(),
            Symbol::new("AAPL"),
            side,
            Price::from_str(price).unwrap(),
            Quantity::from_str(qty).unwrap(),
            OrderType::Limit,
            TS,
        )
    }

    fn qty(s: &str) -> Quantity {
        Quantity::from_str(s).unwrap()
    }

    #[test]
    fn test_resting_order_no_match() {
        let mut engine = MatchingEngine::new(1000);
        let outcome = engine.submit_order(order(Side::Buy, "150.00", "1.0"), TS).unwrap();

        assert!(outcome.trades.is_empty());
        assert_eq!(outcome.taker.status, OrderStatus::Open);
        assert_eq!(engine.resting_count(), 1);
    }

    #[test]
    fn test_full_match() {
        let mut engine = MatchingEngine::new(1000);
        engine.submit_order(order(Side::Sell, "150.00", "1.0"), TS).unwrap();

        let outcome = engine.submit_order(order(Side::Buy, "150.00", "1.0"), TS + 1).unwrap();

        assert_eq!(outcome.trades.len(), 1);
        assert_eq!(outcome.trades[0].quantity, qty("1.0"));
        assert_eq!(outcome.taker.status, OrderStatus::Filled);
        assert_eq!(engine.resting_count(), 0);
    }

    #[test]
    fn test_partial_fill_remainder_rests() {
        let mut engine = MatchingEngine::new(1000);
        engine.submit_order(order(Side::Sell, "150.00", "0.5"), TS).unwrap();

        let outcome = engine.submit_order(order(Side::Buy, "150.00", "1.0"), TS + 1).unwrap();

        assert_eq!(outcome.trades.len(), 1);
        assert_eq!(outcome.taker.status, OrderStatus::PartiallyFilled);
        assert_eq!(outcome.taker.remaining_quantity, qty("0.5"));
        // The remainder is now the best bid, resting in the book
        assert_eq!(engine.best_bid("AAPL"), Some(Price::from_str("150.00").unwrap()));
        assert!(engine.resting_order(&outcome.taker.order_id).is_some());
    }

    #[test]
    fn test_taker_pays_maker_price() {
        let mut engine = MatchingEngine::new(1);
        let resting = engine.submit_order(order(Side::Sell, "150.00", "100"), TS).unwrap();

        // Incoming buy is willing to pay more; it executes at the resting price
        let outcome = engine.submit_order(order(Side::Buy, "151.00", "60"), TS + 1).unwrap();

        assert_eq!(outcome.trades.len(), 1);
        let trade = &outcome.trades[0];
        assert_eq!(trade.price, Price::from_str("150.00").unwrap());
        assert_eq!(trade.quantity, qty("60"));
        assert_eq!(outcome.taker.status, OrderStatus::Filled);

        // Resting seller keeps 40 and is partially filled
        let maker = engine.resting_order(&resting.taker.order_id).unwrap();
        assert_eq!(maker.remaining_quantity, qty("40"));
        assert_eq!(maker.status, OrderStatus::PartiallyFilled);
        assert_eq!(
            outcome.maker_updates,
            vec![(resting.taker.order_id, OrderStatus::PartiallyFilled)]
        );
    }

    #[test]
    fn test_same_price_fifo_priority() {
        let mut engine = MatchingEngine::new(1);
        let first = engine.submit_order(order(Side::Buy, "100.00", "50"), TS).unwrap();
        let second = engine.submit_order(order(Side::Buy, "100.00", "50"), TS).unwrap();

        let outcome = engine.submit_order(order(Side::Sell, "100.00", "50"), TS).unwrap();

        assert_eq!(outcome.trades.len(), 1);
        // Earlier sequence matched first
        assert_eq!(outcome.trades[0].buy_order_id, first.taker.order_id);
        // The later bid is untouched and fully resting
        let survivor = engine.resting_order(&second.taker.order_id).unwrap();
        assert_eq!(survivor.remaining_quantity, qty("50"));
        assert_eq!(survivor.status, OrderStatus::Open);
        assert!(engine.resting_order(&first.taker.order_id).is_none());
    }

    #[test]
    fn test_sweep_multiple_price_levels() {
        let mut engine = MatchingEngine::new(1);
        engine.submit_order(order(Side::Sell, "150.00", "10"), TS).unwrap();
        engine.submit_order(order(Side::Sell, "151.00", "10"), TS).unwrap();
        engine.submit_order(order(Side::Sell, "152.00", "10"), TS).unwrap();

        let outcome = engine.submit_order(order(Side::Buy, "151.00", "25"), TS).unwrap();

        // Crosses the two cheapest levels in price order, oldest first
        assert_eq!(outcome.trades.len(), 2);
        assert_eq!(outcome.trades[0].price, Price::from_str("150.00").unwrap());
        assert_eq!(outcome.trades[1].price, Price::from_str("151.00").unwrap());
        assert!(outcome.trades[0].sequence < outcome.trades[1].sequence);
        // 5 remain unfilled at 151.00, resting as the best bid
        assert_eq!(outcome.taker.remaining_quantity, qty("5"));
        assert_eq!(engine.best_ask("AAPL"), Some(Price::from_str("152.00").unwrap()));
        assert!(!engine.is_crossed("AAPL"));
    }

    #[test]
    fn test_exhausted_level_does_not_block_deeper_levels() {
        let mut engine = MatchingEngine::new(1);
        engine.submit_order(order(Side::Sell, "150.00", "10"), TS).unwrap();
        engine.submit_order(order(Side::Sell, "151.00", "10"), TS).unwrap();

        // Consume the whole 150.00 level
        engine.submit_order(order(Side::Buy, "150.00", "10"), TS).unwrap();
        // The 151.00 level must now be reachable
        let outcome = engine.submit_order(order(Side::Buy, "151.00", "10"), TS).unwrap();

        assert_eq!(outcome.trades.len(), 1);
        assert_eq!(outcome.trades[0].price, Price::from_str("151.00").unwrap());
        assert_eq!(engine.best_ask("AAPL"), None);
    }

    #[test]
    fn test_invalid_order_rejected() {
        let mut engine = MatchingEngine::new(1);
        let mut bad = order(Side::Buy, "150.00", "1.0");
        bad.quantity = Quantity::zero();
        bad.remaining_quantity = Quantity::zero();

        let result = engine.submit_order(bad, TS);
        assert!(matches!(result, Err(EngineError::InvalidOrder(_))));
        assert_eq!(engine.resting_count(), 0);
    }

    #[test]
    fn test_cancel_resting_order() {
        let mut engine = MatchingEngine::new(1);
        let outcome = engine.submit_order(order(Side::Buy, "150.00", "1.0"), TS).unwrap();
        let order_id = outcome.taker.order_id;

        assert!(engine.cancel_order(&order_id));
        assert_eq!(engine.resting_count(), 0);
        assert_eq!(engine.best_bid("AAPL"), None);

        // Idempotent: second cancel is a no-op
        assert!(!engine.cancel_order(&order_id));
    }

    #[test]
    fn test_cancel_unknown_order() {
        let mut engine = MatchingEngine::new(1);
        assert!(!engine.cancel_order(&OrderId::new()));
    }

    #[test]
    fn test_cancel_filled_order_not_found() {
        let mut engine = MatchingEngine::new(1);
        let sell = engine.submit_order(order(Side::Sell, "150.00", "1.0"), TS).unwrap();
        engine.submit_order(order(Side::Buy, "150.00", "1.0"), TS).unwrap();

        assert!(!engine.cancel_order(&sell.taker.order_id));
    }

    #[test]
    fn test_cancelled_order_never_matches() {
        let mut engine = MatchingEngine::new(1);
        let sell = engine.submit_order(order(Side::Sell, "150.00", "1.0"), TS).unwrap();
        engine.cancel_order(&sell.taker.order_id);

        let outcome = engine.submit_order(order(Side::Buy, "150.00", "1.0"), TS).unwrap();
        assert!(outcome.trades.is_empty());
        assert_eq!(outcome.taker.status, OrderStatus::Open);
    }

    #[test]
    fn test_books_are_per_symbol() {
        let mut engine = MatchingEngine::new(1);
        engine.submit_order(order(Side::Sell, "150.00", "1.0"), TS).unwrap();

        let mut msft = order(Side::Buy, "150.00", "1.0");
        msft.symbol = Symbol::new("MSFT");
        let outcome = engine.submit_order(msft, TS).unwrap();

        // Different symbol: no crossing with the AAPL ask
        assert!(outcome.trades.is_empty());
        assert_eq!(engine.best_bid("MSFT"), Some(Price::from_str("150.00").unwrap()));
        assert_eq!(engine.best_ask("AAPL"), Some(Price::from_str("150.00").unwrap()));
    }

    #[test]
    fn test_restore_preserves_priority() {
        let mut engine = MatchingEngine::new(1);
        let first = engine.submit_order(order(Side::Buy, "100.00", "50"), TS).unwrap();
        let second = engine.submit_order(order(Side::Buy, "100.00", "50"), TS).unwrap();

        // Rebuild a fresh engine from the surviving open orders
        let open_orders = vec![
            engine.resting_order(&second.taker.order_id).unwrap().clone(),
            engine.resting_order(&first.taker.order_id).unwrap().clone(),
        ];
        let mut rebuilt = MatchingEngine::new(1);
        rebuilt.restore(open_orders);
        assert_eq!(rebuilt.resting_count(), 2);

        // Priority still favors the order accepted first, pre-restart
        let outcome = rebuilt.submit_order(order(Side::Sell, "100.00", "50"), TS).unwrap();
        assert_eq!(outcome.trades[0].buy_order_id, first.taker.order_id);

        // New acceptances continue past the restored sequences
        assert!(outcome.taker.sequence > second.taker.sequence);
    }

    #[test]
    fn test_trade_conservation() {
        let mut engine = MatchingEngine::new(1);
        engine.submit_order(order(Side::Sell, "150.00", "30"), TS).unwrap();
        engine.submit_order(order(Side::Sell, "150.00", "30"), TS).unwrap();

        let outcome = engine.submit_order(order(Side::Buy, "150.00", "100"), TS).unwrap();

        let matched: Quantity = outcome
            .trades
            .iter()
            .fold(Quantity::zero(), |acc, t| acc + t.quantity);
        assert_eq!(matched, qty("60"));
        assert_eq!(outcome.taker.filled_quantity, qty("60"));
        assert_eq!(outcome.taker.remaining_quantity, qty("40"));
        assert!(outcome.taker.check_invariant());
    }
}
