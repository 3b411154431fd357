//! Trade execution types
//!
//! A trade is created exactly once per match event and is immutable
//! afterwards; the matching engine never references it again.

use crate::ids::{AccountId, OrderId, Symbol, TradeId};
use crate::numeric::{Price, Quantity};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An executed match between one buy and one sell order
///
/// The execution price is always the resting (maker) order's price, so the
/// incoming order receives any price improvement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: TradeId,
    /// Global monotonic sequence within the engine that produced the trade
    pub sequence: u64,
    pub symbol: Symbol,

    // Order references
    pub buy_order_id: OrderId,
    pub sell_order_id: OrderId,

    // Account references
    pub buy_account_id: AccountId,
    pub sell_account_id: AccountId,

    pub price: Price,
    pub quantity: Quantity,

    pub executed_at: i64, // Unix nanos
}

impl Trade {
    /// Create a new trade
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sequence: u64,
        symbol: Symbol,
        buy_order_id: OrderId,
        sell_order_id: OrderId,
        buy_account_id: AccountId,
        sell_account_id: AccountId,
        price: Price,
        quantity: Quantity,
        executed_at: i64,
    ) -> Self {
        Self {
            trade_id: TradeId::new(),
            sequence,
            symbol,
            buy_order_id,
            sell_order_id,
            buy_account_id,
            sell_account_id,
            price,
            quantity,
            executed_at,
        }
    }

    /// Calculate trade value (price × quantity)
    pub fn trade_value(&self) -> Decimal {
        self.quantity.as_decimal() * self.price.as_decimal()
    }
}
