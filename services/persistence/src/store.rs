//! Store contract consumed by the trading engine and matching service
//!
//! Implementations are expected to be append-only for orders and trades:
//! records are created once and only their status field transitions
//! afterwards.

use thiserror::Error;
use types::ids::{AccountId, OrderId, Symbol};
use types::numeric::{Price, Quantity};
use types::order::{Order, OrderStatus, OrderType, Side};
use types::trade::Trade;

/// Store failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Order not found: {order_id}")]
    OrderNotFound { order_id: String },

    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Storage failure: {0}")]
    Storage(String),
}

/// Persistence collaborator contract
///
/// The store generates order identifiers; everything downstream (matching,
/// trade records, status transitions) refers back to them.
pub trait OrderStore: Send + Sync {
    /// Register a trading client. Idempotent: reconnecting callers are
    /// looked up, not duplicated.
    fn register_client(&self, account_id: AccountId) -> Result<(), StoreError>;

    /// Persist a new order and return it with its generated id
    ///
    /// Implementations also stamp a monotonic creation sequence onto the
    /// row, so books rebuilt from `load_open_orders` keep a total time
    /// priority among equal prices.
    fn create_order(
        &self,
        account_id: AccountId,
        symbol: Symbol,
        side: Side,
        quantity: Quantity,
        price: Price,
        order_type: OrderType,
    ) -> Result<Order, StoreError>;

    /// Append an executed trade record
    fn record_trade(&self, trade: &Trade) -> Result<(), StoreError>;

    /// Transition an order's status
    fn mark_order_status(&self, order_id: &OrderId, status: OrderStatus)
        -> Result<(), StoreError>;

    /// All orders that are not in a terminal state, for startup rebuild
    fn load_open_orders(&self) -> Result<Vec<Order>, StoreError>;
}
