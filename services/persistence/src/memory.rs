//! In-memory store
//!
//! Reference implementation of the store contract for tests and the
//! single-process demo. A production deployment would put a database behind
//! the same trait.

use crate::store::{OrderStore, StoreError};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use types::ids::{AccountId, OrderId, Symbol};
use types::numeric::{Price, Quantity};
use types::order::{Order, OrderStatus, OrderType, Side};
use types::trade::Trade;

#[derive(Default)]
struct StoreInner {
    clients: HashSet<AccountId>,
    orders: HashMap<OrderId, Order>,
    trades: Vec<Trade>,
    /// Creation counter stamped onto each new order row, the stand-in for
    /// an autoincrement rowid
    next_sequence: u64,
}

/// In-memory [`OrderStore`]
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<StoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn now_nanos() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as i64)
            .unwrap_or(0)
    }

    /// Snapshot of one order row (test observability)
    pub fn order(&self, order_id: &OrderId) -> Option<Order> {
        self.inner.lock().unwrap().orders.get(order_id).cloned()
    }

    /// All recorded trades, in append order (test observability)
    pub fn trades(&self) -> Vec<Trade> {
        self.inner.lock().unwrap().trades.clone()
    }

    /// Number of registered clients (test observability)
    pub fn client_count(&self) -> usize {
        self.inner.lock().unwrap().clients.len()
    }
}

impl OrderStore for MemoryStore {
    fn register_client(&self, account_id: AccountId) -> Result<(), StoreError> {
        self.inner.lock().unwrap().clients.insert(account_id);
        Ok(())
    }

    fn create_order(
        &self,
        account_id: AccountId,
        symbol: Symbol,
        side: Side,
        quantity: Quantity,
        price: Price,
        order_type: OrderType,
    ) -> Result<Order, StoreError> {
        let mut order = Order::new(
            account_id,
            symbol,
            side,
            price,
            quantity,
            order_type,
            Self::now_nanos(),
        );
        let mut inner = self.inner.lock().unwrap();
        inner.next_sequence += 1;
        order.sequence = inner.next_sequence;
        inner.orders.insert(order.order_id, order.clone());
        Ok(order)
    }

    fn record_trade(&self, trade: &Trade) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();

        // Mirror the fill onto the order rows so a later load_open_orders
        // reflects true remaining quantities.
        for order_id in [trade.buy_order_id, trade.sell_order_id] {
            if let Some(order) = inner.orders.get_mut(&order_id) {
                order.add_fill(trade.quantity);
            }
        }

        inner.trades.push(trade.clone());
        Ok(())
    }

    fn mark_order_status(
        &self,
        order_id: &OrderId,
        status: OrderStatus,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let order = inner
            .orders
            .get_mut(order_id)
            .ok_or_else(|| StoreError::OrderNotFound {
                order_id: order_id.to_string(),
            })?;
        order.status = status;
        Ok(())
    }

    fn load_open_orders(&self) -> Result<Vec<Order>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut open: Vec<Order> = inner
            .orders
            .values()
            .filter(|o| !o.status.is_terminal())
            .cloned()
            .collect();
        open.sort_by_key(|o| o.sequence);
        Ok(open)
    }
}
