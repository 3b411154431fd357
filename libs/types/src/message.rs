//! Wire messages carried over the broker
//!
//! Envelope metadata (reply queue, correlation id) rides on the broker
//! message properties; the JSON payload is one of these request or response
//! shapes, dispatched on its `action` field.

use crate::ids::{AccountId, OrderId, Symbol};
use crate::numeric::{Price, Quantity};
use crate::order::{OrderType, Side};
use crate::trade::Trade;
use serde::{Deserialize, Serialize};

/// Error reason for requests whose action no handler understands
pub const REASON_UNKNOWN_ACTION: &str = "unknown_action";
/// Error reason when the matching service cannot be reached in time
pub const REASON_DOWNSTREAM_UNAVAILABLE: &str = "downstream_unavailable";

/// Request payload, dispatched on `action`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Request {
    Connect(ConnectRequest),
    PlaceOrder(PlaceOrderRequest),
    CancelOrder(CancelOrderRequest),
    /// Legacy alias: place_order with side fixed to buy
    Buy(LegacyOrderRequest),
    /// Legacy alias: place_order with side fixed to sell
    Sell(LegacyOrderRequest),
}

/// Liveness/handshake request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectRequest {
    pub caller_id: AccountId,
    /// Caller's clock, Unix seconds; echoed in the acknowledgement
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Order placement request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceOrderRequest {
    pub caller_id: AccountId,
    pub symbol: Symbol,
    pub side: Side,
    pub quantity: Quantity,
    pub price: Price,
    #[serde(default)]
    pub order_type: OrderType,
    /// Present on the engine→matching-service leg: the persisted order id,
    /// which doubles as the idempotency key for redelivered requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<OrderId>,
    /// Optional client-generated reference; a repeated reference replays the
    /// original response instead of creating a second order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ref: Option<String>,
}

/// Legacy buy/sell request body (no side field; the action supplies it)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyOrderRequest {
    pub caller_id: AccountId,
    pub symbol: Symbol,
    pub quantity: Quantity,
    pub price: Price,
    #[serde(default)]
    pub order_type: OrderType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ref: Option<String>,
}

impl LegacyOrderRequest {
    /// Normalize into a place_order request with the side fixed
    pub fn into_place_order(self, side: Side) -> PlaceOrderRequest {
        PlaceOrderRequest {
            caller_id: self.caller_id,
            symbol: self.symbol,
            side,
            quantity: self.quantity,
            price: self.price,
            order_type: self.order_type,
            order_id: None,
            client_ref: self.client_ref,
        }
    }
}

/// Order cancellation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelOrderRequest {
    pub order_id: OrderId,
}

/// Response status discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Error,
}

/// Acknowledgement for `connect`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectAck {
    pub status: Status,
    pub message: String,
}

impl ConnectAck {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: Status::Ok,
            message: message.into(),
        }
    }
}

/// Acknowledgement for `place_order`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceOrderAck {
    pub status: Status,
    pub order_id: OrderId,
    pub trades: Vec<Trade>,
}

impl PlaceOrderAck {
    pub fn ok(order_id: OrderId, trades: Vec<Trade>) -> Self {
        Self {
            status: Status::Ok,
            order_id,
            trades,
        }
    }
}

/// Acknowledgement for `cancel_order`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelOrderAck {
    pub status: Status,
    pub found: bool,
}

impl CancelOrderAck {
    pub fn ok(found: bool) -> Self {
        Self {
            status: Status::Ok,
            found,
        }
    }
}

/// Structured error response; never crashes the serving loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReply {
    pub status: Status,
    pub reason: String,
}

impl ErrorReply {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            reason: reason.into(),
        }
    }
}
