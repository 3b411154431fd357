//! Request dispatch for the matching service

use chrono::Utc;
use matching_engine::{EngineError, MatchingEngine};
use messaging::{serve, BrokerError, BrokerTransport};
use persistence::{OrderStore, StoreError};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use types::message::{
    CancelOrderAck, CancelOrderRequest, ConnectAck, ConnectRequest, ErrorReply, PlaceOrderAck,
    PlaceOrderRequest, Request, REASON_UNKNOWN_ACTION,
};
use types::order::{Order, OrderStatus};

/// Matching service startup/serving failures
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Store failure: {0}")]
    Store(#[from] StoreError),

    #[error("Transport failure: {0}")]
    Transport(#[from] BrokerError),
}

/// RPC server wrapping the matching engine
pub struct MatchingService {
    engine: Mutex<MatchingEngine>,
    store: Arc<dyn OrderStore>,
    /// Responses already sent, by order id. A redelivered or retried
    /// place_order replays its original response instead of touching the
    /// book a second time.
    seen: Mutex<HashMap<String, Value>>,
}

impl MatchingService {
    /// Build the service, rebuilding order books from persisted open orders
    pub fn new(store: Arc<dyn OrderStore>) -> Result<Self, ServiceError> {
        let open_orders = store.load_open_orders()?;
        tracing::info!(count = open_orders.len(), "Restoring order books");

        let mut engine = MatchingEngine::new(0);
        engine.restore(open_orders);

        Ok(Self {
            engine: Mutex::new(engine),
            store,
            seen: Mutex::new(HashMap::new()),
        })
    }

    /// Serve requests from `queue` until the transport is gone
    pub async fn run(
        self: Arc<Self>,
        broker: Arc<dyn BrokerTransport>,
        queue: &str,
    ) -> Result<(), ServiceError> {
        let service = Arc::clone(&self);
        serve(broker, queue, move |payload| {
            let service = Arc::clone(&service);
            async move { service.handle(payload).await }
        })
        .await?;
        Ok(())
    }

    /// Handle one request payload, always producing a response payload
    pub async fn handle(&self, payload: Value) -> Value {
        match serde_json::from_value::<Request>(payload.clone()) {
            Ok(Request::Connect(request)) => self.handle_connect(&request),
            Ok(Request::PlaceOrder(request)) => self.handle_place_order(request),
            Ok(Request::CancelOrder(request)) => self.handle_cancel(&request),
            // Legacy aliases are a client-facing concern; they are
            // normalized before reaching this service.
            Ok(Request::Buy(_)) | Ok(Request::Sell(_)) => {
                tracing::warn!("Legacy alias sent to matching service");
                reply(&ErrorReply::new(REASON_UNKNOWN_ACTION))
            }
            Err(parse_err) => rejected(&payload, &parse_err),
        }
    }

    fn handle_connect(&self, request: &ConnectRequest) -> Value {
        let now = Utc::now().format("%Y-%m-%d %H:%M:%S");
        tracing::info!(caller_id = %request.caller_id, "Engine connected");
        reply(&ConnectAck::ok(format!(
            "Engine {} connected to matching service at {}",
            request.caller_id, now
        )))
    }

    fn handle_place_order(&self, request: PlaceOrderRequest) -> Value {
        // The persisted order id is the dedup key. A request without one
        // (a client bypassing the trading engine) gets a fresh id and
        // therefore no replay protection.
        let order_id = request.order_id.unwrap_or_default();
        let dedup_key = order_id.to_string();

        if let Some(previous) = self.seen.lock().unwrap().get(&dedup_key) {
            tracing::info!(%order_id, "Replaying response for redelivered order");
            return previous.clone();
        }

        let order = Order::with_id(
            order_id,
            request.caller_id,
            request.symbol,
            request.side,
            request.price,
            request.quantity,
            request.order_type,
            Utc::now().timestamp_nanos_opt().unwrap_or_default(),
        );

        let outcome = {
            let mut engine = self.engine.lock().unwrap();
            match engine.submit_order(order, Utc::now().timestamp_nanos_opt().unwrap_or_default())
            {
                Ok(outcome) => outcome,
                Err(EngineError::InvalidOrder(reason)) => {
                    tracing::warn!(%order_id, %reason, "Order rejected");
                    return reply(&ErrorReply::new(reason.to_string()));
                }
            }
        };

        tracing::info!(
            %order_id,
            symbol = %outcome.taker.symbol,
            trades = outcome.trades.len(),
            status = ?outcome.taker.status,
            "Order processed"
        );

        // The trades exist in the book regardless; a store failure here is
        // logged, never unwound.
        for trade in &outcome.trades {
            if let Err(e) = self.store.record_trade(trade) {
                tracing::error!(trade_id = %trade.trade_id, error = %e, "Trade record failed");
            }
        }
        for (maker_id, status) in &outcome.maker_updates {
            if let Err(e) = self.store.mark_order_status(maker_id, *status) {
                tracing::error!(order_id = %maker_id, error = %e, "Status update failed");
            }
        }
        if let Err(e) = self
            .store
            .mark_order_status(&order_id, outcome.taker.status)
        {
            tracing::error!(%order_id, error = %e, "Status update failed");
        }

        let response = reply(&PlaceOrderAck::ok(order_id, outcome.trades));
        self.seen
            .lock()
            .unwrap()
            .insert(dedup_key, response.clone());
        response
    }

    fn handle_cancel(&self, request: &CancelOrderRequest) -> Value {
        let found = self
            .engine
            .lock()
            .unwrap()
            .cancel_order(&request.order_id);

        if found {
            if let Err(e) = self
                .store
                .mark_order_status(&request.order_id, OrderStatus::Cancelled)
            {
                tracing::error!(order_id = %request.order_id, error = %e, "Status update failed");
            }
        }

        tracing::info!(order_id = %request.order_id, found, "Cancel processed");
        reply(&CancelOrderAck::ok(found))
    }
}

/// Serialize a response type into the wire payload
fn reply<T: serde::Serialize>(response: &T) -> Value {
    serde_json::to_value(response).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Response serialization failed");
        serde_json::to_value(ErrorReply::new("internal_error")).expect("ErrorReply serializes")
    })
}

/// Error response for a payload that failed to parse
fn rejected(payload: &Value, parse_err: &serde_json::Error) -> Value {
    let action = payload
        .get("action")
        .and_then(Value::as_str)
        .unwrap_or("<missing>");
    let known = matches!(
        action,
        "connect" | "place_order" | "cancel_order" | "buy" | "sell"
    );
    tracing::warn!(%action, error = %parse_err, "Rejected request");
    if known {
        reply(&ErrorReply::new("malformed_request"))
    } else {
        reply(&ErrorReply::new(REASON_UNKNOWN_ACTION))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use persistence::MemoryStore;
    use serde_json::json;
    use types::ids::{AccountId, OrderId, Symbol};
    use types::numeric::{Price, Quantity};
    use types::order::{OrderType, Side};

    fn service() -> (Arc<MemoryStore>, MatchingService) {
        let store = Arc::new(MemoryStore::new());
        let service = MatchingService::new(Arc::clone(&store) as Arc<dyn OrderStore>).unwrap();
        (store, service)
    }

    fn place_order_payload(store: &MemoryStore, side: Side, qty: &str, price: &str) -> Value {
        let order = store
            .create_order(
                AccountId::new(),
                Symbol::new("AAPL"),
                side,
                Quantity::from_str(qty).unwrap(),
                Price::from_str(price).unwrap(),
                OrderType::Limit,
            )
            .unwrap();
        json!({
            "action": "place_order",
            "caller_id": order.account_id,
            "symbol": "AAPL",
            "side": order.side,
            "quantity": qty,
            "price": price,
            "order_type": "limit",
            "order_id": order.order_id,
        })
    }

    #[tokio::test]
    async fn test_connect_acknowledged() {
        let (_, service) = service();
        let caller = AccountId::new();

        let response = service
            .handle(json!({
                "action": "connect",
                "caller_id": caller,
                "timestamp": 1708123456,
            }))
            .await;

        assert_eq!(response["status"], "ok");
        assert!(response["message"]
            .as_str()
            .unwrap()
            .contains(&caller.to_string()));
    }

    #[tokio::test]
    async fn test_unknown_action_is_reported() {
        let (_, service) = service();

        let response = service.handle(json!({"action": "teleport"})).await;

        assert_eq!(response["status"], "error");
        assert_eq!(response["reason"], "unknown_action");
    }

    #[tokio::test]
    async fn test_malformed_known_action_is_distinguished() {
        let (_, service) = service();

        // place_order missing every required field
        let response = service.handle(json!({"action": "place_order"})).await;

        assert_eq!(response["status"], "error");
        assert_eq!(response["reason"], "malformed_request");
    }

    #[tokio::test]
    async fn test_place_order_matches_and_persists() {
        let (store, service) = service();

        let sell = place_order_payload(&store, Side::Sell, "100", "150.00");
        let response = service.handle(sell).await;
        assert_eq!(response["status"], "ok");
        assert_eq!(response["trades"].as_array().unwrap().len(), 0);

        let buy = place_order_payload(&store, Side::Buy, "60", "151.00");
        let response = service.handle(buy).await;
        assert_eq!(response["status"], "ok");

        let trades = response["trades"].as_array().unwrap();
        assert_eq!(trades.len(), 1);
        // Execution at the resting price
        assert_eq!(trades[0]["price"], "150.00");
        assert_eq!(trades[0]["quantity"], "60");

        // Both the trade record and the status transitions reached the store
        assert_eq!(store.trades().len(), 1);
        let buy_id: OrderId =
            serde_json::from_value(response["order_id"].clone()).unwrap();
        assert_eq!(
            store.order(&buy_id).unwrap().status,
            OrderStatus::Filled
        );
    }

    #[tokio::test]
    async fn test_invalid_order_rejected() {
        let (_, service) = service();

        let response = service
            .handle(json!({
                "action": "place_order",
                "caller_id": AccountId::new(),
                "symbol": "AAPL",
                "side": "buy",
                "quantity": "0",
                "price": "150.00",
                "order_id": OrderId::new(),
            }))
            .await;

        assert_eq!(response["status"], "error");
        assert!(response["reason"]
            .as_str()
            .unwrap()
            .contains("Invalid quantity"));
    }

    #[tokio::test]
    async fn test_redelivered_place_order_replays_response() {
        let (store, service) = service();

        let payload = place_order_payload(&store, Side::Sell, "100", "150.00");
        let first = service.handle(payload.clone()).await;
        let replay = service.handle(payload).await;

        assert_eq!(first, replay);
        // Only one resting order despite two deliveries
        assert_eq!(store.load_open_orders().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_round_trip() {
        let (store, service) = service();

        let payload = place_order_payload(&store, Side::Sell, "100", "150.00");
        let placed = service.handle(payload).await;
        let order_id = placed["order_id"].clone();

        let response = service
            .handle(json!({"action": "cancel_order", "order_id": order_id}))
            .await;
        assert_eq!(response["status"], "ok");
        assert_eq!(response["found"], true);

        // Idempotent: a second cancel reports not found, no error
        let response = service
            .handle(json!({"action": "cancel_order", "order_id": order_id}))
            .await;
        assert_eq!(response["status"], "ok");
        assert_eq!(response["found"], false);
    }

    #[tokio::test]
    async fn test_startup_restore_rehydrates_book() {
        let store = Arc::new(MemoryStore::new());

        // First service instance accepts a resting order, then "crashes"
        {
            let service =
                MatchingService::new(Arc::clone(&store) as Arc<dyn OrderStore>).unwrap();
            let payload = place_order_payload(&store, Side::Sell, "100", "150.00");
            service.handle(payload).await;
        }

        // Second instance rebuilds from the store and matches against the
        // restored resting order
        let service = MatchingService::new(Arc::clone(&store) as Arc<dyn OrderStore>).unwrap();
        let buy = place_order_payload(&store, Side::Buy, "40", "150.00");
        let response = service.handle(buy).await;

        assert_eq!(response["status"], "ok");
        assert_eq!(response["trades"].as_array().unwrap().len(), 1);
    }
}
