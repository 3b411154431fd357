//! Client-facing request handling and matching service forwarding

use crate::config::TesConfig;
use chrono::Utc;
use messaging::{serve, BrokerError, BrokerTransport, RpcClient, RpcError};
use persistence::{OrderStore, StoreError};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use types::errors::OrderError;
use types::ids::AccountId;
use types::message::{
    CancelOrderRequest, ConnectAck, ConnectRequest, ErrorReply, PlaceOrderRequest, Request, Status,
    REASON_DOWNSTREAM_UNAVAILABLE, REASON_UNKNOWN_ACTION,
};
use types::order::{Order, Side};

/// Trading engine startup/serving failures
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Store failure: {0}")]
    Store(#[from] StoreError),

    #[error("RPC failure: {0}")]
    Rpc(#[from] RpcError),

    #[error("Transport failure: {0}")]
    Transport(#[from] BrokerError),

    #[error("Payload encoding failed: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Matching service handshake failed: {0}")]
    HandshakeFailed(String),
}

/// Client-facing RPC server, itself an RPC client of the matching service
pub struct TradingEngine {
    /// This engine's own identity, used in the downstream handshake
    engine_id: AccountId,
    store: Arc<dyn OrderStore>,
    rpc: RpcClient,
    config: TesConfig,
    /// Clients that have completed a connect this session. Session state
    /// lives here, keyed by caller, never in process-wide trading fields.
    sessions: Mutex<HashSet<AccountId>>,
    /// Orders already created for a client reference. A resubmitted
    /// reference reuses the persisted order, so the matching service's
    /// dedup key stays stable and the order cannot be applied twice.
    orders_by_ref: Mutex<HashMap<String, Order>>,
}

impl TradingEngine {
    /// Build the engine and open its private RPC channel
    pub async fn connect(
        broker: Arc<dyn BrokerTransport>,
        store: Arc<dyn OrderStore>,
        config: TesConfig,
    ) -> Result<Self, ServiceError> {
        let rpc = RpcClient::connect(broker).await?;
        Ok(Self {
            engine_id: AccountId::new(),
            store,
            rpc,
            config,
            sessions: Mutex::new(HashSet::new()),
            orders_by_ref: Mutex::new(HashMap::new()),
        })
    }

    /// Handshake with the matching service under the configured retry policy
    pub async fn check_matching_service(&self) -> Result<(), ServiceError> {
        let request = Request::Connect(ConnectRequest {
            caller_id: self.engine_id,
            timestamp: Utc::now().timestamp(),
            description: Some("Connecting trading engine to matching service".to_string()),
        });
        let payload = serde_json::to_value(&request)?;

        let response = self
            .rpc
            .call(
                &self.config.matching_queue,
                &payload,
                self.config.handshake_timeout,
                self.config.handshake_attempts,
            )
            .await?;

        let ack: ConnectAck = serde_json::from_value(response)?;
        if ack.status == Status::Ok {
            tracing::info!(message = %ack.message, "Matching service reachable");
            Ok(())
        } else {
            Err(ServiceError::HandshakeFailed(ack.message))
        }
    }

    /// Handshake, then serve client requests until the transport is gone.
    ///
    /// If the matching service never answers the handshake this returns an
    /// error without consuming a single client request.
    pub async fn run(self: Arc<Self>, broker: Arc<dyn BrokerTransport>) -> Result<(), ServiceError> {
        self.check_matching_service().await?;

        let queue = self.config.request_queue.clone();
        let service = Arc::clone(&self);
        serve(broker, &queue, move |payload| {
            let service = Arc::clone(&service);
            async move { service.handle(payload).await }
        })
        .await?;
        Ok(())
    }

    /// Handle one client request payload, always producing a response
    pub async fn handle(&self, payload: Value) -> Value {
        match serde_json::from_value::<Request>(payload.clone()) {
            Ok(Request::Connect(request)) => self.handle_connect(&request),
            Ok(Request::PlaceOrder(request)) => self.handle_place_order(request).await,
            // Legacy aliases: normalized into place_order with the side fixed
            Ok(Request::Buy(legacy)) => {
                self.handle_place_order(legacy.into_place_order(Side::Buy))
                    .await
            }
            Ok(Request::Sell(legacy)) => {
                self.handle_place_order(legacy.into_place_order(Side::Sell))
                    .await
            }
            Ok(Request::CancelOrder(request)) => self.handle_cancel(&request).await,
            Err(parse_err) => rejected(&payload, &parse_err),
        }
    }

    fn handle_connect(&self, request: &ConnectRequest) -> Value {
        if let Err(e) = self.store.register_client(request.caller_id) {
            tracing::error!(caller_id = %request.caller_id, error = %e, "Client registration failed");
            return reply(&ErrorReply::new("storage_failure"));
        }
        self.sessions.lock().unwrap().insert(request.caller_id);

        let now = Utc::now().format("%Y-%m-%d %H:%M:%S");
        tracing::info!(caller_id = %request.caller_id, "Trader connected");
        reply(&ConnectAck::ok(format!(
            "Trader {} connected to trading engine at {}",
            request.caller_id, now
        )))
    }

    async fn handle_place_order(&self, request: PlaceOrderRequest) -> Value {
        if let Err(reason) = validate_order_request(&request) {
            tracing::warn!(caller_id = %request.caller_id, %reason, "Order rejected");
            return reply(&ErrorReply::new(reason.to_string()));
        }

        if !self.sessions.lock().unwrap().contains(&request.caller_id) {
            tracing::debug!(caller_id = %request.caller_id, "Order from caller without connect");
        }

        // Persist first; the generated id is the downstream dedup key. A
        // repeated client reference reuses the already-persisted order, so
        // retries after a lost reply converge on one order.
        let order = match self.order_for_request(&request) {
            Ok(order) => order,
            Err(e) => {
                tracing::error!(caller_id = %request.caller_id, error = %e, "Order persist failed");
                return reply(&ErrorReply::new("storage_failure"));
            }
        };

        let downstream = Request::PlaceOrder(PlaceOrderRequest {
            caller_id: request.caller_id,
            symbol: request.symbol.clone(),
            side: request.side,
            quantity: request.quantity,
            price: request.price,
            order_type: request.order_type,
            order_id: Some(order.order_id),
            client_ref: None,
        });
        let payload = match serde_json::to_value(&downstream) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "Request encoding failed");
                return reply(&ErrorReply::new("internal_error"));
            }
        };

        match self
            .rpc
            .call(
                &self.config.matching_queue,
                &payload,
                self.config.call_timeout,
                self.config.max_attempts,
            )
            .await
        {
            // The matching service's answer (success or structured error)
            // is the composed response
            Ok(response) => response,
            Err(RpcError::Timeout { attempts }) => {
                // Unknown outcome: the order may or may not have matched.
                // Reported as a distinct status, never retried blindly —
                // a blind retry could double-submit the order.
                tracing::warn!(
                    order_id = %order.order_id,
                    attempts,
                    "Matching service unreachable, outcome unknown"
                );
                reply(&ErrorReply::new(REASON_DOWNSTREAM_UNAVAILABLE))
            }
            Err(e) => {
                tracing::error!(order_id = %order.order_id, error = %e, "Downstream call failed");
                reply(&ErrorReply::new(REASON_DOWNSTREAM_UNAVAILABLE))
            }
        }
    }

    /// Look up or create the persisted order for a placement request
    fn order_for_request(&self, request: &PlaceOrderRequest) -> Result<Order, StoreError> {
        if let Some(client_ref) = &request.client_ref {
            if let Some(existing) = self.orders_by_ref.lock().unwrap().get(client_ref) {
                tracing::info!(
                    client_ref = %client_ref,
                    order_id = %existing.order_id,
                    "Reusing persisted order for repeated reference"
                );
                return Ok(existing.clone());
            }
        }

        let order = self.store.create_order(
            request.caller_id,
            request.symbol.clone(),
            request.side,
            request.quantity,
            request.price,
            request.order_type,
        )?;

        if let Some(client_ref) = &request.client_ref {
            self.orders_by_ref
                .lock()
                .unwrap()
                .insert(client_ref.clone(), order.clone());
        }
        Ok(order)
    }

    async fn handle_cancel(&self, request: &CancelOrderRequest) -> Value {
        let downstream = Request::CancelOrder(CancelOrderRequest {
            order_id: request.order_id,
        });
        let payload = match serde_json::to_value(&downstream) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "Request encoding failed");
                return reply(&ErrorReply::new("internal_error"));
            }
        };

        match self
            .rpc
            .call(
                &self.config.matching_queue,
                &payload,
                self.config.call_timeout,
                self.config.max_attempts,
            )
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(order_id = %request.order_id, error = %e, "Cancel forward failed");
                reply(&ErrorReply::new(REASON_DOWNSTREAM_UNAVAILABLE))
            }
        }
    }
}

/// Shape validation before anything is persisted or forwarded
fn validate_order_request(request: &PlaceOrderRequest) -> Result<(), OrderError> {
    if request.symbol.as_str().is_empty() {
        return Err(OrderError::InvalidSymbol("<empty>".to_string()));
    }
    if !request.quantity.is_positive() {
        return Err(OrderError::InvalidQuantity(request.quantity.to_string()));
    }
    if !request.price.is_positive() {
        return Err(OrderError::InvalidPrice(request.price.to_string()));
    }
    Ok(())
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
