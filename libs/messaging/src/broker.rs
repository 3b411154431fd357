//! Broker transport contract
//!
//! Durable named queues with publish/subscribe and explicit
//! acknowledgement. A delivery that is never acknowledged is redelivered
//! when its consumer goes away, which gives servers at-least-once
//! processing.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

/// Transport-level failures
///
/// `Disconnected` is fatal to the affected serving loop: it must refuse new
/// work and reconnect with backoff rather than silently dropping messages.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BrokerError {
    #[error("Broker connection lost")]
    Disconnected,

    #[error("Queue {0} already has an exclusive consumer")]
    ConsumerConflict(String),
}

/// A message plus its broker metadata
///
/// `reply_to` names the queue a response should be published to;
/// `correlation_id` pairs that response with the originating request.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub payload: Value,
    pub reply_to: Option<String>,
    pub correlation_id: Option<String>,
}

impl Envelope {
    /// A bare message with no reply routing
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            reply_to: None,
            correlation_id: None,
        }
    }

    /// A request expecting a correlated response on `reply_to`
    pub fn request(payload: Value, reply_to: String, correlation_id: String) -> Self {
        Self {
            payload,
            reply_to: Some(reply_to),
            correlation_id: Some(correlation_id),
        }
    }

    /// A response to `request`, correlation id preserved
    pub fn response(payload: Value, correlation_id: Option<String>) -> Self {
        Self {
            payload,
            reply_to: None,
            correlation_id,
        }
    }
}

/// One message handed to a consumer, acknowledged by tag
#[derive(Debug)]
pub struct Delivery {
    pub queue: String,
    pub delivery_tag: u64,
    pub envelope: Envelope,
}

/// Stream of deliveries for one subscribed queue
///
/// Dropping the consumer requeues every unacknowledged delivery.
#[derive(Debug)]
pub struct Consumer {
    rx: mpsc::UnboundedReceiver<Delivery>,
}

impl Consumer {
    pub fn new(rx: mpsc::UnboundedReceiver<Delivery>) -> Self {
        Self { rx }
    }

    /// Next delivery, or `None` once the transport is gone
    pub async fn next(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }
}

/// Contract an external message broker must satisfy
///
/// Queues are created on first use; `declare_queue` exists so callers can
/// create them eagerly (e.g. a private reply queue before the first call).
#[async_trait]
pub trait BrokerTransport: Send + Sync {
    async fn declare_queue(&self, queue: &str) -> Result<(), BrokerError>;

    async fn publish(&self, queue: &str, envelope: Envelope) -> Result<(), BrokerError>;

    /// Attach the exclusive consumer for `queue`
    async fn subscribe(&self, queue: &str) -> Result<Consumer, BrokerError>;

    /// Acknowledge a delivery, removing it from redelivery tracking
    async fn ack(&self, delivery: &Delivery) -> Result<(), BrokerError>;
}
