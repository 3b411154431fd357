//! Correlation-id RPC client
//!
//! One channel owns one exclusive reply queue and a table of in-flight
//! calls keyed by correlation id, so multiple calls can be outstanding at
//! once. Every retry attempt uses a fresh correlation id: a late reply to a
//! timed-out attempt is recognized as stale and discarded instead of being
//! misdelivered to the retry.

use crate::broker::{BrokerError, BrokerTransport, Consumer, Envelope};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// RPC-layer failures
#[derive(Error, Debug)]
pub enum RpcError {
    /// Every attempt timed out. This is an **unknown outcome**, not a
    /// negative acknowledgement: the request may have been applied
    /// server-side and only the reply lost. Callers should poll for state
    /// rather than resubmit.
    #[error("RPC timed out after {attempts} attempt(s)")]
    Timeout { attempts: u32 },

    #[error("Transport failure: {0}")]
    Transport(#[from] BrokerError),

    #[error("Payload encoding failed: {0}")]
    Codec(#[from] serde_json::Error),
}

/// One in-flight request awaiting its correlated reply
struct PendingCall {
    submitted_at: Instant,
    deadline: Instant,
    attempt: u32,
    result: oneshot::Sender<Value>,
}

type PendingTable = Arc<Mutex<HashMap<String, PendingCall>>>;

/// Request/response client over a [`BrokerTransport`]
pub struct RpcClient {
    broker: Arc<dyn BrokerTransport>,
    reply_queue: String,
    pending: PendingTable,
    pump: JoinHandle<()>,
}

impl RpcClient {
    /// Create a client with its own private reply queue and start the
    /// background pump draining that queue.
    pub async fn connect(broker: Arc<dyn BrokerTransport>) -> Result<Self, RpcError> {
        let reply_queue = format!("reply.{}", Uuid::new_v4());
        broker.declare_queue(&reply_queue).await?;
        let consumer = broker.subscribe(&reply_queue).await?;

        let pending: PendingTable = Arc::new(Mutex::new(HashMap::new()));
        let pump = tokio::spawn(Self::pump(consumer, Arc::clone(&broker), Arc::clone(&pending)));

        Ok(Self {
            broker,
            reply_queue,
            pending,
            pump,
        })
    }

    /// Name of this channel's private reply queue
    pub fn reply_queue(&self) -> &str {
        &self.reply_queue
    }

    /// Drain the reply queue, resolving pending calls by correlation id.
    ///
    /// Runs independently of any in-flight `call`, so a blocked caller never
    /// starves unrelated replies arriving on the same queue.
    async fn pump(mut consumer: Consumer, broker: Arc<dyn BrokerTransport>, pending: PendingTable) {
        while let Some(delivery) = consumer.next().await {
            // Replies are consumed fire-and-forget; there is nothing to
            // redeliver a reply to once its call has resolved or expired.
            let _ = broker.ack(&delivery).await;

            let Some(correlation_id) = delivery.envelope.correlation_id else {
                tracing::debug!("Reply without correlation id dropped");
                continue;
            };

            let call = pending.lock().unwrap().remove(&correlation_id);
            match call {
                Some(call) => {
                    let _ = call.result.send(delivery.envelope.payload);
                }
                None => {
                    tracing::warn!(%correlation_id, "Discarding late reply for expired call");
                }
            }
        }
    }

    /// Issue a request and wait for the correlated response.
    ///
    /// Each attempt publishes with a fresh correlation id and waits up to
    /// `timeout`; exhausted attempts yield [`RpcError::Timeout`].
    pub async fn call(
        &self,
        queue: &str,
        payload: &Value,
        timeout: Duration,
        max_attempts: u32,
    ) -> Result<Value, RpcError> {
        assert!(max_attempts >= 1, "max_attempts must be at least 1");

        for attempt in 1..=max_attempts {
            let correlation_id = Uuid::new_v4().to_string();
            let (tx, rx) = oneshot::channel();
            let now = Instant::now();
            self.pending.lock().unwrap().insert(
                correlation_id.clone(),
                PendingCall {
                    submitted_at: now,
                    deadline: now + timeout,
                    attempt,
                    result: tx,
                },
            );

            let envelope = Envelope::request(
                payload.clone(),
                self.reply_queue.clone(),
                correlation_id.clone(),
            );
            if let Err(e) = self.broker.publish(queue, envelope).await {
                self.pending.lock().unwrap().remove(&correlation_id);
                return Err(e.into());
            }

            match tokio::time::timeout(timeout, rx).await {
                Ok(Ok(response)) => return Ok(response),
                // Pump gone: the reply path is dead, retrying cannot help
                Ok(Err(_)) => return Err(RpcError::Transport(BrokerError::Disconnected)),
                Err(_) => {
                    if let Some(stale) = self.pending.lock().unwrap().remove(&correlation_id) {
                        tracing::warn!(
                            %queue,
                            attempt = stale.attempt,
                            waited_ms = stale.submitted_at.elapsed().as_millis() as u64,
                            "RPC attempt timed out"
                        );
                    }
                }
            }
        }

        Err(RpcError::Timeout {
            attempts: max_attempts,
        })
    }

    /// Number of in-flight calls, expired entries excluded (test observability)
    pub fn in_flight(&self) -> usize {
        let now = Instant::now();
        self.pending
            .lock()
            .unwrap()
            .values()
            .filter(|call| call.deadline > now)
            .count()
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.pump.abort();
        // Pending senders drop with the table, waking any stranded callers
        self.pending.lock().unwrap().clear();
    }
}
