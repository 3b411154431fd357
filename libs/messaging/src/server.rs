//! RPC server loop
//!
//! At-least-once processing: the inbound request is acknowledged only after
//! its response has been published, so a crash mid-handling redelivers the
//! request. Handlers must therefore be idempotent for requests that carry a
//! dedup key.

use crate::broker::{BrokerError, BrokerTransport, Envelope};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(5);
/// Consecutive failed resubscribes before the loop gives up
const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Serve `queue`, answering every request via `handler`.
///
/// For each delivery: invoke the handler, publish its response to the
/// request's `reply_to` with the correlation id preserved, then ack. A
/// request without `reply_to` is logged and consumed without a reply.
///
/// On transport interruption the loop refuses new work and resubscribes
/// with exponential backoff; it returns an error only when the broker stays
/// unreachable past the reconnect budget.
pub async fn serve<H, Fut>(
    broker: Arc<dyn BrokerTransport>,
    queue: &str,
    handler: H,
) -> Result<(), BrokerError>
where
    H: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Value> + Send,
{
    broker.declare_queue(queue).await?;

    let mut backoff = INITIAL_BACKOFF;
    let mut reconnect_attempts = 0u32;

    loop {
        let mut consumer = match broker.subscribe(queue).await {
            Ok(consumer) => {
                reconnect_attempts = 0;
                backoff = INITIAL_BACKOFF;
                consumer
            }
            Err(e) => {
                reconnect_attempts += 1;
                if reconnect_attempts >= MAX_RECONNECT_ATTEMPTS {
                    tracing::error!(%queue, error = %e, "Broker unreachable, giving up");
                    return Err(e);
                }
                tracing::warn!(
                    %queue,
                    error = %e,
                    attempt = reconnect_attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    "Subscribe failed, backing off"
                );
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
                continue;
            }
        };

        tracing::info!(%queue, "Serving requests");

        while let Some(delivery) = consumer.next().await {
            let response = handler(delivery.envelope.payload.clone()).await;

            match &delivery.envelope.reply_to {
                Some(reply_to) => {
                    let envelope =
                        Envelope::response(response, delivery.envelope.correlation_id.clone());
                    if let Err(e) = broker.publish(reply_to, envelope).await {
                        // Left unacked on purpose: the request redelivers
                        // once the transport is back.
                        tracing::warn!(%queue, error = %e, "Reply publish failed");
                        break;
                    }
                }
                None => {
                    tracing::warn!(%queue, "Request without reply_to, response dropped");
                }
            }

            if let Err(e) = broker.ack(&delivery).await {
                tracing::warn!(%queue, error = %e, "Ack failed");
                break;
            }
        }

        tracing::warn!(%queue, "Consumer interrupted, reconnecting");
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}
