//! In-process broker implementation
//!
//! Backs tests and the single-process demo. Semantics mirror a work-queue
//! broker: one exclusive consumer per queue, explicit acks, redelivery of
//! unacknowledged messages when a consumer goes away, and `close()` to
//! simulate losing the broker connection.

use crate::broker::{BrokerError, BrokerTransport, Consumer, Delivery, Envelope};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::sync::mpsc;

#[derive(Default)]
struct QueueState {
    /// Messages waiting for a consumer, oldest first
    pending: VecDeque<Envelope>,
    consumer: Option<mpsc::UnboundedSender<Delivery>>,
    /// Delivered but not yet acknowledged, by delivery tag
    unacked: HashMap<u64, Envelope>,
}

#[derive(Default)]
struct BrokerInner {
    queues: HashMap<String, QueueState>,
    next_tag: u64,
    closed: bool,
}

/// In-memory [`BrokerTransport`]
#[derive(Default)]
pub struct InMemoryBroker {
    inner: Mutex<BrokerInner>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate losing the broker: every subsequent operation fails with
    /// `Disconnected` and all consumers see end-of-stream.
    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.closed = true;
        for queue in inner.queues.values_mut() {
            queue.consumer = None;
        }
    }

    /// Messages sitting unconsumed in a queue (test observability)
    pub fn pending_len(&self, queue: &str) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.queues.get(queue).map_or(0, |q| q.pending.len())
    }
}

impl BrokerInner {
    /// Deliver to the attached consumer, or park in `pending`.
    ///
    /// A consumer whose receiver is gone is detached and its unacknowledged
    /// deliveries are requeued ahead of newer traffic.
    fn enqueue(&mut self, queue_name: &str, envelope: Envelope) {
        let tag = {
            self.next_tag += 1;
            self.next_tag
        };
        let queue = self.queues.entry(queue_name.to_string()).or_default();

        if let Some(sender) = &queue.consumer {
            let delivery = Delivery {
                queue: queue_name.to_string(),
                delivery_tag: tag,
                envelope: envelope.clone(),
            };
            if sender.send(delivery).is_ok() {
                queue.unacked.insert(tag, envelope);
                return;
            }
            // Consumer dropped without acking: requeue its in-flight messages
            queue.consumer = None;
            let mut requeued: Vec<(u64, Envelope)> = queue.unacked.drain().collect();
            requeued.sort_by_key(|(t, _)| *t);
            for (_, env) in requeued.into_iter().rev() {
                queue.pending.push_front(env);
            }
        }
        queue.pending.push_back(envelope);
    }
}

#[async_trait]
impl BrokerTransport for InMemoryBroker {
    async fn declare_queue(&self, queue: &str) -> Result<(), BrokerError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return Err(BrokerError::Disconnected);
        }
        inner.queues.entry(queue.to_string()).or_default();
        Ok(())
    }

    async fn publish(&self, queue: &str, envelope: Envelope) -> Result<(), BrokerError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return Err(BrokerError::Disconnected);
        }
        inner.enqueue(queue, envelope);
        Ok(())
    }

    async fn subscribe(&self, queue: &str) -> Result<Consumer, BrokerError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return Err(BrokerError::Disconnected);
        }
        let tag_base = inner.next_tag;
        let state = inner.queues.entry(queue.to_string()).or_default();

        if let Some(existing) = &state.consumer {
            if !existing.is_closed() {
                return Err(BrokerError::ConsumerConflict(queue.to_string()));
            }
            // Previous consumer died: requeue whatever it never acked
            let mut requeued: Vec<(u64, Envelope)> = state.unacked.drain().collect();
            requeued.sort_by_key(|(t, _)| *t);
            for (_, env) in requeued.into_iter().rev() {
                state.pending.push_front(env);
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let mut tag = tag_base;
        while let Some(envelope) = state.pending.pop_front() {
            tag += 1;
            state.unacked.insert(tag, envelope.clone());
            let _ = tx.send(Delivery {
                queue: queue.to_string(),
                delivery_tag: tag,
                envelope,
            });
        }
        state.consumer = Some(tx);
        inner.next_tag = tag;
        Ok(Consumer::new(rx))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), BrokerError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return Err(BrokerError::Disconnected);
        }
        if let Some(queue) = inner.queues.get_mut(&delivery.queue) {
            queue.unacked.remove(&delivery.delivery_tag);
        }
        Ok(())
    }
}
