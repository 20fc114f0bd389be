use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use super::broker::{Acker, BrokerError, Delivery, QueueBroker, QueueConsumer};

/// Tokio-based broker for a single-process deployment and for tests.
///
/// Queues are created on first use. Messages live in memory only; a
/// process restart loses queued work, exactly like the non-durable
/// reference deployment. Competing consumers pop from a shared deque, so
/// each message reaches exactly one consumer at a time; a delivery whose
/// consumer dies before settling it is pushed back for redelivery.
#[derive(Default)]
pub struct InMemoryBroker {
    queues: Mutex<HashMap<String, Arc<QueueState>>>,
}

#[derive(Default)]
struct QueueState {
    messages: Mutex<VecDeque<Vec<u8>>>,
    notify: Notify,
}

impl QueueState {
    fn push_back(&self, payload: Vec<u8>) {
        self.messages.lock().expect("queue mutex poisoned").push_back(payload);
        self.notify.notify_one();
    }

    fn push_front(&self, payload: Vec<u8>) {
        self.messages.lock().expect("queue mutex poisoned").push_front(payload);
        self.notify.notify_one();
    }

    fn pop(&self) -> Option<Vec<u8>> {
        self.messages.lock().expect("queue mutex poisoned").pop_front()
    }

    fn len(&self) -> usize {
        self.messages.lock().expect("queue mutex poisoned").len()
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self, queue: &str) -> Arc<QueueState> {
        let mut queues = self.queues.lock().expect("broker mutex poisoned");
        queues.entry(queue.to_owned()).or_default().clone()
    }

    /// Number of messages currently waiting on `queue` (not counting
    /// unsettled in-flight deliveries).
    pub fn depth(&self, queue: &str) -> usize {
        self.state(queue).len()
    }
}

#[async_trait]
impl QueueBroker for InMemoryBroker {
    async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        self.state(queue).push_back(payload);
        Ok(())
    }

    async fn consumer(&self, queue: &str) -> Result<Box<dyn QueueConsumer>, BrokerError> {
        Ok(Box::new(InMemoryConsumer { state: self.state(queue) }))
    }
}

struct InMemoryConsumer {
    state: Arc<QueueState>,
}

#[async_trait]
impl QueueConsumer for InMemoryConsumer {
    async fn next(&mut self) -> Result<Delivery, BrokerError> {
        loop {
            // Register for wakeup before checking, so a publish racing
            // with the empty check cannot be missed.
            let notified = self.state.notify.notified();
            if let Some(payload) = self.state.pop() {
                let acker = InMemoryAcker { state: self.state.clone(), pending: Some(payload.clone()) };
                return Ok(Delivery::new(payload, Box::new(acker)));
            }
            notified.await;
        }
    }
}

struct InMemoryAcker {
    state: Arc<QueueState>,
    pending: Option<Vec<u8>>,
}

#[async_trait]
impl Acker for InMemoryAcker {
    async fn ack(mut self: Box<Self>) -> Result<(), BrokerError> {
        self.pending.take();
        Ok(())
    }

    async fn nack(mut self: Box<Self>, requeue: bool) -> Result<(), BrokerError> {
        if let Some(payload) = self.pending.take() {
            if requeue {
                self.state.push_front(payload);
            }
        }
        Ok(())
    }
}

impl Drop for InMemoryAcker {
    fn drop(&mut self) {
        // Unsettled delivery: the consumer went away. Requeue so another
        // instance picks it up (at-least-once recovery).
        if let Some(payload) = self.pending.take() {
            self.state.push_front(payload);
        }
    }
}
