use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Logical queues of the pipeline topology. Each maps to a configurable
/// physical queue name (see `QueueConfig`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueName {
    Fetch,
    Translate,
    Qe,
    Persist,
}

impl QueueName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Translate => "translate",
            Self::Qe => "qe",
            Self::Persist => "persist",
        }
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("queue `{0}` is closed")]
    Closed(String),
    #[error("broker connection failed: {0}")]
    Connection(String),
}

/// Settles one delivery. Exactly one of `ack`/`nack` is called; a dropped
/// unsettled acker must put the message back on its queue.
#[async_trait]
pub trait Acker: Send {
    async fn ack(self: Box<Self>) -> Result<(), BrokerError>;
    async fn nack(self: Box<Self>, requeue: bool) -> Result<(), BrokerError>;
}

/// One in-flight message handed to a consumer.
pub struct Delivery {
    payload: Vec<u8>,
    acker: Box<dyn Acker>,
}

impl Delivery {
    pub fn new(payload: Vec<u8>, acker: Box<dyn Acker>) -> Self {
        Self { payload, acker }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Acknowledge: the message is done and will not be redelivered.
    /// This is the durability boundary of every stage; it runs only after
    /// all downstream publishes for the message have succeeded.
    pub async fn ack(self) -> Result<(), BrokerError> {
        self.acker.ack().await
    }

    /// Reject. `requeue = false` drops the message (poison handling);
    /// `requeue = true` puts it back for another consumer.
    pub async fn nack(self, requeue: bool) -> Result<(), BrokerError> {
        self.acker.nack(requeue).await
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery").field("payload_len", &self.payload.len()).finish()
    }
}

/// Publish side of the broker. Publishing never blocks on consumers.
#[async_trait]
pub trait QueueBroker: Send + Sync {
    async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<(), BrokerError>;

    /// Opens a competing consumer on `queue`. Multiple consumers on the
    /// same queue each receive a disjoint subset of messages.
    async fn consumer(&self, queue: &str) -> Result<Box<dyn QueueConsumer>, BrokerError>;
}

/// Prefetch-one consumption: callers fully process and settle the
/// returned delivery before asking for the next one.
#[async_trait]
pub trait QueueConsumer: Send {
    async fn next(&mut self) -> Result<Delivery, BrokerError>;
}
