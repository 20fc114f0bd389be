//! Queue abstraction for the pipeline hops.
//!
//! The broker itself is an external collaborator; this module only fixes
//! the semantics the stages rely on: at-least-once delivery, manual
//! acknowledgement, prefetch of one per consumer, and redelivery of any
//! delivery that is dropped unsettled. The in-memory implementation is
//! the shipped single-process deployment and the test harness.

pub mod broker;
pub mod memory;

pub use broker::{Acker, BrokerError, Delivery, QueueBroker, QueueConsumer, QueueName};
pub use memory::InMemoryBroker;
