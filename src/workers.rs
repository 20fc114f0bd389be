//! The pipeline stage consumers.
//!
//! Each worker is an independent long-running consumer with prefetch of
//! one: pull a message, fully process it (including provider calls),
//! settle it, then pull the next. Multiple instances of the same worker
//! may run against the same queue; the broker's competing-consumers
//! delivery hands each message to exactly one of them.

pub mod fetch_worker;
pub mod persist_worker;
pub mod runtime;
pub mod translate_worker;

pub use fetch_worker::FetchWorker;
pub use persist_worker::PersistWorker;
pub use runtime::{PipelineHandles, PipelineRuntime};
pub use translate_worker::TranslateWorker;
