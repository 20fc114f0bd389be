//! lingopipe - queue-driven catalog translation pipeline
//!
//! Fetches product content from a storefront catalog, machine-translates
//! it in batches, and persists one translation row per item while
//! tracking per-item state and per-job progress in SQLite.
//!
//! The crate is split into five layers:
//! - [`domain`]: jobs, job items, product content and the status model
//! - [`messages`]: the wire formats carried between pipeline stages
//! - [`queue`]: the broker abstraction and its in-memory implementation
//! - [`infrastructure`]: SQLite repositories, config, logging and the
//!   catalog/translator HTTP clients
//! - [`workers`]: the three stage consumers and the runtime wiring them

pub mod domain;
pub mod infrastructure;
pub mod messages;
pub mod queue;
pub mod workers;
