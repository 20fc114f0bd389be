//! Domain module - jobs, items and catalog products
//!
//! A `Job` spans many `JobItem`s, each tracking one catalog entry through
//! the fetch -> translate -> persist pipeline. Job status is derived from
//! item states on read; it is never stored.

pub mod job;
pub mod job_item;
pub mod product;

// Re-export commonly used items for convenience
pub use job::{Job, JobProgress, JobStatus};
pub use job_item::{JobItem, JobItemStatus};
pub use product::{FieldMap, ProductData};
