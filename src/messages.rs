//! Wire contracts for every queue hop.
//!
//! Each message is a flat JSON payload. Unknown fields are ignored on
//! decode; missing required fields reject the message before any
//! processing happens. Every payload carries enough identifying state
//! (job id, item id, external id) to be handled without consulting prior
//! messages.

pub mod fetch;
pub mod persist;
pub mod qe;
pub mod translate;

pub use fetch::FetchRequest;
pub use persist::{PersistFailure, PersistRequest, PersistSuccess};
pub use qe::{QeRequest, QE_FIELDS};
pub use translate::{TranslateItem, TranslateRequest};

/// Why a message body was rejected at the consuming stage.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed message body: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
}
