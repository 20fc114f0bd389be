use serde::{Deserialize, Serialize};

use super::DecodeError;

/// Entry point of the pipeline, published by the job-creation surface.
///
/// Either an explicit id list or a page range over the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FetchRequest {
    Ids {
        job_id: i64,
        ids: Vec<String>,
    },
    Range {
        job_id: i64,
        start_page: u32,
        end_page: u32,
        #[serde(default = "default_page_limit")]
        limit: u32,
    },
}

fn default_page_limit() -> u32 {
    100
}

impl FetchRequest {
    pub fn job_id(&self) -> i64 {
        match self {
            Self::Ids { job_id, .. } | Self::Range { job_id, .. } => *job_id,
        }
    }

    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        Ok(serde_json::from_slice(payload)?)
    }

    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}
