use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of one catalog item inside a job.
///
/// Transitions are monotonic along `Queued -> Processing -> {Done | Error}`.
/// Once an item leaves `Queued` it never returns, and the terminal states
/// are final. Redelivered pipeline messages therefore cannot move an item
/// backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobItemStatus {
    Queued,
    Processing,
    Done,
    Error,
}

impl JobItemStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Done => "done",
            Self::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(Self::Queued),
            "processing" => Some(Self::Processing),
            "done" => Some(Self::Done),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

impl std::fmt::Display for JobItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One catalog entry tracked through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobItem {
    pub id: i64,
    pub job_id: i64,
    pub external_id: String,
    pub status: JobItemStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::JobItemStatus;
    use super::JobItemStatus::{Done, Error, Processing, Queued};

    #[test]
    fn only_done_and_error_are_terminal() {
        assert!(!Queued.is_terminal());
        assert!(!Processing.is_terminal());
        assert!(Done.is_terminal());
        assert!(Error.is_terminal());
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [Queued, Processing, Done, Error] {
            assert_eq!(JobItemStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(JobItemStatus::parse("pending"), None);
    }
}
