use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One end-to-end translation request spanning many catalog items.
///
/// `total_items` is the expected item count. It starts at zero and is
/// incremented atomically by the fetch stage as batches are discovered,
/// so it is monotonically non-decreasing after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub source_lang: String,
    pub target_lang: String,
    /// Operator annotation naming the prompt variant used for this job.
    /// Recorded for the job surface only; workers read their template
    /// from configuration.
    pub prompt_ref: Option<String>,
    pub total_items: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Aggregate status of a job, derived from its items. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Item-state counts for a job, read together with `total_items` in a
/// single query so the derived status reflects one consistent snapshot.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct JobProgress {
    pub total_items: i64,
    pub item_count: i64,
    pub queued: i64,
    pub processing: i64,
    pub done: i64,
    pub error: i64,
}

impl JobProgress {
    /// Derives the job status. Any errored item makes the whole job
    /// `Failed` immediately, even while other items are still in flight
    /// (fail-visible, not fail-fast).
    pub fn status(&self) -> JobStatus {
        if self.error > 0 {
            JobStatus::Failed
        } else if self.item_count == 0 {
            JobStatus::Pending
        } else if self.item_count < self.total_items || self.queued > 0 || self.processing > 0 {
            JobStatus::Running
        } else {
            JobStatus::Completed
        }
    }

    pub fn completed_items(&self) -> i64 {
        self.done
    }

    pub fn failed_items(&self) -> i64 {
        self.error
    }

    pub fn progress_percentage(&self) -> f64 {
        if self.total_items == 0 {
            return 0.0;
        }
        let pct = self.done as f64 / self.total_items as f64 * 100.0;
        (pct * 100.0).round() / 100.0
    }
}
