//! Repository for translation job rows.
//!
//! Job status is never written; it is derived on read from the item
//! counts, and the counts are taken in a single statement so the derived
//! status always reflects one consistent snapshot.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::domain::{Job, JobProgress};

#[derive(Clone)]
pub struct JobRepository {
    pool: SqlitePool,
}

impl JobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create_job(
        &self,
        source_lang: &str,
        target_lang: &str,
        prompt_ref: Option<&str>,
    ) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO translation_jobs (source_lang, target_lang, prompt_ref)
            VALUES (?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(source_lang)
        .bind(target_lang)
        .bind(prompt_ref)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn find_job(&self, id: i64) -> Result<Option<Job>> {
        let row = sqlx::query(
            r#"
            SELECT id, source_lang, target_lang, prompt_ref, total_items, created_at, updated_at
            FROM translation_jobs
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(Job {
                id: row.try_get("id")?,
                source_lang: row.try_get("source_lang")?,
                target_lang: row.try_get("target_lang")?,
                prompt_ref: row.try_get("prompt_ref")?,
                total_items: row.try_get("total_items")?,
                created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
                updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
            })
        })
        .transpose()
    }

    /// Atomic counter update. Concurrent fetch batches for the same job
    /// must never read-modify-write this value.
    pub async fn increment_total_items(&self, job_id: i64, count: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE translation_jobs
            SET total_items = total_items + ?, updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
            "#,
        )
        .bind(count)
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Reads `total_items` and the per-status item counts in one
    /// statement (one snapshot), for deriving the aggregate job status.
    pub async fn progress(&self, job_id: i64) -> Result<Option<JobProgress>> {
        let row = sqlx::query(
            r#"
            SELECT
                j.total_items AS total_items,
                COUNT(i.id) AS item_count,
                COALESCE(SUM(CASE WHEN i.status = 'queued' THEN 1 ELSE 0 END), 0) AS queued,
                COALESCE(SUM(CASE WHEN i.status = 'processing' THEN 1 ELSE 0 END), 0) AS processing,
                COALESCE(SUM(CASE WHEN i.status = 'done' THEN 1 ELSE 0 END), 0) AS done,
                COALESCE(SUM(CASE WHEN i.status = 'error' THEN 1 ELSE 0 END), 0) AS error
            FROM translation_jobs j
            LEFT JOIN job_items i ON i.job_id = j.id
            WHERE j.id = ?
            GROUP BY j.id
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(JobProgress {
                total_items: row.try_get("total_items")?,
                item_count: row.try_get("item_count")?,
                queued: row.try_get("queued")?,
                processing: row.try_get("processing")?,
                done: row.try_get("done")?,
                error: row.try_get("error")?,
            })
        })
        .transpose()
    }
}
