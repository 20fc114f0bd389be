//! Repository for job item rows.
//!
//! State transitions are single-row conditional updates: the `WHERE`
//! clause encodes the allowed source states, so a redelivered or stale
//! message can never move an item backwards along
//! `queued -> processing -> {done | error}`.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::domain::{JobItem, JobItemStatus};

#[derive(Clone)]
pub struct JobItemRepository {
    pool: SqlitePool,
}

impl JobItemRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Bulk-inserts one `queued` row per external id inside a single
    /// transaction, returning the generated item ids in input order.
    /// Those ids are the correlation keys carried by every downstream
    /// message.
    pub async fn insert_queued_batch(
        &self,
        job_id: i64,
        external_ids: &[String],
    ) -> Result<Vec<i64>> {
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(external_ids.len());

        for external_id in external_ids {
            let id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO job_items (job_id, external_id, status)
                VALUES (?, ?, 'queued')
                RETURNING id
                "#,
            )
            .bind(job_id)
            .bind(external_id)
            .fetch_one(&mut *tx)
            .await?;
            ids.push(id);
        }

        tx.commit().await?;
        Ok(ids)
    }

    pub async fn find(&self, id: i64) -> Result<Option<JobItem>> {
        let row = sqlx::query(
            r#"
            SELECT id, job_id, external_id, status, error_message, created_at, updated_at
            FROM job_items
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            let raw_status: String = row.try_get("status")?;
            let Some(status) = JobItemStatus::parse(&raw_status) else {
                bail!("job item {id} has unknown status `{raw_status}`");
            };
            Ok(JobItem {
                id: row.try_get("id")?,
                job_id: row.try_get("job_id")?,
                external_id: row.try_get("external_id")?,
                status,
                error_message: row.try_get("error_message")?,
                created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
                updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
            })
        })
        .transpose()
    }

    /// `queued | processing -> processing`. Returns whether a row
    /// actually changed; a terminal item is left untouched.
    pub async fn mark_processing(&self, id: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE job_items
            SET status = 'processing', updated_at = CURRENT_TIMESTAMP
            WHERE id = ? AND status IN ('queued', 'processing')
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// `queued | processing | done -> done`. Idempotent under
    /// redelivery; never resurrects an errored item.
    pub async fn mark_done(&self, id: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE job_items
            SET status = 'done', error_message = NULL, updated_at = CURRENT_TIMESTAMP
            WHERE id = ? AND status IN ('queued', 'processing', 'done')
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Any non-terminal state -> `error`, recording the message.
    pub async fn mark_error(&self, id: i64, error_message: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE job_items
            SET status = 'error', error_message = ?, updated_at = CURRENT_TIMESTAMP
            WHERE id = ? AND status IN ('queued', 'processing')
            "#,
        )
        .bind(error_message)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::JobItemRepository;
    use crate::domain::JobItemStatus;
    use crate::infrastructure::{DatabaseConnection, JobRepository};

    async fn setup() -> (JobRepository, JobItemRepository, i64) {
        let db = DatabaseConnection::in_memory().await.unwrap();
        db.migrate().await.unwrap();
        let jobs = JobRepository::new(db.pool().clone());
        let items = JobItemRepository::new(db.pool().clone());
        let job_id = jobs.create_job("da", "fi", None).await.unwrap();
        (jobs, items, job_id)
    }

    #[tokio::test]
    async fn batch_insert_returns_ids_in_input_order() {
        let (_, items, job_id) = setup().await;
        let external_ids: Vec<String> = (0..5).map(|i| format!("ext-{i}")).collect();

        let ids = items.insert_queued_batch(job_id, &external_ids).await.unwrap();
        assert_eq!(ids.len(), 5);

        for (id, external_id) in ids.iter().zip(&external_ids) {
            let item = items.find(*id).await.unwrap().unwrap();
            assert_eq!(&item.external_id, external_id);
            assert_eq!(item.status, JobItemStatus::Queued);
        }
    }

    #[tokio::test]
    async fn transitions_are_monotonic() {
        let (_, items, job_id) = setup().await;
        let id = items.insert_queued_batch(job_id, &["ext-1".into()]).await.unwrap()[0];

        assert!(items.mark_processing(id).await.unwrap());
        assert!(items.mark_done(id).await.unwrap());

        // done is terminal: neither processing nor error may overwrite it
        assert!(!items.mark_processing(id).await.unwrap());
        assert!(!items.mark_error(id, "late failure").await.unwrap());
        let item = items.find(id).await.unwrap().unwrap();
        assert_eq!(item.status, JobItemStatus::Done);
        assert!(item.error_message.is_none());
    }

    #[tokio::test]
    async fn error_is_terminal_too() {
        let (_, items, job_id) = setup().await;
        let id = items.insert_queued_batch(job_id, &["ext-1".into()]).await.unwrap()[0];

        assert!(items.mark_error(id, "provider timeout").await.unwrap());
        assert!(!items.mark_done(id).await.unwrap());
        assert!(!items.mark_processing(id).await.unwrap());

        let item = items.find(id).await.unwrap().unwrap();
        assert_eq!(item.status, JobItemStatus::Error);
        assert_eq!(item.error_message.as_deref(), Some("provider timeout"));
    }

    #[tokio::test]
    async fn mark_done_is_idempotent() {
        let (_, items, job_id) = setup().await;
        let id = items.insert_queued_batch(job_id, &["ext-1".into()]).await.unwrap()[0];

        items.mark_processing(id).await.unwrap();
        assert!(items.mark_done(id).await.unwrap());
        assert!(items.mark_done(id).await.unwrap());
        assert_eq!(items.find(id).await.unwrap().unwrap().status, JobItemStatus::Done);
    }
}
