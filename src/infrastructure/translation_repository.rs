//! Repository for stored translations, one row per job item.
//!
//! Writes are upserts keyed by item id: a redelivered success message
//! overwrites the existing row instead of duplicating it. This is what
//! makes the persist stage safe under at-least-once delivery.

use anyhow::{Context, Result};
use sqlx::{Row, SqlitePool};

use crate::domain::FieldMap;

#[derive(Debug, Clone, PartialEq)]
pub struct TranslationRecord {
    pub job_item_id: i64,
    pub source_text: FieldMap,
    pub translated_text: FieldMap,
    pub target_lang: Option<String>,
}

#[derive(Clone)]
pub struct TranslationRepository {
    pool: SqlitePool,
}

impl TranslationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn upsert(
        &self,
        job_item_id: i64,
        source_text: &FieldMap,
        translated_text: &FieldMap,
        target_lang: Option<&str>,
    ) -> Result<()> {
        let source_json = serde_json::to_string(source_text)?;
        let translated_json = serde_json::to_string(translated_text)?;

        sqlx::query(
            r#"
            INSERT INTO translations (job_item_id, source_text, translated_text, target_lang)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (job_item_id) DO UPDATE SET
                source_text = excluded.source_text,
                translated_text = excluded.translated_text,
                target_lang = excluded.target_lang,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(job_item_id)
        .bind(source_json)
        .bind(translated_json)
        .bind(target_lang)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find(&self, job_item_id: i64) -> Result<Option<TranslationRecord>> {
        let row = sqlx::query(
            r#"
            SELECT job_item_id, source_text, translated_text, target_lang
            FROM translations
            WHERE job_item_id = ?
            "#,
        )
        .bind(job_item_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            let source_raw: String = row.try_get("source_text")?;
            let translated_raw: String = row.try_get("translated_text")?;
            Ok(TranslationRecord {
                job_item_id: row.try_get("job_item_id")?,
                source_text: serde_json::from_str(&source_raw)
                    .context("stored source_text is not a JSON object")?,
                translated_text: serde_json::from_str(&translated_raw)
                    .context("stored translated_text is not a JSON object")?,
                target_lang: row.try_get("target_lang")?,
            })
        })
        .transpose()
    }

    pub async fn count_for_item(&self, job_item_id: i64) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM translations WHERE job_item_id = ?")
                .bind(job_item_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}
