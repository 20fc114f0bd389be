// Database connection and pool management
// This module handles SQLite database connections using sqlx

use std::path::Path;

use anyhow::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let max_connections = if database_url.contains(":memory:") {
            // A pooled in-memory database must stay on one connection or
            // every connection sees its own empty database.
            1
        } else {
            let db_path = database_url
                .trim_start_matches("sqlite://")
                .trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(db_path).parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            if !Path::new(db_path).exists() {
                std::fs::File::create(db_path)?;
            }
            max_connections
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Single-connection in-memory database for tests.
    pub async fn in_memory() -> Result<Self> {
        Self::new("sqlite::memory:", 1).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        let create_jobs_sql = r#"
            CREATE TABLE IF NOT EXISTS translation_jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_lang TEXT NOT NULL,
                target_lang TEXT NOT NULL,
                prompt_ref TEXT,
                total_items INTEGER NOT NULL DEFAULT 0,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
        "#;

        let create_job_items_sql = r#"
            CREATE TABLE IF NOT EXISTS job_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                job_id INTEGER NOT NULL,
                external_id TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'queued',
                error_message TEXT,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (job_id) REFERENCES translation_jobs (id) ON DELETE CASCADE
            )
        "#;

        let create_translations_sql = r#"
            CREATE TABLE IF NOT EXISTS translations (
                job_item_id INTEGER PRIMARY KEY,
                source_text TEXT NOT NULL,
                translated_text TEXT NOT NULL,
                target_lang TEXT,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (job_item_id) REFERENCES job_items (id) ON DELETE CASCADE
            )
        "#;

        let create_items_index_sql = r#"
            CREATE INDEX IF NOT EXISTS idx_job_items_job_id ON job_items (job_id)
        "#;

        sqlx::query(create_jobs_sql).execute(&self.pool).await?;
        sqlx::query(create_job_items_sql).execute(&self.pool).await?;
        sqlx::query(create_translations_sql).execute(&self.pool).await?;
        sqlx::query(create_items_index_sql).execute(&self.pool).await?;

        tracing::info!("database migration completed");
        Ok(())
    }
}
