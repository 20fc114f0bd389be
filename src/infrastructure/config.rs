//! Configuration loading and management for the pipeline process.
//!
//! Configuration is a JSON file with serde defaults for every field, so a
//! missing file or a partial file both work. Secrets (provider keys) can
//! always be supplied through the environment, overriding the file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::queue::QueueName;

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub queues: QueueConfig,
    pub catalog: CatalogConfig,
    pub translator: TranslatorConfig,
    pub artifacts: ArtifactConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: "sqlite://data/lingopipe.db".into(), max_connections: 10 }
    }
}

/// Physical queue name for each logical pipeline hop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub fetch: String,
    pub translate: String,
    pub qe: String,
    pub persist: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            fetch: "product_fetch".into(),
            translate: "product_translate".into(),
            qe: "product_qe".into(),
            persist: "product_translation_persist".into(),
        }
    }
}

impl QueueConfig {
    pub fn physical(&self, queue: QueueName) -> &str {
        match queue {
            QueueName::Fetch => &self.fetch,
            QueueName::Translate => &self.translate,
            QueueName::Qe => &self.qe,
            QueueName::Persist => &self.persist,
        }
    }
}

/// Catalog provider endpoint. Page-size limits are provider-controlled;
/// the requested limit is passed through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub base_url: String,
    pub access_key: String,
    pub timeout_secs: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self { base_url: "http://localhost:8000".into(), access_key: String::new(), timeout_secs: 30 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslatorConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
    /// Bounded in-call retries with a fixed delay; redelivery is never
    /// used for provider retry.
    pub retry_count: u32,
    pub retry_delay_ms: u64,
    pub prompt_template_path: PathBuf,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".into(),
            api_key: String::new(),
            model: "gpt-4.1-mini".into(),
            timeout_secs: 60,
            retry_count: 2,
            retry_delay_ms: 500,
            prompt_template_path: PathBuf::from("resources/prompts/product_translation.txt"),
        }
    }
}

/// Best-effort debug artifact capture for translator output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    pub enabled: bool,
    pub dir: PathBuf,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self { enabled: true, dir: PathBuf::from("storage/ai_debug") }
    }
}

impl AppConfig {
    /// Loads configuration from `path` when given and present, falling
    /// back to defaults, then applies environment overrides.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) if tokio::fs::try_exists(path).await.unwrap_or(false) => {
                let raw = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("failed to read config file {}", path.display()))?;
                let config: Self = serde_json::from_str(&raw)
                    .with_context(|| format!("invalid config file {}", path.display()))?;
                info!("loaded configuration from {}", path.display());
                config
            }
            _ => {
                info!("using default configuration");
                Self::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.database.url = url;
        }
        if let Ok(key) = std::env::var("CATALOG_ACCESS_KEY") {
            self.catalog.access_key = key;
        }
        if let Ok(url) = std::env::var("CATALOG_BASE_URL") {
            self.catalog.base_url = url;
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.translator.api_key = key;
        }
        if let Ok(model) = std::env::var("OPENAI_MODEL") {
            self.translator.model = model;
        }
    }
}
