//! Pipeline host process.
//!
//! Starts all three stage workers against the in-memory broker and the
//! configured SQLite database, optionally seeds one job from a JSON file
//! given as the first CLI argument, and runs until ctrl-c.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use lingopipe::infrastructure::translator::load_prompt_template;
use lingopipe::infrastructure::{
    logging, AppConfig, DatabaseConnection, HttpCatalogProvider, JobRepository, OpenAiTranslator,
};
use lingopipe::messages::FetchRequest;
use lingopipe::queue::{InMemoryBroker, QueueBroker, QueueName};
use lingopipe::workers::PipelineRuntime;

/// Operator seed file: describes a new translation job plus the fetch
/// request to kick it off. The job row is created first, then the
/// request is published with the fresh job id filled in.
#[derive(Debug, Deserialize)]
struct JobSeed {
    source_lang: String,
    target_lang: String,
    #[serde(default)]
    prompt_ref: Option<String>,
    /// Fetch request body without `job_id` (e.g.
    /// `{"type": "range", "start_page": 1, "end_page": 3, "limit": 100}`).
    request: Value,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_logging()?;

    let config_path = std::env::var_os("LINGOPIPE_CONFIG").map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref()).await?;

    let db = DatabaseConnection::new(&config.database.url, config.database.max_connections).await?;
    db.migrate().await?;

    let broker: Arc<dyn QueueBroker> = Arc::new(InMemoryBroker::new());
    let provider = Arc::new(HttpCatalogProvider::new(&config.catalog)?);
    let translator = Arc::new(OpenAiTranslator::new(&config.translator)?);
    let prompt_template = load_prompt_template(&config.translator.prompt_template_path).await?;

    let runtime = PipelineRuntime::new(
        &config,
        db.pool().clone(),
        broker.clone(),
        provider,
        translator,
        prompt_template,
    );
    let handles = runtime.start();

    if let Some(seed_path) = std::env::args_os().nth(1) {
        seed_job(&config, db.pool().clone(), broker.as_ref(), Path::new(&seed_path)).await?;
    }

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    info!("shutdown requested");
    handles.shutdown().await;
    Ok(())
}

/// Creates the job row described by the seed file and publishes its
/// fetch request.
async fn seed_job(
    config: &AppConfig,
    pool: sqlx::SqlitePool,
    broker: &dyn QueueBroker,
    path: &Path,
) -> Result<()> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read seed file {}", path.display()))?;
    let seed: JobSeed = serde_json::from_str(&raw)
        .with_context(|| format!("invalid seed file {}", path.display()))?;

    let jobs = JobRepository::new(pool);
    let job_id = jobs
        .create_job(&seed.source_lang, &seed.target_lang, seed.prompt_ref.as_deref())
        .await?;

    let mut request = seed.request;
    request
        .as_object_mut()
        .context("seed `request` must be a JSON object")?
        .insert("job_id".into(), Value::from(job_id));
    // round-trip through the typed message so a malformed seed fails here,
    // not in the worker
    let request: FetchRequest = serde_json::from_value(request)
        .context("seed `request` is not a valid fetch request")?;

    broker
        .publish(config.queues.physical(QueueName::Fetch), request.encode()?)
        .await?;
    info!(job_id, "seed job created and fetch request published");
    Ok(())
}
