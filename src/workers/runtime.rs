//! Pipeline runtime: wires the stages together and supervises their
//! tasks inside one process.
//!
//! Each stage runs as its own tokio task and only shares the broker and
//! the database pool, so stages can also be scaled by starting more
//! tasks (or more processes against a networked broker implementing the
//! same trait).

use std::sync::Arc;

use anyhow::Result;
use futures::future::join_all;
use sqlx::SqlitePool;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::infrastructure::catalog_provider::CatalogProvider;
use crate::infrastructure::translator::Translator;
use crate::infrastructure::{
    AppConfig, DebugArtifacts, JobItemRepository, JobRepository, TranslationRepository,
};
use crate::queue::{QueueBroker, QueueName};
use crate::workers::{FetchWorker, PersistWorker, TranslateWorker};

pub struct PipelineRuntime {
    fetch: FetchWorker,
    translate: TranslateWorker,
    persist: PersistWorker,
}

impl PipelineRuntime {
    pub fn new(
        config: &AppConfig,
        pool: SqlitePool,
        broker: Arc<dyn QueueBroker>,
        provider: Arc<dyn CatalogProvider>,
        translator: Arc<dyn Translator>,
        prompt_template: String,
    ) -> Self {
        let jobs = JobRepository::new(pool.clone());
        let items = JobItemRepository::new(pool.clone());
        let translations = TranslationRepository::new(pool);
        let queues = &config.queues;

        let fetch = FetchWorker::new(
            broker.clone(),
            provider,
            jobs.clone(),
            items.clone(),
            queues.physical(QueueName::Fetch).to_owned(),
            queues.physical(QueueName::Translate).to_owned(),
        );
        let translate = TranslateWorker::new(
            broker.clone(),
            translator,
            items.clone(),
            DebugArtifacts::new(&config.artifacts),
            prompt_template,
            queues.physical(QueueName::Translate).to_owned(),
            queues.physical(QueueName::Qe).to_owned(),
            queues.physical(QueueName::Persist).to_owned(),
        );
        let persist = PersistWorker::new(
            broker,
            jobs,
            items,
            translations,
            queues.physical(QueueName::Persist).to_owned(),
        );

        Self { fetch, translate, persist }
    }

    /// Spawns one task per stage. Dropping a stage mid-delivery requeues
    /// the unsettled message; that is the crash-recovery mechanism.
    pub fn start(self) -> PipelineHandles {
        let shutdown = CancellationToken::new();

        let tasks = vec![
            spawn_stage("fetch", self.fetch.run(shutdown.clone())),
            spawn_stage("translate", self.translate.run(shutdown.clone())),
            spawn_stage("persist", self.persist.run(shutdown.clone())),
        ];

        info!("pipeline runtime started");
        PipelineHandles { tasks, shutdown }
    }
}

fn spawn_stage(
    name: &'static str,
    worker: impl std::future::Future<Output = Result<()>> + Send + 'static,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = worker.await {
            // only unexpected faults (lost broker/storage) land here;
            // process supervision restarts the worker
            error!("{name} worker exited with error: {e:#}");
        }
    })
}

pub struct PipelineHandles {
    tasks: Vec<JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl PipelineHandles {
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Cancels all stages and waits for them to drain.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for result in join_all(self.tasks).await {
            if let Err(e) = result {
                error!("worker task panicked: {e}");
            }
        }
        info!("pipeline runtime stopped");
    }
}
