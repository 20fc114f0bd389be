//! Persist stage — the pipeline's terminal sink.
//!
//! Consumes persist messages and applies idempotent state transitions
//! plus the translation upsert. This stage always acknowledges, even on
//! internal failure: the item row is the source of truth, and dropping
//! an unprocessable message beats an infinite redelivery loop.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::domain::{FieldMap, JobItem};
use crate::infrastructure::{JobItemRepository, JobRepository, TranslationRepository};
use crate::messages::{PersistRequest, PersistSuccess};
use crate::queue::QueueBroker;

pub struct PersistWorker {
    broker: Arc<dyn QueueBroker>,
    jobs: JobRepository,
    items: JobItemRepository,
    translations: TranslationRepository,
    persist_queue: String,
}

impl PersistWorker {
    pub fn new(
        broker: Arc<dyn QueueBroker>,
        jobs: JobRepository,
        items: JobItemRepository,
        translations: TranslationRepository,
        persist_queue: String,
    ) -> Self {
        Self { broker, jobs, items, translations, persist_queue }
    }

    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let mut consumer = self.broker.consumer(&self.persist_queue).await?;
        info!("persist worker waiting for messages on `{}`", self.persist_queue);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("persist worker shutting down");
                    return Ok(());
                }
                delivery = consumer.next() => {
                    let delivery = delivery?;
                    self.process(delivery.payload()).await;
                    // terminal sink: always acknowledge
                    if let Err(e) = delivery.ack().await {
                        warn!("persist ack failed: {e}");
                    }
                }
            }
        }
    }

    async fn process(&self, payload: &[u8]) {
        let request = match PersistRequest::decode(payload) {
            Ok(request) => request,
            Err(e) => {
                warn!("dropping malformed persist message: {e}");
                return;
            }
        };

        let item = match self.items.find(request.item_id()).await {
            Ok(Some(item)) => item,
            Ok(None) => {
                warn!(item_id = request.item_id(), "job item not found, dropping message");
                return;
            }
            Err(e) => {
                error!(item_id = request.item_id(), "job item lookup failed: {e:#}");
                return;
            }
        };

        match request {
            PersistRequest::Failure(failure) => {
                if item.status.is_terminal() {
                    // redelivered or late failure for a settled item
                    info!(item_id = item.id, status = %item.status, "ignoring stale failure message");
                    return;
                }
                match self.items.mark_error(item.id, &failure.error_message).await {
                    Ok(_) => info!(
                        item_id = item.id,
                        stage = failure.error_stage.as_deref().unwrap_or("unknown"),
                        "marked item as error"
                    ),
                    Err(e) => error!(item_id = item.id, "failed to mark item as error: {e:#}"),
                }
            }
            PersistRequest::Success(success) => {
                self.persist_success(&item, success).await;
            }
        }
    }

    async fn persist_success(&self, item: &JobItem, success: PersistSuccess) {
        let (Some(source_text), Some(translated_text)) =
            (success.source_text.clone(), success.translated_text.clone())
        else {
            warn!(item_id = item.id, "success payload missing field maps");
            if let Err(e) = self
                .items
                .mark_error(item.id, "persist payload missing source_text or translated_text")
                .await
            {
                error!(item_id = item.id, "failed to mark item as error: {e:#}");
            }
            return;
        };

        if let Err(e) = self.store(item, &success, &source_text, &translated_text).await {
            error!(item_id = item.id, "failed to persist translation: {e:#}");
            // terminalize so the job's aggregate status reflects the loss
            if let Err(e) = self.items.mark_error(item.id, &format!("{e:#}")).await {
                error!(item_id = item.id, "failed to mark item as error: {e:#}");
            }
        }
    }

    async fn store(
        &self,
        item: &JobItem,
        success: &PersistSuccess,
        source_text: &FieldMap,
        translated_text: &FieldMap,
    ) -> Result<()> {
        // defensive re-affirm; a no-op when the item already moved on
        self.items.mark_processing(item.id).await?;

        let target_lang = match &success.target_lang {
            Some(lang) => Some(lang.clone()),
            None => self
                .jobs
                .find_job(item.job_id)
                .await
                .context("job lookup for target language failed")?
                .map(|job| job.target_lang),
        };

        self.translations
            .upsert(item.id, source_text, translated_text, target_lang.as_deref())
            .await
            .context("translation upsert failed")?;

        self.items.mark_done(item.id).await?;
        info!(item_id = item.id, "translation persisted");
        Ok(())
    }
}
