//! Translate stage.
//!
//! Consumes one translate batch at a time, calls the translation
//! provider per item, and publishes one persist message per item:
//! success (with both field maps) or failure (with the error routed to
//! the persist stage, which terminalizes the item as `error`). Failures
//! are isolated per item; a batch with any failed item is nacked without
//! requeue after every item has been routed, so nothing is retried by
//! redelivery.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::FieldMap;
use crate::infrastructure::debug_artifacts::DebugArtifacts;
use crate::infrastructure::translator::{build_prompt, extract_json_object, Translator};
use crate::infrastructure::JobItemRepository;
use crate::messages::{PersistRequest, QeRequest, TranslateItem, TranslateRequest};
use crate::queue::{Delivery, QueueBroker};

pub struct TranslateWorker {
    broker: Arc<dyn QueueBroker>,
    translator: Arc<dyn Translator>,
    items: JobItemRepository,
    artifacts: DebugArtifacts,
    prompt_template: String,
    translate_queue: String,
    qe_queue: String,
    persist_queue: String,
}

impl TranslateWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        broker: Arc<dyn QueueBroker>,
        translator: Arc<dyn Translator>,
        items: JobItemRepository,
        artifacts: DebugArtifacts,
        prompt_template: String,
        translate_queue: String,
        qe_queue: String,
        persist_queue: String,
    ) -> Self {
        Self {
            broker,
            translator,
            items,
            artifacts,
            prompt_template,
            translate_queue,
            qe_queue,
            persist_queue,
        }
    }

    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let mut consumer = self.broker.consumer(&self.translate_queue).await?;
        info!("translate worker waiting for messages on `{}`", self.translate_queue);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("translate worker shutting down");
                    return Ok(());
                }
                delivery = consumer.next() => {
                    self.handle(delivery?).await;
                }
            }
        }
    }

    async fn handle(&self, delivery: Delivery) {
        let request = match TranslateRequest::decode(delivery.payload()) {
            Ok(request) => request,
            Err(e) => {
                warn!("dropping malformed translate message: {e}");
                if let Err(e) = delivery.nack(false).await {
                    warn!("translate nack failed: {e}");
                }
                return;
            }
        };

        // dequeue moves the batch's items forward; terminal items are left
        // untouched by the conditional update
        for item in &request.items {
            if let Err(e) = self.items.mark_processing(item.item_id).await {
                warn!(item_id = item.item_id, "could not mark item as processing: {e:#}");
            }
        }

        let mut failed = 0usize;
        for item in &request.items {
            match self.handle_item(&request, item).await {
                Ok(true) => {}
                Ok(false) => failed += 1,
                Err(e) => {
                    // routing the item failed too (broker trouble); the
                    // message-level nack below keeps the batch from looping
                    warn!(item_id = item.item_id, "item routing failed: {e:#}");
                    failed += 1;
                }
            }
        }

        // Settling after all publishes is the durability boundary: a
        // crash before this point redelivers the batch and reprocesses
        // it idempotently.
        let result = if failed == 0 {
            info!(job_id = request.job_id, items = request.items.len(), "batch translated");
            delivery.ack().await
        } else {
            warn!(
                job_id = request.job_id,
                failed,
                items = request.items.len(),
                "batch had failed items, dropping message"
            );
            delivery.nack(false).await
        };
        if let Err(e) = result {
            warn!("translate settle failed: {e}");
        }
    }

    /// Returns `Ok(true)` when the item was translated and routed for
    /// persistence, `Ok(false)` when it failed and was routed as an
    /// error.
    async fn handle_item(&self, request: &TranslateRequest, item: &TranslateItem) -> Result<bool> {
        match self.translate_item(request, item).await {
            Ok(translated) => {
                self.publish_success(request, item, translated).await?;
                Ok(true)
            }
            Err(e) => {
                warn!(
                    item_id = item.item_id,
                    external_id = %item.external_id,
                    "translation failed: {e:#}"
                );
                let failure = PersistRequest::failure(
                    item.item_id,
                    item.external_id.clone(),
                    request.job_id,
                    format!("{e:#}"),
                    "translation",
                );
                self.broker
                    .publish(&self.persist_queue, failure.encode()?)
                    .await
                    .context("failed to publish persist failure")?;
                Ok(false)
            }
        }
    }

    async fn translate_item(
        &self,
        request: &TranslateRequest,
        item: &TranslateItem,
    ) -> Result<FieldMap> {
        let input_json = serde_json::to_string(&Value::Object(item.fields.clone()))?;
        let prompt = build_prompt(
            &self.prompt_template,
            &request.source_lang,
            &request.target_lang,
            &input_json,
        );

        let raw = self.translator.translate(&prompt).await?;
        let parsed = extract_json_object(&raw);

        self.artifacts
            .record(
                request.job_id,
                &item.external_id,
                &request.target_lang,
                &raw,
                &item.fields,
                parsed.as_ref(),
            )
            .await;

        parsed.context("could not parse a JSON object from translator output")
    }

    async fn publish_success(
        &self,
        request: &TranslateRequest,
        item: &TranslateItem,
        translated: FieldMap,
    ) -> Result<()> {
        let qe = QeRequest::from_field_maps(
            request.job_id,
            item.external_id.clone(),
            request.source_lang.clone(),
            request.target_lang.clone(),
            &item.fields,
            &translated,
        );
        self.broker
            .publish(&self.qe_queue, qe.encode()?)
            .await
            .context("failed to publish QE message")?;

        let persist = PersistRequest::success(
            item.item_id,
            item.external_id.clone(),
            request.job_id,
            request.target_lang.clone(),
            item.fields.clone(),
            translated,
        );
        self.broker
            .publish(&self.persist_queue, persist.encode()?)
            .await
            .context("failed to publish persist message")?;
        Ok(())
    }
}
