//! Catalog fetch stage.
//!
//! Consumes `FetchRequest`s, enumerates catalog items, inserts them as
//! queued job items and fans them into the translate queue in batches.
//! A failed message is nacked without requeue (poison handling: the
//! operator resubmits); a failed page inside a range is logged and
//! skipped so one bad page cannot abort the rest of the range.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::{Job, ProductData};
use crate::infrastructure::{JobItemRepository, JobRepository};
use crate::infrastructure::catalog_provider::CatalogProvider;
use crate::messages::{FetchRequest, TranslateItem, TranslateRequest};
use crate::queue::{Delivery, QueueBroker};

pub struct FetchWorker {
    broker: Arc<dyn QueueBroker>,
    provider: Arc<dyn CatalogProvider>,
    jobs: JobRepository,
    items: JobItemRepository,
    fetch_queue: String,
    translate_queue: String,
}

impl FetchWorker {
    pub fn new(
        broker: Arc<dyn QueueBroker>,
        provider: Arc<dyn CatalogProvider>,
        jobs: JobRepository,
        items: JobItemRepository,
        fetch_queue: String,
        translate_queue: String,
    ) -> Self {
        Self { broker, provider, jobs, items, fetch_queue, translate_queue }
    }

    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let mut consumer = self.broker.consumer(&self.fetch_queue).await?;
        info!("fetch worker waiting for messages on `{}`", self.fetch_queue);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("fetch worker shutting down");
                    return Ok(());
                }
                delivery = consumer.next() => {
                    self.handle(delivery?).await;
                }
            }
        }
    }

    async fn handle(&self, delivery: Delivery) {
        match self.process(delivery.payload()).await {
            Ok(()) => {
                if let Err(e) = delivery.ack().await {
                    warn!("fetch ack failed: {e}");
                }
            }
            Err(e) => {
                warn!("fetch message rejected: {e:#}");
                if let Err(e) = delivery.nack(false).await {
                    warn!("fetch nack failed: {e}");
                }
            }
        }
    }

    async fn process(&self, payload: &[u8]) -> Result<()> {
        let request = FetchRequest::decode(payload).context("invalid fetch message")?;
        let job = self
            .jobs
            .find_job(request.job_id())
            .await?
            .with_context(|| format!("job {} not found", request.job_id()))?;

        match request {
            FetchRequest::Ids { ids, .. } => {
                if ids.is_empty() {
                    info!(job_id = job.id, "ids fetch with no ids, nothing to do");
                    return Ok(());
                }
                let products = self
                    .provider
                    .fetch_by_ids(&ids)
                    .await
                    .context("catalog fetch by ids failed")?;
                if products.is_empty() {
                    info!(job_id = job.id, "no products found for the provided ids");
                    return Ok(());
                }
                self.process_batch(&job, products).await?;
            }
            FetchRequest::Range { start_page, end_page, limit, .. } => {
                info!(job_id = job.id, start_page, end_page, limit, "processing page range");
                for page in start_page..=end_page {
                    // a wire-valid page/limit pair can still overflow u32
                    let Some(offset) = page.saturating_sub(1).checked_mul(limit) else {
                        warn!(job_id = job.id, page, limit, "page offset overflows, skipping");
                        continue;
                    };
                    if let Err(e) = self.process_page(&job, page, limit, offset).await {
                        warn!(job_id = job.id, page, "page failed, continuing: {e:#}");
                    }
                }
            }
        }
        Ok(())
    }

    async fn process_page(&self, job: &Job, page: u32, limit: u32, offset: u32) -> Result<()> {
        let products = self.provider.fetch_page(limit, offset).await?;
        if products.is_empty() {
            // catalogs may have gaps; an empty page is not an error
            debug!(job_id = job.id, page, "empty page, skipping");
            return Ok(());
        }
        info!(job_id = job.id, page, count = products.len(), "processing page");
        self.process_batch(job, products).await
    }

    /// Inserts one batch of valid products as queued items, publishes the
    /// translate batch with the generated ids, and bumps the job's
    /// expected item count atomically.
    async fn process_batch(&self, job: &Job, products: Vec<ProductData>) -> Result<()> {
        let valid: Vec<ProductData> = products.into_iter().filter(ProductData::is_valid).collect();
        if valid.is_empty() {
            warn!(job_id = job.id, "batch had no structurally valid products, skipping");
            return Ok(());
        }

        let external_ids: Vec<String> = valid.iter().map(|p| p.id.clone()).collect();
        let item_ids = self
            .items
            .insert_queued_batch(job.id, &external_ids)
            .await
            .context("bulk insert of job items failed")?;

        let items = valid
            .iter()
            .zip(&item_ids)
            .map(|(product, item_id)| TranslateItem {
                item_id: *item_id,
                external_id: product.id.clone(),
                fields: product.to_field_map(),
            })
            .collect();
        let request = TranslateRequest {
            job_id: job.id,
            source_lang: job.source_lang.clone(),
            target_lang: job.target_lang.clone(),
            items,
        };

        self.broker
            .publish(&self.translate_queue, request.encode()?)
            .await
            .context("failed to publish translate batch")?;

        self.jobs.increment_total_items(job.id, valid.len() as i64).await?;
        debug!(job_id = job.id, count = valid.len(), "batch queued for translation");
        Ok(())
    }
}
