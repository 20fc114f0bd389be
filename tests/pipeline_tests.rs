//! End-to-end pipeline tests: all three workers running against the
//! in-memory broker, an in-memory SQLite database and stub providers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;

use lingopipe::domain::{JobItemStatus, JobProgress, JobStatus, ProductData};
use lingopipe::infrastructure::catalog_provider::CatalogProvider;
use lingopipe::infrastructure::translator::Translator;
use lingopipe::infrastructure::{
    AppConfig, ArtifactConfig, DatabaseConnection, JobItemRepository, JobRepository,
    TranslationRepository,
};
use lingopipe::messages::{FetchRequest, PersistRequest};
use lingopipe::queue::{InMemoryBroker, QueueBroker, QueueName};
use lingopipe::workers::{PipelineHandles, PipelineRuntime};

struct StubCatalog {
    pages: HashMap<u32, Result<Vec<ProductData>, String>>,
    by_ids: Vec<ProductData>,
}

impl StubCatalog {
    fn with_pages(pages: HashMap<u32, Result<Vec<ProductData>, String>>) -> Self {
        Self { pages, by_ids: Vec::new() }
    }

    fn with_products(by_ids: Vec<ProductData>) -> Self {
        Self { pages: HashMap::new(), by_ids }
    }
}

#[async_trait]
impl CatalogProvider for StubCatalog {
    async fn fetch_page(&self, limit: u32, offset: u32) -> Result<Vec<ProductData>> {
        let page = offset / limit + 1;
        match self.pages.get(&page) {
            Some(Ok(products)) => Ok(products.clone()),
            Some(Err(message)) => bail!("{message}"),
            None => Ok(Vec::new()),
        }
    }

    async fn fetch_by_ids(&self, ids: &[String]) -> Result<Vec<ProductData>> {
        Ok(self.by_ids.iter().filter(|p| ids.contains(&p.id)).cloned().collect())
    }

    async fn total_count(&self) -> Result<u64> {
        Ok(self.by_ids.len() as u64)
    }
}

/// Echoes every string field back with a `[de]` prefix, wrapped in the
/// kind of chatter real providers produce. Products whose title contains
/// `FAIL` are rejected.
struct StubTranslator {
    garbage: bool,
}

#[async_trait]
impl Translator for StubTranslator {
    async fn translate(&self, prompt: &str) -> Result<String> {
        if self.garbage {
            return Ok("I cannot translate this.".into());
        }
        let input: Value = serde_json::from_str(prompt)?;
        let fields = input.as_object().unwrap();
        if fields.get("title").and_then(Value::as_str).is_some_and(|t| t.contains("FAIL")) {
            bail!("provider rejected the content");
        }
        let translated: serde_json::Map<String, Value> = fields
            .iter()
            .map(|(key, value)| {
                let translated = match value {
                    Value::String(s) => Value::String(format!("[de] {s}")),
                    other => other.clone(),
                };
                (key.clone(), translated)
            })
            .collect();
        Ok(format!("Sure! {} Anything else?", serde_json::to_string(&translated)?))
    }
}

struct Harness {
    config: AppConfig,
    broker: Arc<InMemoryBroker>,
    jobs: JobRepository,
    items: JobItemRepository,
    translations: TranslationRepository,
    handles: PipelineHandles,
    _db: DatabaseConnection,
}

impl Harness {
    async fn start(catalog: StubCatalog, translator: StubTranslator) -> Self {
        let db = DatabaseConnection::in_memory().await.unwrap();
        db.migrate().await.unwrap();
        let pool = db.pool().clone();

        let config = AppConfig {
            artifacts: ArtifactConfig { enabled: false, dir: std::env::temp_dir() },
            ..AppConfig::default()
        };

        let broker = Arc::new(InMemoryBroker::new());
        let runtime = PipelineRuntime::new(
            &config,
            pool.clone(),
            broker.clone() as Arc<dyn QueueBroker>,
            Arc::new(catalog),
            Arc::new(translator),
            "{{inputJson}}".into(),
        );
        let handles = runtime.start();

        Self {
            config,
            broker,
            jobs: JobRepository::new(pool.clone()),
            items: JobItemRepository::new(pool.clone()),
            translations: TranslationRepository::new(pool),
            handles,
            _db: db,
        }
    }

    async fn create_job(&self) -> i64 {
        self.jobs.create_job("en", "de", None).await.unwrap()
    }

    async fn publish_fetch(&self, request: &FetchRequest) {
        self.broker
            .publish(self.config.queues.physical(QueueName::Fetch), request.encode().unwrap())
            .await
            .unwrap();
    }

    /// Polls job progress until `pred` holds or the timeout expires,
    /// returning the last snapshot either way.
    async fn wait_for_progress(
        &self,
        job_id: i64,
        pred: impl Fn(&JobProgress) -> bool,
    ) -> JobProgress {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let progress = self.jobs.progress(job_id).await.unwrap().unwrap();
            if pred(&progress) || Instant::now() > deadline {
                return progress;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    fn depth(&self, queue: QueueName) -> usize {
        self.broker.depth(self.config.queues.physical(queue))
    }

    /// Waits until `queue` is empty, then a grace period so the last
    /// delivery has been settled and its effects applied.
    async fn drained(&self, queue: QueueName) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while self.depth(queue) > 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    async fn shutdown(self) {
        self.handles.shutdown().await;
    }
}

fn product(id: &str, title: &str) -> ProductData {
    ProductData {
        id: id.into(),
        title: Some(title.into()),
        description: Some(format!("{title} description")),
        meta_title: None,
        meta_description: None,
        seo_keywords: vec!["test".into()],
    }
}

fn page_of(prefix: &str, count: usize) -> Vec<ProductData> {
    (0..count).map(|i| product(&format!("{prefix}-{i:04}"), &format!("Product {prefix} {i}"))).collect()
}

#[tokio::test]
async fn range_fetch_fans_out_every_page_and_completes() {
    let pages = HashMap::from([
        (1, Ok(page_of("p1", 100))),
        (2, Ok(page_of("p2", 100))),
        (3, Ok(page_of("p3", 42))),
    ]);
    let harness = Harness::start(
        StubCatalog::with_pages(pages),
        StubTranslator { garbage: false },
    )
    .await;

    let job_id = harness.create_job().await;
    harness
        .publish_fetch(&FetchRequest::Range { job_id, start_page: 1, end_page: 3, limit: 100 })
        .await;

    let progress = harness.wait_for_progress(job_id, |p| p.done == 242).await;
    assert_eq!(progress.total_items, 242);
    assert_eq!(progress.item_count, 242);
    assert_eq!(progress.done, 242);
    assert_eq!(progress.status(), JobStatus::Completed);

    // one fire-and-forget QE message per translated item
    assert_eq!(harness.depth(QueueName::Qe), 242);

    let record = harness.translations.find(1).await.unwrap().unwrap();
    assert_eq!(record.translated_text["title"], "[de] Product p1 0");
    assert_eq!(record.target_lang.as_deref(), Some("de"));

    harness.shutdown().await;
}

#[tokio::test]
async fn failed_page_does_not_abort_the_range() {
    let pages = HashMap::from([
        (1, Ok(page_of("p1", 2))),
        (2, Err("catalog returned 502".to_string())),
        (3, Ok(page_of("p3", 2))),
    ]);
    let harness = Harness::start(
        StubCatalog::with_pages(pages),
        StubTranslator { garbage: false },
    )
    .await;

    let job_id = harness.create_job().await;
    harness
        .publish_fetch(&FetchRequest::Range { job_id, start_page: 1, end_page: 3, limit: 100 })
        .await;

    let progress = harness.wait_for_progress(job_id, |p| p.done == 4).await;
    assert_eq!(progress.total_items, 4);
    assert_eq!(progress.done, 4);
    assert_eq!(progress.error, 0);
    assert_eq!(progress.status(), JobStatus::Completed);
    assert_eq!(harness.depth(QueueName::Fetch), 0);

    harness.shutdown().await;
}

#[tokio::test]
async fn translator_failure_routes_the_item_to_error() {
    let products = vec![product("good-1", "A fine chair"), product("bad-1", "FAIL me")];
    let harness = Harness::start(
        StubCatalog::with_products(products),
        StubTranslator { garbage: false },
    )
    .await;

    let job_id = harness.create_job().await;
    harness
        .publish_fetch(&FetchRequest::Ids {
            job_id,
            ids: vec!["good-1".into(), "bad-1".into()],
        })
        .await;

    let progress = harness.wait_for_progress(job_id, |p| p.done == 1 && p.error == 1).await;
    assert_eq!(progress.status(), JobStatus::Failed);
    assert_eq!(progress.done, 1);
    assert_eq!(progress.error, 1);

    for item_id in [1, 2] {
        let item = harness.items.find(item_id).await.unwrap().unwrap();
        match item.external_id.as_str() {
            "good-1" => {
                assert_eq!(item.status, JobItemStatus::Done);
                assert_eq!(harness.translations.count_for_item(item.id).await.unwrap(), 1);
            }
            "bad-1" => {
                assert_eq!(item.status, JobItemStatus::Error);
                assert!(item.error_message.unwrap().contains("provider rejected"));
                assert_eq!(harness.translations.count_for_item(item.id).await.unwrap(), 0);
            }
            other => panic!("unexpected external id {other}"),
        }
    }

    harness.shutdown().await;
}

#[tokio::test]
async fn unparseable_translator_output_fails_the_item() {
    let harness = Harness::start(
        StubCatalog::with_products(vec![product("p-1", "A lamp")]),
        StubTranslator { garbage: true },
    )
    .await;

    let job_id = harness.create_job().await;
    harness.publish_fetch(&FetchRequest::Ids { job_id, ids: vec!["p-1".into()] }).await;

    let progress = harness.wait_for_progress(job_id, |p| p.error == 1).await;
    assert_eq!(progress.status(), JobStatus::Failed);

    let item = harness.items.find(1).await.unwrap().unwrap();
    assert!(item.error_message.unwrap().contains("JSON object"));

    harness.shutdown().await;
}

#[tokio::test]
async fn empty_ids_request_is_acknowledged_without_side_effects() {
    let harness = Harness::start(
        StubCatalog::with_products(vec![product("p-1", "A lamp")]),
        StubTranslator { garbage: false },
    )
    .await;

    let job_id = harness.create_job().await;
    harness.publish_fetch(&FetchRequest::Ids { job_id, ids: vec![] }).await;

    tokio::time::sleep(Duration::from_millis(300)).await;
    let progress = harness.jobs.progress(job_id).await.unwrap().unwrap();
    assert_eq!(progress.item_count, 0);
    assert_eq!(progress.total_items, 0);
    assert_eq!(progress.status(), JobStatus::Pending);
    assert_eq!(harness.depth(QueueName::Fetch), 0);
    assert_eq!(harness.depth(QueueName::Translate), 0);

    harness.shutdown().await;
}

#[tokio::test]
async fn duplicate_persist_success_is_idempotent_and_last_wins() {
    let harness = Harness::start(
        StubCatalog::with_products(vec![]),
        StubTranslator { garbage: false },
    )
    .await;

    let job_id = harness.create_job().await;
    let item_ids =
        harness.items.insert_queued_batch(job_id, &["p-1".to_string()]).await.unwrap();
    let item_id = item_ids[0];

    let mut source = serde_json::Map::new();
    source.insert("title".into(), Value::String("A lamp".into()));
    let mut first = serde_json::Map::new();
    first.insert("title".into(), Value::String("[de] A lamp".into()));
    let mut second = serde_json::Map::new();
    second.insert("title".into(), Value::String("[de] A lamp (rev 2)".into()));

    for translated in [first, second] {
        let message =
            PersistRequest::success(item_id, "p-1", job_id, "de", source.clone(), translated);
        harness
            .broker
            .publish(
                harness.config.queues.physical(QueueName::Persist),
                message.encode().unwrap(),
            )
            .await
            .unwrap();
    }

    let progress = harness.wait_for_progress(job_id, |p| p.done == 1).await;
    assert_eq!(progress.done, 1);
    assert_eq!(progress.status(), JobStatus::Completed);

    // wait for the duplicate to drain too, then confirm a single row with
    // the later payload
    let deadline = Instant::now() + Duration::from_secs(5);
    while harness.depth(QueueName::Persist) > 0 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(harness.translations.count_for_item(item_id).await.unwrap(), 1);
    let record = harness.translations.find(item_id).await.unwrap().unwrap();
    assert_eq!(record.translated_text["title"], "[de] A lamp (rev 2)");

    let item = harness.items.find(item_id).await.unwrap().unwrap();
    assert_eq!(item.status, JobItemStatus::Done);

    harness.shutdown().await;
}

#[tokio::test]
async fn entirely_invalid_batch_aborts_without_side_effects() {
    // every product on the page lacks an external id
    let pages = HashMap::from([(1, Ok(vec![product("", "No id"), product("", "Also no id")]))]);
    let harness = Harness::start(
        StubCatalog::with_pages(pages),
        StubTranslator { garbage: false },
    )
    .await;

    let job_id = harness.create_job().await;
    harness
        .publish_fetch(&FetchRequest::Range { job_id, start_page: 1, end_page: 1, limit: 100 })
        .await;
    harness.drained(QueueName::Fetch).await;

    let progress = harness.jobs.progress(job_id).await.unwrap().unwrap();
    assert_eq!(progress.item_count, 0);
    assert_eq!(progress.total_items, 0);
    assert_eq!(progress.status(), JobStatus::Pending);
    assert_eq!(harness.depth(QueueName::Translate), 0);

    harness.shutdown().await;
}

#[tokio::test]
async fn success_payload_without_field_maps_fails_the_item() {
    let harness = Harness::start(
        StubCatalog::with_products(vec![]),
        StubTranslator { garbage: false },
    )
    .await;

    let job_id = harness.create_job().await;
    let item_id =
        harness.items.insert_queued_batch(job_id, &["p-1".to_string()]).await.unwrap()[0];

    // success-shaped (no error_message) but missing both field maps
    let payload = serde_json::to_vec(&serde_json::json!({
        "item_id": item_id,
        "external_id": "p-1",
        "job_id": job_id,
        "target_lang": "de",
    }))
    .unwrap();
    harness
        .broker
        .publish(harness.config.queues.physical(QueueName::Persist), payload)
        .await
        .unwrap();

    let progress = harness.wait_for_progress(job_id, |p| p.error == 1).await;
    assert_eq!(progress.status(), JobStatus::Failed);

    let item = harness.items.find(item_id).await.unwrap().unwrap();
    assert_eq!(item.status, JobItemStatus::Error);
    assert!(item
        .error_message
        .unwrap()
        .contains("missing source_text or translated_text"));
    assert_eq!(harness.translations.count_for_item(item_id).await.unwrap(), 0);

    harness.shutdown().await;
}

#[tokio::test]
async fn unknown_job_id_fetch_is_rejected_without_rows() {
    let harness = Harness::start(
        StubCatalog::with_products(vec![product("p-1", "A lamp")]),
        StubTranslator { garbage: false },
    )
    .await;

    harness
        .publish_fetch(&FetchRequest::Ids { job_id: 4242, ids: vec!["p-1".into()] })
        .await;
    harness.drained(QueueName::Fetch).await;

    // nacked without requeue: gone from the queue, nothing written
    assert_eq!(harness.depth(QueueName::Fetch), 0);
    assert_eq!(harness.depth(QueueName::Translate), 0);
    assert!(harness.jobs.find_job(4242).await.unwrap().is_none());
    assert!(harness.items.find(1).await.unwrap().is_none());

    harness.shutdown().await;
}

#[tokio::test]
async fn overflowing_page_offset_is_skipped_not_fatal() {
    let harness = Harness::start(
        StubCatalog::with_pages(HashMap::new()),
        StubTranslator { garbage: false },
    )
    .await;

    let job_id = harness.create_job().await;
    harness
        .publish_fetch(&FetchRequest::Range {
            job_id,
            start_page: u32::MAX,
            end_page: u32::MAX,
            limit: u32::MAX,
        })
        .await;
    harness.drained(QueueName::Fetch).await;

    // the message was settled (a worker panic would have requeued it)
    assert_eq!(harness.depth(QueueName::Fetch), 0);
    let progress = harness.jobs.progress(job_id).await.unwrap().unwrap();
    assert_eq!(progress.item_count, 0);
    assert_eq!(progress.status(), JobStatus::Pending);

    harness.shutdown().await;
}

#[tokio::test]
async fn late_failure_for_a_done_item_is_ignored() {
    let harness = Harness::start(
        StubCatalog::with_products(vec![]),
        StubTranslator { garbage: false },
    )
    .await;

    let job_id = harness.create_job().await;
    let item_id =
        harness.items.insert_queued_batch(job_id, &["p-1".to_string()]).await.unwrap()[0];

    let mut source = serde_json::Map::new();
    source.insert("title".into(), Value::String("A lamp".into()));
    let mut translated = serde_json::Map::new();
    translated.insert("title".into(), Value::String("[de] A lamp".into()));

    let success =
        PersistRequest::success(item_id, "p-1", job_id, "de", source, translated);
    harness
        .broker
        .publish(harness.config.queues.physical(QueueName::Persist), success.encode().unwrap())
        .await
        .unwrap();
    harness.wait_for_progress(job_id, |p| p.done == 1).await;

    let failure =
        PersistRequest::failure(item_id, "p-1", job_id, "too late", "translation");
    harness
        .broker
        .publish(harness.config.queues.physical(QueueName::Persist), failure.encode().unwrap())
        .await
        .unwrap();
    harness.drained(QueueName::Persist).await;

    let item = harness.items.find(item_id).await.unwrap().unwrap();
    assert_eq!(item.status, JobItemStatus::Done);
    assert!(item.error_message.is_none());
    assert_eq!(harness.translations.count_for_item(item_id).await.unwrap(), 1);
    let progress = harness.jobs.progress(job_id).await.unwrap().unwrap();
    assert_eq!(progress.status(), JobStatus::Completed);

    harness.shutdown().await;
}
