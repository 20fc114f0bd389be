//! Catalog provider integration.
//!
//! The provider is an external collaborator: empty results are a valid,
//! non-error outcome, and it may silently cap page sizes below the
//! requested limit. Failures surface as errors so the consuming stage
//! can apply its own confinement (per-page skip, nack, ...).

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::config::CatalogConfig;
use crate::domain::ProductData;

#[async_trait]
pub trait CatalogProvider: Send + Sync {
    /// One page of the catalog. `offset` is row-based; providers page
    /// internally with `page = offset / limit + 1`.
    async fn fetch_page(&self, limit: u32, offset: u32) -> Result<Vec<ProductData>>;

    async fn fetch_by_ids(&self, ids: &[String]) -> Result<Vec<ProductData>>;

    async fn total_count(&self) -> Result<u64>;
}

/// Store-API backed catalog provider.
pub struct HttpCatalogProvider {
    client: Client,
    base_url: String,
    access_key: String,
}

impl HttpCatalogProvider {
    pub fn new(config: &CatalogConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to create catalog HTTP client")?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            access_key: config.access_key.clone(),
        })
    }

    async fn post_products(&self, body: Value) -> Result<Value> {
        let url = format!("{}/store-api/product", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("sw-access-key", &self.access_key)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("catalog request to {url} failed"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("catalog provider error ({status}): {body}");
        }

        response.json().await.context("catalog response was not valid JSON")
    }

    fn map_elements(body: &Value) -> Vec<ProductData> {
        body.get("elements")
            .and_then(Value::as_array)
            .map(|elements| elements.iter().filter_map(map_product).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CatalogProvider for HttpCatalogProvider {
    async fn fetch_page(&self, limit: u32, offset: u32) -> Result<Vec<ProductData>> {
        let limit = limit.max(1);
        let page = offset / limit + 1;
        let body = self
            .post_products(json!({
                "page": page,
                "limit": limit,
                "total-count-mode": "none",
            }))
            .await?;
        Ok(Self::map_elements(&body))
    }

    async fn fetch_by_ids(&self, ids: &[String]) -> Result<Vec<ProductData>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let body = self
            .post_products(json!({
                "ids": ids,
                "limit": ids.len(),
            }))
            .await?;
        Ok(Self::map_elements(&body))
    }

    async fn total_count(&self) -> Result<u64> {
        let body = self
            .post_products(json!({
                "page": 1,
                "limit": 1,
                "total-count-mode": "exact",
            }))
            .await?;
        Ok(body.get("total").and_then(Value::as_u64).unwrap_or(0))
    }
}

/// Maps one raw catalog element, preferring translated fields over the
/// base ones. Entries without a usable title are skipped.
fn map_product(raw: &Value) -> Option<ProductData> {
    let pick = |field: &str| {
        raw.pointer(&format!("/translated/{field}"))
            .and_then(Value::as_str)
            .or_else(|| raw.get(field).and_then(Value::as_str))
            .map(str::to_owned)
    };

    let title = pick("name").filter(|t| !t.trim().is_empty())?;

    let seo_keywords = pick("keywords")
        .map(|keywords| {
            keywords
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default();

    Some(ProductData {
        id: raw.get("id").and_then(Value::as_str).unwrap_or_default().to_owned(),
        title: Some(title),
        description: pick("description"),
        meta_title: pick("metaTitle"),
        meta_description: pick("metaDescription"),
        seo_keywords,
    })
}
