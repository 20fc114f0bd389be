//! Translation provider integration.
//!
//! The provider is a prompt-based language model with no structured
//! output guarantee: it returns free text that should contain a JSON
//! object. Parsing tries the whole text first, then falls back to the
//! first balanced `{...}` substring.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::warn;

use super::config::TranslatorConfig;
use crate::domain::FieldMap;

#[async_trait]
pub trait Translator: Send + Sync {
    /// Sends one prompt and returns the provider's raw text output.
    async fn translate(&self, prompt: &str) -> Result<String>;
}

/// Responses-API backed translator with bounded fixed-delay retries.
/// Retries happen only inside this call; the pipeline never retries via
/// message redelivery.
pub struct OpenAiTranslator {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    retry_count: u32,
    retry_delay: Duration,
}

impl OpenAiTranslator {
    pub fn new(config: &TranslatorConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            bail!("translator API key is missing (set OPENAI_API_KEY)");
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to create translator HTTP client")?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            retry_count: config.retry_count,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        })
    }

    async fn request_once(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/v1/responses", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "input": prompt,
            }))
            .send()
            .await
            .context("translation provider request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("translation provider error ({status}): {body}");
        }

        let body: Value =
            response.json().await.context("translation provider response was not JSON")?;
        Ok(extract_output_text(&body))
    }
}

#[async_trait]
impl Translator for OpenAiTranslator {
    async fn translate(&self, prompt: &str) -> Result<String> {
        let attempts = self.retry_count + 1;
        let mut last_error = None;
        for attempt in 1..=attempts {
            match self.request_once(prompt).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    warn!(attempt, attempts, "translation attempt failed: {e:#}");
                    last_error = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }
        // attempts >= 1, so last_error is always set here
        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("translation failed")))
    }
}

/// Pulls the output text out of a Responses-API body, trying the known
/// shapes before falling back to the stringified body.
pub fn extract_output_text(body: &Value) -> String {
    if let Some(text) = body.pointer("/output/0/content/0/text").and_then(Value::as_str) {
        return text.to_owned();
    }
    if let Some(text) = body.get("output_text").and_then(Value::as_str) {
        return text.to_owned();
    }
    body.to_string()
}

/// Extracts a JSON object from free text: direct parse first, then the
/// first balanced `{...}` substring (string literals and escapes are
/// respected while scanning).
pub fn extract_json_object(text: &str) -> Option<FieldMap> {
    let trimmed = text.trim();
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
        return Some(map);
    }

    let candidate = first_balanced_object(trimmed)?;
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Fills the prompt template placeholders.
pub fn build_prompt(template: &str, source_lang: &str, target_lang: &str, input_json: &str) -> String {
    template
        .replace("{{sourceLanguage}}", source_lang)
        .replace("{{targetLanguage}}", target_lang)
        .replace("{{inputJson}}", input_json)
}

pub async fn load_prompt_template(path: &std::path::Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("translation prompt template could not be loaded from {}", path.display()))
}
