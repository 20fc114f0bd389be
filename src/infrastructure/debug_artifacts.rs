//! Best-effort capture of translator input/output for operator
//! inspection. These writes sit outside the pipeline's control path:
//! any failure is logged at debug level and swallowed.

use std::path::PathBuf;

use anyhow::Result;
use serde_json::Value;
use tracing::debug;

use super::config::ArtifactConfig;
use crate::domain::FieldMap;

#[derive(Clone)]
pub struct DebugArtifacts {
    dir: PathBuf,
    enabled: bool,
}

impl DebugArtifacts {
    pub fn new(config: &ArtifactConfig) -> Self {
        Self { dir: config.dir.clone(), enabled: config.enabled }
    }

    pub fn disabled() -> Self {
        Self { dir: PathBuf::new(), enabled: false }
    }

    /// Records one translation attempt. Never fails the caller.
    pub async fn record(
        &self,
        job_id: i64,
        product_id: &str,
        target_lang: &str,
        raw_output: &str,
        input_fields: &FieldMap,
        parsed: Option<&FieldMap>,
    ) {
        if !self.enabled {
            return;
        }
        if let Err(e) = self.write(job_id, product_id, target_lang, raw_output, input_fields, parsed).await {
            debug!("debug artifact write failed: {e:#}");
        }
    }

    async fn write(
        &self,
        job_id: i64,
        product_id: &str,
        target_lang: &str,
        raw_output: &str,
        input_fields: &FieldMap,
        parsed: Option<&FieldMap>,
    ) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let base = format!("{}_{}_{}", job_id, product_id, target_lang.to_lowercase());

        tokio::fs::write(self.dir.join(format!("{base}_raw.txt")), raw_output).await?;
        tokio::fs::write(
            self.dir.join(format!("{base}_input_fields.json")),
            serde_json::to_vec_pretty(&Value::Object(input_fields.clone()))?,
        )
        .await?;
        if let Some(parsed) = parsed {
            tokio::fs::write(
                self.dir.join(format!("{base}_translated_fields.json")),
                serde_json::to_vec_pretty(&Value::Object(parsed.clone()))?,
            )
            .await?;
        }
        Ok(())
    }
}
