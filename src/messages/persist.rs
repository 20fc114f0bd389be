use serde::{Deserialize, Serialize};

use crate::domain::FieldMap;

use super::DecodeError;

/// Contract between the translate stage and the persist stage.
///
/// One wire shape for two outcomes: a non-empty `error_message` marks the
/// failure variant. The raw payload is decoded into one of two in-memory
/// shapes before dispatch, so downstream code never re-checks field
/// presence.
#[derive(Debug, Clone, PartialEq)]
pub enum PersistRequest {
    Success(PersistSuccess),
    Failure(PersistFailure),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PersistSuccess {
    pub item_id: i64,
    pub external_id: Option<String>,
    pub job_id: Option<i64>,
    pub target_lang: Option<String>,
    /// Field maps may still be absent on a success-shaped payload; the
    /// persist stage terminalizes such items as errors.
    pub source_text: Option<FieldMap>,
    pub translated_text: Option<FieldMap>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PersistFailure {
    pub item_id: i64,
    pub external_id: Option<String>,
    pub job_id: Option<i64>,
    pub error_message: String,
    pub error_stage: Option<String>,
}

/// Flat wire representation, shared by both variants.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistWire {
    item_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    external_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    job_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_lang: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_text: Option<FieldMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    translated_text: Option<FieldMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_stage: Option<String>,
}

impl PersistRequest {
    pub fn success(
        item_id: i64,
        external_id: impl Into<String>,
        job_id: i64,
        target_lang: impl Into<String>,
        source_text: FieldMap,
        translated_text: FieldMap,
    ) -> Self {
        Self::Success(PersistSuccess {
            item_id,
            external_id: Some(external_id.into()),
            job_id: Some(job_id),
            target_lang: Some(target_lang.into()),
            source_text: Some(source_text),
            translated_text: Some(translated_text),
        })
    }

    pub fn failure(
        item_id: i64,
        external_id: impl Into<String>,
        job_id: i64,
        error_message: impl Into<String>,
        error_stage: impl Into<String>,
    ) -> Self {
        Self::Failure(PersistFailure {
            item_id,
            external_id: Some(external_id.into()),
            job_id: Some(job_id),
            error_message: error_message.into(),
            error_stage: Some(error_stage.into()),
        })
    }

    pub fn item_id(&self) -> i64 {
        match self {
            Self::Success(s) => s.item_id,
            Self::Failure(f) => f.item_id,
        }
    }

    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let wire: PersistWire = serde_json::from_slice(payload)?;
        let item_id = wire.item_id.ok_or(DecodeError::MissingField("item_id"))?;
        match wire.error_message {
            Some(message) if !message.is_empty() => Ok(Self::Failure(PersistFailure {
                item_id,
                external_id: wire.external_id,
                job_id: wire.job_id,
                error_message: message,
                error_stage: wire.error_stage,
            })),
            _ => Ok(Self::Success(PersistSuccess {
                item_id,
                external_id: wire.external_id,
                job_id: wire.job_id,
                target_lang: wire.target_lang,
                source_text: wire.source_text,
                translated_text: wire.translated_text,
            })),
        }
    }

    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        let wire = match self.clone() {
            Self::Success(s) => PersistWire {
                item_id: Some(s.item_id),
                external_id: s.external_id,
                job_id: s.job_id,
                target_lang: s.target_lang,
                source_text: s.source_text,
                translated_text: s.translated_text,
                ..PersistWire::default()
            },
            Self::Failure(f) => PersistWire {
                item_id: Some(f.item_id),
                external_id: f.external_id,
                job_id: f.job_id,
                error_message: Some(f.error_message),
                error_stage: f.error_stage,
                ..PersistWire::default()
            },
        };
        serde_json::to_vec(&wire)
    }
}
