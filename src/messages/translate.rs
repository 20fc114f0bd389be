use serde::{Deserialize, Serialize};

use crate::domain::FieldMap;

use super::DecodeError;

/// One item of a translate batch. `item_id` is the generated job-item row
/// id captured at insert time; it is the correlation key for everything
/// downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslateItem {
    pub item_id: i64,
    pub external_id: String,
    pub fields: FieldMap,
}

/// Batch message from the fetch stage to the translate stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslateRequest {
    pub job_id: i64,
    pub source_lang: String,
    pub target_lang: String,
    pub items: Vec<TranslateItem>,
}

impl TranslateRequest {
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        Ok(serde_json::from_slice(payload)?)
    }

    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

#[cfg(test)]
mod tests {
    use super::TranslateRequest;

    #[test]
    fn round_trips_a_batch() {
        let payload = br#"{
            "job_id": 3,
            "source_lang": "da",
            "target_lang": "fi",
            "items": [
                {"item_id": 11, "external_id": "ext-1", "fields": {"title": "Stol"}},
                {"item_id": 12, "external_id": "ext-2", "fields": {"title": null}}
            ]
        }"#;
        let request = TranslateRequest::decode(payload).unwrap();
        assert_eq!(request.items.len(), 2);
        assert_eq!(request.items[0].fields["title"], "Stol");

        let encoded = request.encode().unwrap();
        assert_eq!(TranslateRequest::decode(&encoded).unwrap(), request);
    }

    #[test]
    fn missing_items_is_rejected() {
        let payload = br#"{"job_id":3,"source_lang":"da","target_lang":"fi"}"#;
        assert!(TranslateRequest::decode(payload).is_err());
    }
}
