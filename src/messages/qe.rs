use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::FieldMap;

/// Field subset forwarded to the downstream quality-evaluation scorer.
pub const QE_FIELDS: [&str; 4] = ["title", "description", "meta_title", "meta_description"];

/// Fire-and-forget payload for the quality-evaluation queue. The scorer
/// is an external collaborator; nothing in this pipeline consumes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QeRequest {
    pub job_id: i64,
    pub product_id: String,
    pub source_language: String,
    pub target_language: String,
    pub src_fields: BTreeMap<String, Option<String>>,
    pub mt_fields: BTreeMap<String, Option<String>>,
}

impl QeRequest {
    /// Builds the QE payload from paired source/translated field maps,
    /// keeping only the fixed scored subset. Non-string values (keyword
    /// arrays and the like) come through as null.
    pub fn from_field_maps(
        job_id: i64,
        product_id: impl Into<String>,
        source_language: impl Into<String>,
        target_language: impl Into<String>,
        source: &FieldMap,
        translated: &FieldMap,
    ) -> Self {
        let pick = |map: &FieldMap| {
            QE_FIELDS
                .iter()
                .map(|field| {
                    let value = map.get(*field).and_then(|v| v.as_str()).map(str::to_owned);
                    ((*field).to_owned(), value)
                })
                .collect()
        };
        Self {
            job_id,
            product_id: product_id.into(),
            source_language: source_language.into(),
            target_language: target_language.into(),
            src_fields: pick(source),
            mt_fields: pick(translated),
        }
    }

    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{QeRequest, QE_FIELDS};
    use crate::domain::FieldMap;

    #[test]
    fn picks_only_the_scored_subset() {
        let source: FieldMap = json!({
            "title": "Stol",
            "description": null,
            "meta_title": "Stol | Butik",
            "meta_description": "En stol",
            "seo_keywords": ["stol", "m\u{f8}bel"]
        })
        .as_object()
        .cloned()
        .unwrap();
        let translated: FieldMap = json!({
            "title": "Tuoli",
            "description": "Hieno tuoli",
            "meta_title": "Tuoli | Kauppa",
            "meta_description": "Tuoli"
        })
        .as_object()
        .cloned()
        .unwrap();

        let request = QeRequest::from_field_maps(9, "ext-9", "da", "fi", &source, &translated);

        assert_eq!(request.src_fields.len(), QE_FIELDS.len());
        assert_eq!(request.mt_fields.len(), QE_FIELDS.len());
        assert!(!request.src_fields.contains_key("seo_keywords"));
        assert_eq!(request.src_fields["title"].as_deref(), Some("Stol"));
        assert_eq!(request.src_fields["description"], None);
        assert_eq!(request.mt_fields["title"].as_deref(), Some("Tuoli"));
    }
}
