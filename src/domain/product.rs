use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON object mapping field names to their (possibly null) values.
/// Used for both source and translated text of an item.
pub type FieldMap = serde_json::Map<String, Value>;

/// One catalog entry as returned by the catalog provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductData {
    /// External catalog id. Items without one are structurally invalid
    /// and are filtered out before any insert.
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    #[serde(default)]
    pub seo_keywords: Vec<String>,
}

impl ProductData {
    pub fn is_valid(&self) -> bool {
        !self.id.is_empty()
    }

    /// Source-field map sent to the translate stage.
    pub fn to_field_map(&self) -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert("title".into(), opt_string(&self.title));
        fields.insert("description".into(), opt_string(&self.description));
        fields.insert("meta_title".into(), opt_string(&self.meta_title));
        fields.insert("meta_description".into(), opt_string(&self.meta_description));
        fields.insert(
            "seo_keywords".into(),
            Value::Array(self.seo_keywords.iter().map(|k| Value::String(k.clone())).collect()),
        );
        fields
    }
}

fn opt_string(value: &Option<String>) -> Value {
    match value {
        Some(s) => Value::String(s.clone()),
        None => Value::Null,
    }
}
