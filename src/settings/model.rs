use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Field that pre-dates `filterRegex`: `{ "active": bool, "value": string }`.
const LEGACY_FILTER_FIELD: &str = "filterRegexProps";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Buildtime,
    Status,
}

/// Dashboard settings shared by every subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub disabled_pipelines: Vec<String>,
    pub sort_order: SortOrder,
    pub filter_regex: String,
    pub dark_theme: bool,
}

impl Settings {
    pub fn is_disabled(&self, pipeline: &str) -> bool {
        self.disabled_pipelines.iter().any(|name| name == pipeline)
    }

    /// Reads a stored settings document, migrating the legacy filter field.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not a settings object.
    pub fn from_document(mut document: Value) -> Result<Self> {
        if let Some(fields) = document.as_object_mut() {
            fields.remove(super::ID_FIELD);

            if let Some(legacy) = fields.remove(LEGACY_FILTER_FIELD) {
                let active = legacy.get("active").and_then(Value::as_bool).unwrap_or(false);
                let has_filter = fields
                    .get("filterRegex")
                    .and_then(Value::as_str)
                    .is_some_and(|filter| !filter.is_empty());

                if active && !has_filter {
                    let value = legacy
                        .get("value")
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    fields.insert("filterRegex".to_string(), Value::from(value));
                }
            }
        }

        Ok(serde_json::from_value(document)?)
    }

    /// Deduplicates the disabled list, keeping first-seen order.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        let mut seen = indexmap::IndexSet::new();
        self.disabled_pipelines.retain(|name| seen.insert(name.clone()));
        self
    }
}
