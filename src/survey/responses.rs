//! Answers collected so far, keyed by field.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::schema::FormSchema;
use super::value::FieldValue;

/// Mapping from field key to stored answer. Absence means "null".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseStore {
    values: BTreeMap<String, FieldValue>,
}

impl ResponseStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.values.get(key)
    }

    /// Store a value, returning the one it replaced.
    pub fn insert(&mut self, key: impl Into<String>, value: FieldValue) -> Option<FieldValue> {
        self.values.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        self.values.remove(key)
    }

    /// True unless the value is missing, an empty string, or an empty list.
    pub fn is_answered(&self, key: &str) -> bool {
        self.values.get(key).is_some_and(FieldValue::is_answered)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.values.iter()
    }

    /// JSON object of every stored answer.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }

    /// Human-readable list of answered fields in schema order.
    ///
    /// Confirmation fields are left out; this is what the user is asked to
    /// confirm.
    pub fn render_summary(&self, schema: &FormSchema) -> String {
        let lines: Vec<String> = schema
            .fields
            .iter()
            .filter(|field| !field.is_confirmation())
            .filter_map(|field| {
                let value = self.values.get(&field.key)?;
                value
                    .is_answered()
                    .then(|| format!("- {}: {}", summary_label(&field.label), value))
            })
            .collect();

        if lines.is_empty() {
            "(no answers yet)".to_string()
        } else {
            lines.join("\n")
        }
    }
}

/// Strip the trailing hint from a label, e.g. "Do you pay sales tax? (yes/no)".
fn summary_label(label: &str) -> &str {
    match label.find(" (") {
        Some(idx) if label.ends_with(')') => &label[..idx],
        _ => label,
    }
}
