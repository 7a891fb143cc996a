//! Form schema — the declarative description of a questionnaire.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, SurveyError};

/// The built-in business questionnaire.
const BUSINESS_SURVEY_JSON: &str = include_str!("../../forms/business_survey.json");

/// The kind of answer a field collects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Select,
    Boolean,
    Number,
    Repeat,
    Confirmation,
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Text => "text",
            Self::Select => "select",
            Self::Boolean => "boolean",
            Self::Number => "number",
            Self::Repeat => "repeat",
            Self::Confirmation => "confirmation",
        };
        write!(f, "{s}")
    }
}

/// Equality gate on an earlier answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub key: String,
    pub value: serde_json::Value,
}

/// One question node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub key: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    pub label: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    /// Sub-schema of one record, only for `repeat`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<Field>,
}

impl Field {
    /// Look up a sub-field of a repeat group.
    pub fn sub_field(&self, key: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.key == key)
    }

    pub fn is_confirmation(&self) -> bool {
        self.kind == FieldKind::Confirmation
    }
}

/// Ordered top-level fields of a questionnaire. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormSchema {
    pub fields: Vec<Field>,
}

/// On-disk wrapper: `{"form": {"fields": [...]}}`.
#[derive(Deserialize)]
struct FormDocument {
    form: FormSchema,
}

impl FormSchema {
    /// Build a schema from fields, validating it.
    pub fn new(fields: Vec<Field>) -> Result<Self, SurveyError> {
        let schema = Self { fields };
        schema.validate()?;
        Ok(schema)
    }

    /// The built-in business questionnaire.
    pub fn business_survey() -> Result<Self, SurveyError> {
        Self::from_json_str(BUSINESS_SURVEY_JSON)
    }

    /// Parse either a wrapped `{"form": {...}}` document or a bare `{"fields": [...]}`.
    pub fn from_json_str(json: &str) -> Result<Self, SurveyError> {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| SurveyError::InvalidSchema(format!("malformed JSON: {e}")))?;

        let schema = if value.get("form").is_some() {
            serde_json::from_value::<FormDocument>(value).map(|doc| doc.form)
        } else {
            serde_json::from_value::<FormSchema>(value)
        }
        .map_err(|e| SurveyError::InvalidSchema(e.to_string()))?;

        schema.validate()?;
        Ok(schema)
    }

    /// Load and validate a form file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::FormLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json_str(&text).map_err(|e| ConfigError::FormLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Top-level field by key.
    pub fn field(&self, key: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.key == key)
    }

    /// Position of a top-level field in traversal order.
    pub fn position(&self, key: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.key == key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Check structural invariants of every scope.
    ///
    /// Keys are unique per scope, `select` has options, `repeat` has a
    /// sub-schema, and every condition refers to an earlier field of the same
    /// scope.
    pub fn validate(&self) -> Result<(), SurveyError> {
        validate_scope(&self.fields, "form")
    }
}

fn validate_scope(fields: &[Field], scope: &str) -> Result<(), SurveyError> {
    let mut seen: HashSet<&str> = HashSet::new();

    for field in fields {
        if field.key.trim().is_empty() {
            return Err(SurveyError::InvalidSchema(format!(
                "{scope}: field with empty key"
            )));
        }

        if let Some(ref condition) = field.condition {
            if !seen.contains(condition.key.as_str()) {
                return Err(SurveyError::InvalidSchema(format!(
                    "{scope}.{}: condition refers to '{}', which is not an earlier field",
                    field.key, condition.key
                )));
            }
        }

        match field.kind {
            FieldKind::Select if field.options.is_empty() => {
                return Err(SurveyError::InvalidSchema(format!(
                    "{scope}.{}: select field has no options",
                    field.key
                )));
            }
            FieldKind::Repeat => {
                if field.fields.is_empty() {
                    return Err(SurveyError::InvalidSchema(format!(
                        "{scope}.{}: repeat field has no sub-fields",
                        field.key
                    )));
                }
                validate_scope(&field.fields, &format!("{scope}.{}", field.key))?;
            }
            _ => {}
        }

        if !seen.insert(field.key.as_str()) {
            return Err(SurveyError::InvalidSchema(format!(
                "{scope}: duplicate key '{}'",
                field.key
            )));
        }
    }

    Ok(())
}
