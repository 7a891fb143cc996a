//! Typed answer values and write-time coercion against a field definition.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::schema::{Field, FieldKind};
use crate::error::SurveyError;

/// One record of a repeat group, keyed by sub-field.
pub type Record = BTreeMap<String, FieldValue>;

/// A stored answer.
///
/// Serialized untagged, so the JSON form is the natural one: `true`, `12.5`,
/// `"LLC"`, or `[{"country_name": "France", ...}]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Boolean(bool),
    Number(f64),
    Text(String),
    Records(Vec<Record>),
}

impl FieldValue {
    /// An answer counts unless it is an empty string or an empty list.
    pub fn is_answered(&self) -> bool {
        match self {
            Self::Text(s) => !s.is_empty(),
            Self::Records(records) => !records.is_empty(),
            Self::Boolean(_) | Self::Number(_) => true,
        }
    }

    /// Exact equality against a condition value.
    ///
    /// Numbers compare numerically so `5` matches `5.0`.
    pub fn matches(&self, expected: &serde_json::Value) -> bool {
        match (self, expected) {
            (Self::Boolean(a), serde_json::Value::Bool(b)) => a == b,
            (Self::Number(a), serde_json::Value::Number(b)) => b.as_f64() == Some(*a),
            (Self::Text(a), serde_json::Value::String(b)) => a == b,
            (Self::Records(_), serde_json::Value::Array(_)) => &self.to_json() == expected,
            _ => false,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Boolean(b) => serde_json::Value::Bool(*b),
            Self::Number(n) => number_to_json(*n),
            Self::Text(s) => serde_json::Value::String(s.clone()),
            Self::Records(records) => serde_json::Value::Array(
                records
                    .iter()
                    .map(|record| {
                        serde_json::Value::Object(
                            record
                                .iter()
                                .map(|(k, v)| (k.clone(), v.to_json()))
                                .collect(),
                        )
                    })
                    .collect(),
            ),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Validate and normalize a raw JSON answer for `field`.
    pub fn coerce(field: &Field, raw: &serde_json::Value) -> Result<Self, SurveyError> {
        coerce_at(field, raw, &field.key)
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Boolean(true) => write!(f, "yes"),
            Self::Boolean(false) => write!(f, "no"),
            Self::Number(n) => write!(f, "{}", number_to_json(*n)),
            Self::Text(s) => write!(f, "{s}"),
            Self::Records(records) => {
                let rendered: Vec<String> = records
                    .iter()
                    .map(|record| {
                        record
                            .iter()
                            .map(|(k, v)| format!("{k}: {v}"))
                            .collect::<Vec<_>>()
                            .join(", ")
                    })
                    .collect();
                write!(f, "{}", rendered.join("; "))
            }
        }
    }
}

/// Whole numbers render without a trailing `.0`.
fn number_to_json(n: f64) -> serde_json::Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

fn invalid(path: &str, reason: impl Into<String>) -> SurveyError {
    SurveyError::InvalidValue {
        key: path.to_string(),
        reason: reason.into(),
    }
}

fn coerce_at(field: &Field, raw: &serde_json::Value, path: &str) -> Result<FieldValue, SurveyError> {
    if raw.is_null() {
        return Err(invalid(path, "a value is required"));
    }

    let value = match field.kind {
        FieldKind::Text => match raw {
            serde_json::Value::String(s) => FieldValue::Text(s.trim().to_string()),
            serde_json::Value::Number(n) => FieldValue::Text(n.to_string()),
            serde_json::Value::Bool(b) => FieldValue::Text(b.to_string()),
            _ => return Err(invalid(path, "expected text")),
        },
        FieldKind::Select => {
            let choice = raw
                .as_str()
                .ok_or_else(|| invalid(path, "expected one of the listed options"))?
                .trim();
            let canonical = field
                .options
                .iter()
                .find(|option| option.eq_ignore_ascii_case(choice))
                .ok_or_else(|| {
                    invalid(
                        path,
                        format!("'{choice}' is not one of: {}", field.options.join(", ")),
                    )
                })?;
            FieldValue::Text(canonical.clone())
        }
        FieldKind::Boolean | FieldKind::Confirmation => {
            FieldValue::Boolean(parse_bool(raw).ok_or_else(|| invalid(path, "expected yes or no"))?)
        }
        FieldKind::Number => FieldValue::Number(
            parse_number(raw).ok_or_else(|| invalid(path, "expected a number"))?,
        ),
        FieldKind::Repeat => {
            let items = raw
                .as_array()
                .ok_or_else(|| invalid(path, "expected a list of records"))?;
            let mut records = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                records.push(coerce_record(field, item, &format!("{path}[{i}]"))?);
            }
            FieldValue::Records(records)
        }
    };

    if field.required && !value.is_answered() {
        return Err(invalid(path, "an answer is required"));
    }

    Ok(value)
}

fn coerce_record(group: &Field, item: &serde_json::Value, path: &str) -> Result<Record, SurveyError> {
    let object = item
        .as_object()
        .ok_or_else(|| invalid(path, "expected a record object"))?;

    let mut record = Record::new();
    for (key, raw) in object {
        let sub = group.sub_field(key).ok_or_else(|| SurveyError::UnknownFieldKey {
            key: format!("{path}.{key}"),
        })?;
        if raw.is_null() && !sub.required {
            continue;
        }
        record.insert(key.clone(), coerce_at(sub, raw, &format!("{path}.{key}"))?);
    }

    if let Some(missing) = group
        .fields
        .iter()
        .find(|sub| sub.required && !record.contains_key(&sub.key))
    {
        return Err(invalid(
            &format!("{path}.{}", missing.key),
            "an answer is required",
        ));
    }

    Ok(record)
}

fn parse_bool(raw: &serde_json::Value) -> Option<bool> {
    match raw {
        serde_json::Value::Bool(b) => Some(*b),
        serde_json::Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "yes" | "y" | "true" => Some(true),
            "no" | "n" | "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn parse_number(raw: &serde_json::Value) -> Option<f64> {
    let n = match raw {
        serde_json::Value::Number(n) => n.as_f64()?,
        serde_json::Value::String(s) => s
            .trim()
            .trim_end_matches('%')
            .replace(',', "")
            .trim()
            .parse::<f64>()
            .ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}
