//! Traversal engine: decides which field to ask next.
//!
//! The engine owns the response store and a cursor into the top-level field
//! list. The cursor only moves forward: `next_field` skips answered and
//! condition-unmet fields, and every new answer moves it past the answered
//! field.

use std::sync::Arc;

use serde::Serialize;

use super::responses::ResponseStore;
use super::schema::{Field, FormSchema};
use super::value::FieldValue;
use crate::error::SurveyError;

/// What a write did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SetOutcome {
    /// First answer for the field; the cursor moved past it.
    Stored,
    /// An earlier answer was replaced; the cursor did not move.
    Corrected,
    /// The identical value was already stored; nothing changed.
    Unchanged,
    /// A `no` to a confirmation field. Not stored, cursor unchanged.
    ConfirmationDeclined,
}

/// Cursor plus answers for one session.
#[derive(Debug, Clone)]
pub struct TraversalEngine {
    schema: Arc<FormSchema>,
    responses: ResponseStore,
    cursor: usize,
}

impl TraversalEngine {
    /// Fresh traversal at the first field.
    pub fn new(schema: Arc<FormSchema>) -> Self {
        Self {
            schema,
            responses: ResponseStore::new(),
            cursor: 0,
        }
    }

    /// Rebuild from persisted state. The cursor is clamped to the schema.
    pub fn restore(schema: Arc<FormSchema>, responses: ResponseStore, cursor: usize) -> Self {
        let cursor = cursor.min(schema.len());
        Self {
            schema,
            responses,
            cursor,
        }
    }

    pub fn schema(&self) -> &Arc<FormSchema> {
        &self.schema
    }

    pub fn responses(&self) -> &ResponseStore {
        &self.responses
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_answered(&self, key: &str) -> bool {
        self.responses.is_answered(key)
    }

    /// Every field is behind the cursor and none was left unanswered.
    pub fn is_complete(&self) -> bool {
        self.cursor >= self.schema.len() && self.backfill_index().is_none()
    }

    /// The next field to ask, or `None` once the session is complete.
    ///
    /// Calling this repeatedly without a write returns the same field.
    pub fn next_field(&mut self) -> Option<&Field> {
        let idx = self.next_index()?;
        self.schema.fields.get(idx)
    }

    fn next_index(&mut self) -> Option<usize> {
        let schema = Arc::clone(&self.schema);

        while let Some(field) = schema.fields.get(self.cursor) {
            if self.responses.is_answered(&field.key) || !self.condition_met(field) {
                self.cursor += 1;
                continue;
            }

            // Corrections and out-of-order answers can leave an eligible field
            // behind the cursor; it is asked before the confirmation.
            if field.is_confirmation()
                && let Some(behind) = self.backfill_index()
            {
                return Some(behind);
            }

            return Some(self.cursor);
        }

        // A write to a late field can move the cursor past the end while
        // earlier fields are still open.
        self.backfill_index()
    }

    /// First eligible unanswered field behind the cursor, confirmations last.
    fn backfill_index(&self) -> Option<usize> {
        let behind = &self.schema.fields[..self.cursor];
        let open = |field: &Field| !self.responses.is_answered(&field.key) && self.condition_met(field);

        behind
            .iter()
            .position(|field| !field.is_confirmation() && open(field))
            .or_else(|| behind.iter().position(|field| field.is_confirmation() && open(field)))
    }

    /// Whether the field's gate (if any) is satisfied by the stored answers.
    ///
    /// A gate on an unanswered key is never met.
    pub fn condition_met(&self, field: &Field) -> bool {
        match field.condition {
            None => true,
            Some(ref condition) => self
                .responses
                .get(&condition.key)
                .is_some_and(|stored| stored.matches(&condition.value)),
        }
    }

    /// Validate a raw JSON answer against the field and store it.
    pub fn set_json(&mut self, key: &str, raw: &serde_json::Value) -> Result<SetOutcome, SurveyError> {
        let field = self
            .schema
            .field(key)
            .ok_or_else(|| SurveyError::UnknownFieldKey {
                key: key.to_string(),
            })?;
        let value = FieldValue::coerce(field, raw)?;
        self.set_value(key, value)
    }

    /// Store an answer, overwriting any previous one.
    ///
    /// A new answer moves the cursor past the field. Rewriting an answered
    /// field is a correction and leaves the cursor alone, as does writing the
    /// value that is already stored. A confirmation field only accepts an
    /// answer while it is the field due next.
    pub fn set_value(&mut self, key: &str, value: FieldValue) -> Result<SetOutcome, SurveyError> {
        let schema = Arc::clone(&self.schema);
        let position = schema
            .position(key)
            .ok_or_else(|| SurveyError::UnknownFieldKey {
                key: key.to_string(),
            })?;
        let field = &schema.fields[position];
        let value = FieldValue::coerce(field, &value.to_json())?;

        if field.is_confirmation() {
            if self.responses.get(key) == Some(&value) {
                return Ok(SetOutcome::Unchanged);
            }
            if self.next_index() != Some(position) {
                return Err(SurveyError::InvalidValue {
                    key: key.to_string(),
                    reason: "confirmation is not due yet; answer the remaining fields first"
                        .to_string(),
                });
            }
            if value.as_bool() == Some(false) {
                return Ok(SetOutcome::ConfirmationDeclined);
            }
        }

        let outcome = match self.responses.get(key) {
            Some(existing) if *existing == value => return Ok(SetOutcome::Unchanged),
            Some(existing) if existing.is_answered() => SetOutcome::Corrected,
            _ => SetOutcome::Stored,
        };

        self.responses.insert(key, value);
        if outcome == SetOutcome::Stored {
            self.cursor = self.cursor.max(position + 1);
        }

        tracing::debug!(field = %key, cursor = self.cursor, ?outcome, "Stored answer");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn engine() -> TraversalEngine {
        TraversalEngine::new(Arc::new(FormSchema::business_survey().unwrap()))
    }

    fn next_key(engine: &mut TraversalEngine) -> Option<String> {
        engine.next_field().map(|f| f.key.clone())
    }

    fn answer_basics(engine: &mut TraversalEngine) {
        engine.set_json("business_name", &json!("Acme")).unwrap();
        engine.set_json("business_type", &json!("LLC")).unwrap();
    }

    #[test]
    fn fresh_session_asks_business_name() {
        let mut engine = engine();
        assert_eq!(next_key(&mut engine).as_deref(), Some("business_name"));
        assert_eq!(engine.cursor(), 0);
        assert!(!engine.is_complete());
    }

    #[test]
    fn declining_sales_tax_skips_countries() {
        let mut engine = engine();
        answer_basics(&mut engine);
        engine.set_value("pays_sales_tax", FieldValue::Boolean(false)).unwrap();

        assert_eq!(next_key(&mut engine).as_deref(), Some("has_employees"));
    }

    #[test]
    fn declining_sales_tax_on_fresh_session_skips_countries() {
        let mut engine = engine();
        engine.set_value("pays_sales_tax", FieldValue::Boolean(false)).unwrap();
        assert_eq!(next_key(&mut engine).as_deref(), Some("has_employees"));
    }

    #[test]
    fn having_employees_asks_count() {
        let mut engine = engine();
        answer_basics(&mut engine);
        engine.set_value("pays_sales_tax", FieldValue::Boolean(false)).unwrap();
        assert_eq!(next_key(&mut engine).as_deref(), Some("has_employees"));

        engine.set_value("has_employees", FieldValue::Boolean(true)).unwrap();
        assert_eq!(next_key(&mut engine).as_deref(), Some("employee_count"));
    }

    #[test]
    fn paying_sales_tax_asks_countries() {
        let mut engine = engine();
        answer_basics(&mut engine);
        engine.set_json("pays_sales_tax", &json!("yes")).unwrap();
        assert_eq!(next_key(&mut engine).as_deref(), Some("sales_tax_countries"));
    }

    #[test]
    fn all_answered_completes() {
        let mut engine = engine();
        answer_basics(&mut engine);
        engine.set_json("pays_sales_tax", &json!(true)).unwrap();
        engine
            .set_json(
                "sales_tax_countries",
                &json!([{"country_name": "France", "sales_tax_rate": 20}]),
            )
            .unwrap();
        engine.set_json("has_employees", &json!(true)).unwrap();
        engine.set_json("employee_count", &json!(12)).unwrap();
        assert_eq!(next_key(&mut engine).as_deref(), Some("confirm_information"));

        engine.set_json("confirm_information", &json!(true)).unwrap();
        assert!(engine.is_complete());
        assert!(engine.next_field().is_none());
    }

    #[test]
    fn next_field_is_idempotent() {
        let mut engine = engine();
        answer_basics(&mut engine);
        engine.set_json("pays_sales_tax", &json!(false)).unwrap();

        let first = next_key(&mut engine);
        let cursor = engine.cursor();
        for _ in 0..3 {
            assert_eq!(next_key(&mut engine), first);
            assert_eq!(engine.cursor(), cursor);
        }
    }

    #[test]
    fn cursor_never_decreases() {
        let mut engine = engine();
        let writes = [
            ("business_name", json!("Acme")),
            ("business_type", json!("Partnership")),
            ("business_name", json!("Acme Ltd")),
            ("pays_sales_tax", json!(false)),
            ("business_type", json!("LLC")),
            ("has_employees", json!(false)),
            ("confirm_information", json!(false)),
            ("confirm_information", json!(true)),
        ];

        let mut last = engine.cursor();
        for (key, value) in writes {
            engine.set_json(key, &value).unwrap();
            assert!(engine.cursor() >= last, "cursor went backwards on {key}");
            last = engine.cursor();
            engine.next_field();
            assert!(engine.cursor() >= last);
            last = engine.cursor();
        }
    }

    #[test]
    fn never_returns_answered_or_gated_fields() {
        let answers: [(&str, serde_json::Value); 6] = [
            ("business_name", json!("Acme")),
            ("business_type", json!("LLC")),
            ("pays_sales_tax", json!(false)),
            ("has_employees", json!(false)),
            ("employee_count", json!(3)),
            ("confirm_information", json!(true)),
        ];

        let mut engine = engine();
        for (key, value) in answers {
            if let Some(field) = engine.next_field().cloned() {
                assert!(!engine.is_answered(&field.key));
                assert!(engine.condition_met(&field), "{} is gated", field.key);
                assert_ne!(field.key, "sales_tax_countries");
                assert_ne!(field.key, "employee_count");
            }
            engine.set_json(key, &value).unwrap();
        }
        assert!(engine.is_complete());
    }

    #[test]
    fn replaying_the_same_answer_does_not_advance() {
        let mut engine = engine();
        assert_eq!(
            engine.set_json("business_name", &json!("Acme")).unwrap(),
            SetOutcome::Stored
        );
        let cursor = engine.cursor();

        assert_eq!(
            engine.set_json("business_name", &json!("Acme")).unwrap(),
            SetOutcome::Unchanged
        );
        assert_eq!(engine.cursor(), cursor);
        assert_eq!(next_key(&mut engine).as_deref(), Some("business_type"));
    }

    #[test]
    fn correction_overwrites_without_advancing() {
        let mut engine = engine();
        answer_basics(&mut engine);
        let cursor = engine.cursor();

        let outcome = engine.set_json("business_name", &json!("Acme Holdings")).unwrap();
        assert_eq!(outcome, SetOutcome::Corrected);
        assert_eq!(engine.cursor(), cursor);
        assert_eq!(
            engine.responses().get("business_name"),
            Some(&FieldValue::Text("Acme Holdings".into()))
        );
    }

    #[test]
    fn declined_confirmation_is_not_stored() {
        let mut engine = engine();
        answer_basics(&mut engine);
        engine.set_json("pays_sales_tax", &json!(false)).unwrap();
        engine.set_json("has_employees", &json!(false)).unwrap();
        assert_eq!(next_key(&mut engine).as_deref(), Some("confirm_information"));

        let outcome = engine.set_json("confirm_information", &json!("no")).unwrap();
        assert_eq!(outcome, SetOutcome::ConfirmationDeclined);
        assert!(!engine.is_answered("confirm_information"));
        assert!(!engine.is_complete());
        assert_eq!(next_key(&mut engine).as_deref(), Some("confirm_information"));
    }

    #[test]
    fn correction_that_opens_a_gate_is_asked_before_confirmation() {
        let mut engine = engine();
        answer_basics(&mut engine);
        engine.set_json("pays_sales_tax", &json!(false)).unwrap();
        engine.set_json("has_employees", &json!(false)).unwrap();
        assert_eq!(next_key(&mut engine).as_deref(), Some("confirm_information"));

        engine.set_json("confirm_information", &json!(false)).unwrap();
        engine.set_json("has_employees", &json!(true)).unwrap();

        assert_eq!(next_key(&mut engine).as_deref(), Some("employee_count"));
        engine.set_json("employee_count", &json!(4)).unwrap();
        assert_eq!(next_key(&mut engine).as_deref(), Some("confirm_information"));
    }

    #[test]
    fn early_confirmation_is_rejected() {
        let mut engine = engine();
        let err = engine
            .set_json("confirm_information", &json!(true))
            .unwrap_err();
        assert!(matches!(err, SurveyError::InvalidValue { ref key, .. } if key == "confirm_information"));
        assert!(!engine.is_answered("confirm_information"));
        assert!(!engine.is_complete());
        assert_eq!(engine.cursor(), 0);
        assert_eq!(next_key(&mut engine).as_deref(), Some("business_name"));

        answer_basics(&mut engine);
        assert!(engine.set_json("confirm_information", &json!(false)).is_err());
    }

    #[test]
    fn answering_the_last_field_early_does_not_complete() {
        let schema = Arc::new(
            FormSchema::from_json_str(
                r#"{"fields": [
                    {"key": "name", "type": "text", "label": "Name?", "required": true},
                    {"key": "age", "type": "number", "label": "Age?", "required": true}
                ]}"#,
            )
            .unwrap(),
        );
        let mut engine = TraversalEngine::new(schema);
        engine.set_json("age", &json!(40)).unwrap();

        assert_eq!(engine.cursor(), 2);
        assert!(!engine.is_complete());
        assert_eq!(next_key(&mut engine).as_deref(), Some("name"));

        engine.set_json("name", &json!("Ada")).unwrap();
        assert!(engine.is_complete());
        assert!(engine.next_field().is_none());
    }

    #[test]
    fn unknown_key_is_rejected() {
        let mut engine = engine();
        let err = engine.set_json("favorite_color", &json!("blue")).unwrap_err();
        assert!(matches!(err, SurveyError::UnknownFieldKey { ref key } if key == "favorite_color"));
        assert_eq!(engine.cursor(), 0);
        assert!(engine.responses().is_empty());
    }

    #[test]
    fn invalid_value_leaves_state_untouched() {
        let mut engine = engine();
        answer_basics(&mut engine);
        let cursor = engine.cursor();
        assert!(engine.set_json("pays_sales_tax", &json!("sometimes")).is_err());
        assert_eq!(engine.cursor(), cursor);
        assert!(!engine.is_answered("pays_sales_tax"));
    }

    #[test]
    fn set_value_rejects_mismatched_kind() {
        let mut engine = engine();
        let err = engine
            .set_value("employee_count", FieldValue::Text("many".into()))
            .unwrap_err();
        assert!(matches!(err, SurveyError::InvalidValue { .. }));
    }

    #[test]
    fn completion_ignores_repeat_contents() {
        let schema = Arc::new(
            FormSchema::from_json_str(
                r#"{"fields": [{
                    "key": "items", "type": "repeat", "label": "Items?",
                    "fields": [{"key": "name", "type": "text", "label": "Name", "required": true}]
                }]}"#,
            )
            .unwrap(),
        );
        let mut engine = TraversalEngine::new(schema);
        engine
            .set_json("items", &json!([{"name": "one"}, {"name": "two"}]))
            .unwrap();
        assert!(engine.is_complete());
    }

    #[test]
    fn restore_clamps_cursor() {
        let schema = Arc::new(FormSchema::business_survey().unwrap());
        let mut engine = TraversalEngine::restore(schema, ResponseStore::new(), 99);
        assert_eq!(engine.cursor(), 7);
        assert!(!engine.is_complete());
        assert_eq!(next_key(&mut engine).as_deref(), Some("business_name"));
    }
}
