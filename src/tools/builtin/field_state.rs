//! Field-state tools used by the collaborator to read and write survey answers.
//!
//! Both tools act on the session of the current turn. Validation errors come
//! back as `ToolError`s, which the controller turns into `{success: false}`
//! results rather than failing the turn.

use std::time::Instant;

use async_trait::async_trait;

use crate::survey::traversal::SetOutcome;
use crate::tools::tool::{Tool, ToolError, ToolOutput, TurnContext, require_str};

pub const READ_FIELD_STATE: &str = "readFieldState";
pub const UPDATE_FIELD_VALUE: &str = "updateFieldValue";

/// Reports whether a field has an answer and what it is.
pub struct ReadFieldStateTool;

#[async_trait]
impl Tool for ReadFieldStateTool {
    fn name(&self) -> &str {
        READ_FIELD_STATE
    }

    fn description(&self) -> &str {
        "Read the stored answer for a form field. Returns whether the field exists in the \
         current session, whether it is answered, and its value (null when unanswered). \
         Use this before asking a field to avoid asking it twice."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "key": {
                    "type": "string",
                    "description": "The field key, e.g. \"business_name\""
                }
            },
            "required": ["key"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &mut TurnContext<'_>,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let key = require_str(&params, "key")?;
        let state = ctx.session.read_field(key)?;

        tracing::debug!(thread_id = %ctx.thread_id(), field = key, answered = state.answered, "readFieldState");

        let result = serde_json::to_value(&state)
            .map_err(|e| ToolError::ExecutionFailed(format!("Failed to encode field state: {e}")))?;
        Ok(ToolOutput::success(result, start.elapsed()))
    }
}

/// Validates and stores the user's answer for a field.
pub struct UpdateFieldValueTool;

#[async_trait]
impl Tool for UpdateFieldValueTool {
    fn name(&self) -> &str {
        UPDATE_FIELD_VALUE
    }

    fn description(&self) -> &str {
        "Store the user's answer for a form field. Use true/false for yes/no fields, a number \
         for numeric fields, one of the declared options for select fields, and a list of \
         records (one object per record, keyed by sub-field) for repeat fields. Answering the \
         confirmation field with false means the user wants to change something. Returns the \
         key of the next field to ask."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "key": {
                    "type": "string",
                    "description": "The field key, e.g. \"business_name\""
                },
                "value": {
                    "description": "The answer: string, number, boolean, or a list of records for repeat fields"
                }
            },
            "required": ["key", "value"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &mut TurnContext<'_>,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let key = require_str(&params, "key")?;
        let value = params
            .get("value")
            .ok_or_else(|| ToolError::InvalidParameters("missing 'value' parameter".to_string()))?;

        let outcome = ctx.session.write_field(key, value)?;
        let next_field = ctx.session.next_field().map(|f| f.key);

        tracing::info!(
            thread_id = %ctx.thread_id(),
            field = key,
            ?outcome,
            next = next_field.as_deref().unwrap_or("-"),
            "Field updated"
        );

        let mut result = serde_json::json!({
            "success": true,
            "key": key,
            "outcome": outcome,
            "next_field": next_field,
            "complete": ctx.session.is_complete(),
        });
        if outcome == SetOutcome::ConfirmationDeclined {
            result["note"] = serde_json::Value::String(
                "Ask the user which answer to change and store the corrected value.".to_string(),
            );
        }

        Ok(ToolOutput::success(result, start.elapsed()))
    }
}
