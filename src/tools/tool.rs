//! The `Tool` trait and its supporting types.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::SurveyError;
use crate::survey::session::SurveySession;

/// Errors raised while executing a tool.
///
/// These never fail a turn; the controller reports them back to the model as
/// a structured `{success: false}` result.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Tool not found: {0}")]
    NotFound(String),
}

impl From<SurveyError> for ToolError {
    fn from(err: SurveyError) -> Self {
        match err {
            SurveyError::UnknownFieldKey { key } => ToolError::UnknownField(key),
            SurveyError::InvalidValue { reason, .. } => ToolError::InvalidParameters(reason),
            other => ToolError::ExecutionFailed(other.to_string()),
        }
    }
}

/// Result of a successful tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub result: serde_json::Value,
    pub duration: Duration,
}

impl ToolOutput {
    pub fn success(result: serde_json::Value, duration: Duration) -> Self {
        Self { result, duration }
    }

    pub fn text(text: impl Into<String>, duration: Duration) -> Self {
        Self {
            result: serde_json::Value::String(text.into()),
            duration,
        }
    }

    /// Render the result as the content of a tool message.
    pub fn to_content(&self) -> String {
        match &self.result {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// State a tool may touch during one turn.
///
/// Holds the session exclusively: the controller owns its lock for the whole
/// turn, so tool calls observe each other's writes in issue order.
pub struct TurnContext<'a> {
    pub session: &'a mut SurveySession,
}

impl<'a> TurnContext<'a> {
    pub fn new(session: &'a mut SurveySession) -> Self {
        Self { session }
    }

    pub fn thread_id(&self) -> &str {
        self.session.thread_id()
    }
}

/// A capability the model can invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the model calls the tool by.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema of the parameters object.
    fn parameters_schema(&self) -> serde_json::Value;

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &mut TurnContext<'_>,
    ) -> Result<ToolOutput, ToolError>;
}

/// Fetch a required string parameter.
pub fn require_str<'a>(params: &'a serde_json::Value, name: &str) -> Result<&'a str, ToolError> {
    params
        .get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::InvalidParameters(format!("missing '{name}' parameter")))
}
