//! Conversation controller — runs one survey turn end to end.
//!
//! A turn locks the thread's session, forwards the conversation to the
//! collaborator with the field-state tools attached, applies tool calls in
//! the order they were issued, and extracts the user-facing message from the
//! final reply. The session is checkpointed whether the turn succeeds or not.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::extract::{ExtractionSource, extract_question};
use super::prompts::{DirectiveMode, compose_for_turn, render_final_summary};
use super::registry::SessionRegistry;
use super::session::SurveySession;
use super::state::SurveyPhase;
use crate::error::{LlmError, SurveyError};
use crate::llm::{ChatMessage, Reasoning, ReasoningContext, RespondOutput, RespondResult, ToolCall};
use crate::tools::{ToolRegistry, TurnContext};

/// Sent on the user's behalf when a turn arrives without messages.
pub const DEFAULT_START_MESSAGE: &str = "I'd like to start the survey.";

/// Controller tuning.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Collaborator calls allowed per turn before giving up.
    pub max_tool_rounds: usize,
    /// Upper bound on each collaborator call.
    pub call_timeout: Option<Duration>,
    pub prompt_mode: DirectiveMode,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: 8,
            call_timeout: None,
            prompt_mode: DirectiveMode::ToolAugmented,
        }
    }
}

/// One chat message as sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub role: String,
    pub content: String,
}

impl InboundMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub thread_id: String,
    pub messages: Vec<InboundMessage>,
}

/// What a turn produced for the user.
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub message: String,
    pub thread_id: String,
    pub phase: SurveyPhase,
    pub complete: bool,
    /// How the message was extracted; `None` when no collaborator was called.
    pub source: Option<ExtractionSource>,
}

pub struct SurveyController {
    reasoning: Reasoning,
    tools: Arc<ToolRegistry>,
    sessions: Arc<SessionRegistry>,
    config: ControllerConfig,
}

impl SurveyController {
    pub fn new(
        reasoning: Reasoning,
        tools: Arc<ToolRegistry>,
        sessions: Arc<SessionRegistry>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            reasoning,
            tools,
            sessions,
            config,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// Run one turn for `request.thread_id`.
    ///
    /// Concurrent turns on the same thread run one after the other.
    pub async fn turn(&self, request: TurnRequest) -> Result<TurnOutcome, SurveyError> {
        let thread_id = request.thread_id;
        let mut session = self.sessions.acquire(&thread_id).await?;
        session.begin_turn();

        if session.is_done() {
            debug!(thread_id = %thread_id, "Turn on a finished survey, replaying summary");
            let message = render_final_summary(session.schema(), session.responses());
            self.checkpoint(&session).await;
            return Ok(TurnOutcome {
                message,
                thread_id,
                phase: session.phase(),
                complete: true,
                source: None,
            });
        }

        let history = to_chat_history(request.messages);
        let result = self.converse(&mut session, history).await;
        self.checkpoint(&session).await;

        let reply = match result {
            Ok(reply) => reply,
            Err(e) => {
                warn!(thread_id = %thread_id, error = %e, "Survey turn failed");
                return Err(e);
            }
        };

        let extraction = extract_question(&reply);
        let outcome = TurnOutcome {
            message: extraction.text,
            thread_id,
            phase: session.phase(),
            complete: session.is_done(),
            source: Some(extraction.source),
        };

        info!(
            thread_id = %outcome.thread_id,
            phase = %outcome.phase,
            turn = session.turn_count(),
            "Survey turn complete"
        );

        if outcome.complete {
            drop(session);
            self.sessions.evict(&outcome.thread_id).await;
        }
        Ok(outcome)
    }

    /// Call the collaborator until it answers with text.
    async fn converse(
        &self,
        session: &mut SurveySession,
        history: Vec<ChatMessage>,
    ) -> Result<String, SurveyError> {
        let tools = self.tools.tool_definitions().await;
        let mut ctx = ReasoningContext::new()
            .with_messages(history)
            .with_tools(tools);

        for round in 0..self.config.max_tool_rounds {
            let next = session.next_field();
            ctx.system_prompt = Some(compose_for_turn(
                session.schema(),
                session.responses(),
                next.as_ref(),
                self.config.prompt_mode,
            ));

            let output = self.call_collaborator(&ctx).await?;
            match output.result {
                RespondResult::Text(text) => {
                    if text.trim().is_empty() {
                        return Err(SurveyError::MissingCollaboratorReply {
                            reason: "collaborator returned an empty reply".to_string(),
                        });
                    }
                    return Ok(text);
                }
                RespondResult::ToolCalls {
                    tool_calls,
                    content,
                } => {
                    debug!(
                        thread_id = %session.thread_id(),
                        round,
                        calls = tool_calls.len(),
                        "Collaborator requested tool calls"
                    );
                    ctx.messages
                        .push(ChatMessage::assistant_with_tool_calls(content, tool_calls.clone()));

                    let mut turn_ctx = TurnContext::new(&mut *session);
                    for call in tool_calls {
                        let result = self.run_tool(&call, &mut turn_ctx).await;
                        ctx.messages
                            .push(ChatMessage::tool_result(&call.id, &call.name, result));
                    }
                }
            }
        }

        Err(SurveyError::MissingCollaboratorReply {
            reason: format!(
                "no text reply after {} tool rounds",
                self.config.max_tool_rounds
            ),
        })
    }

    async fn call_collaborator(&self, ctx: &ReasoningContext) -> Result<RespondOutput, LlmError> {
        let call = self.reasoning.respond_with_tools(ctx);
        match self.config.call_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| LlmError::Timeout {
                    provider: self.reasoning.model_name().to_string(),
                    timeout: limit,
                })?,
            None => call.await,
        }
    }

    /// Execute one tool call and render its result for the collaborator.
    async fn run_tool(&self, call: &ToolCall, ctx: &mut TurnContext<'_>) -> String {
        let params = normalize_arguments(&call.arguments);
        let key = params.get("key").cloned().unwrap_or(serde_json::Value::Null);

        match self.tools.execute(&call.name, params, ctx).await {
            Ok(output) => output.to_content(),
            Err(e) => {
                warn!(
                    thread_id = %ctx.thread_id(),
                    tool = %call.name,
                    field = %key,
                    error = %e,
                    "Tool call rejected"
                );
                serde_json::json!({
                    "success": false,
                    "key": key,
                    "error": e.to_string(),
                })
                .to_string()
            }
        }
    }

    async fn checkpoint(&self, session: &SurveySession) {
        if let Err(e) = self.sessions.persist(session).await {
            warn!(thread_id = %session.thread_id(), error = %e, "Failed to checkpoint session");
        }
    }
}

/// Some providers deliver arguments as a JSON-encoded string.
fn normalize_arguments(arguments: &serde_json::Value) -> serde_json::Value {
    match arguments {
        serde_json::Value::String(raw) => {
            serde_json::from_str(raw).unwrap_or_else(|_| arguments.clone())
        }
        other => other.clone(),
    }
}

/// Convert client messages, substituting the start message for an empty list.
///
/// Client-supplied system messages are dropped; the directive is ours.
fn to_chat_history(messages: Vec<InboundMessage>) -> Vec<ChatMessage> {
    let history: Vec<ChatMessage> = messages
        .into_iter()
        .filter_map(|m| match m.role.as_str() {
            "user" => Some(ChatMessage::user(m.content)),
            "assistant" => Some(ChatMessage::assistant(m.content)),
            other => {
                debug!(role = other, "Dropping client message with unsupported role");
                None
            }
        })
        .collect();

    if history.is_empty() {
        vec![ChatMessage::user(DEFAULT_START_MESSAGE)]
    } else {
        history
    }
}
