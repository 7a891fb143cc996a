//! Bridge from rig-core's `CompletionModel` to our `LlmProvider` trait.

use async_trait::async_trait;
use rig::OneOrMany;
use rig::completion::{CompletionModel, Message};
use rig::message::{AssistantContent, ToolResultContent, UserContent};

use crate::error::LlmError;
use crate::llm::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmProvider, Role, ToolCall,
    ToolCompletionRequest, ToolCompletionResponse, ToolDefinition,
};

/// Wraps any rig completion model.
pub struct RigAdapter<M: CompletionModel> {
    model: M,
    model_name: String,
    provider: &'static str,
}

impl<M: CompletionModel> RigAdapter<M> {
    pub fn new(model: M, model_name: &str, provider: &'static str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
            provider,
        }
    }
}

/// Reply content pulled out of a rig response.
struct Reply {
    text: Option<String>,
    tool_calls: Vec<ToolCall>,
}

impl<M> RigAdapter<M>
where
    M: CompletionModel + Send + Sync + 'static,
    M::Response: Send + Sync,
{
    async fn call(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        temperature: Option<f32>,
        max_tokens: Option<u32>,
    ) -> Result<Reply, LlmError> {
        let (preamble, mut history) = to_rig_messages(messages, self.provider)?;
        let prompt = history.pop().ok_or_else(|| LlmError::InvalidResponse {
            provider: self.provider.to_string(),
            reason: "request has no conversation messages".to_string(),
        })?;

        let mut builder = self
            .model
            .completion_request(prompt)
            .messages(history)
            .tools(tools.iter().map(to_rig_tool).collect());
        if let Some(preamble) = preamble {
            builder = builder.preamble(preamble);
        }
        if let Some(temperature) = temperature {
            builder = builder.temperature(f64::from(temperature));
        }
        if let Some(max_tokens) = max_tokens {
            builder = builder.max_tokens(u64::from(max_tokens));
        }

        let response = self
            .model
            .completion(builder.build())
            .await
            .map_err(|e| classify_error(self.provider, &e.to_string()))?;

        let mut text: Option<String> = None;
        let mut tool_calls = Vec::new();
        for content in response.choice.iter() {
            match content {
                AssistantContent::Text(t) => match text {
                    Some(ref mut existing) => existing.push_str(&t.text),
                    None => text = Some(t.text.clone()),
                },
                AssistantContent::ToolCall(tc) => tool_calls.push(ToolCall {
                    id: tc.id.clone(),
                    name: tc.function.name.clone(),
                    arguments: tc.function.arguments.clone(),
                }),
                _ => {}
            }
        }

        Ok(Reply { text, tool_calls })
    }
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + Send + Sync + 'static,
    M::Response: Send + Sync,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let reply = self
            .call(&request.messages, &[], request.temperature, request.max_tokens)
            .await?;

        Ok(CompletionResponse {
            content: reply.text.unwrap_or_default(),
            // rig does not surface usage uniformly across providers.
            input_tokens: 0,
            output_tokens: 0,
            finish_reason: FinishReason::Stop,
            response_id: None,
        })
    }

    async fn complete_with_tools(
        &self,
        request: ToolCompletionRequest,
    ) -> Result<ToolCompletionResponse, LlmError> {
        let reply = self
            .call(
                &request.messages,
                &request.tools,
                request.temperature,
                request.max_tokens,
            )
            .await?;

        let finish_reason = if reply.tool_calls.is_empty() {
            FinishReason::Stop
        } else {
            FinishReason::ToolUse
        };

        Ok(ToolCompletionResponse {
            content: reply.text,
            tool_calls: reply.tool_calls,
            input_tokens: 0,
            output_tokens: 0,
            finish_reason,
            response_id: None,
        })
    }
}

/// Split system messages into a preamble and convert the rest to rig messages.
fn to_rig_messages(
    messages: &[ChatMessage],
    provider: &str,
) -> Result<(Option<String>, Vec<Message>), LlmError> {
    let mut system = Vec::new();
    let mut converted = Vec::with_capacity(messages.len());

    for msg in messages {
        match msg.role {
            Role::System => system.push(msg.content.as_str()),
            Role::User => converted.push(Message::user(msg.content.as_str())),
            Role::Assistant if msg.tool_calls.is_empty() => {
                converted.push(Message::assistant(msg.content.as_str()));
            }
            Role::Assistant => {
                let mut items = Vec::with_capacity(msg.tool_calls.len() + 1);
                if !msg.content.is_empty() {
                    items.push(AssistantContent::text(msg.content.as_str()));
                }
                items.extend(msg.tool_calls.iter().map(|tc| {
                    AssistantContent::tool_call(tc.id.as_str(), tc.name.as_str(), tc.arguments.clone())
                }));
                let content = OneOrMany::many(items).map_err(|e| LlmError::InvalidResponse {
                    provider: provider.to_string(),
                    reason: format!("empty assistant message: {e}"),
                })?;
                converted.push(Message::Assistant { id: None, content });
            }
            Role::Tool => {
                let call_id = msg.tool_call_id.clone().unwrap_or_default();
                converted.push(Message::User {
                    content: OneOrMany::one(UserContent::tool_result(
                        call_id,
                        OneOrMany::one(ToolResultContent::text(msg.content.as_str())),
                    )),
                });
            }
        }
    }

    let preamble = (!system.is_empty()).then(|| system.join("\n\n"));
    Ok((preamble, converted))
}

fn to_rig_tool(tool: &ToolDefinition) -> rig::completion::ToolDefinition {
    rig::completion::ToolDefinition {
        name: tool.name.clone(),
        description: tool.description.clone(),
        parameters: tool.parameters.clone(),
    }
}

/// Map a rig error message onto our taxonomy so retries can tell transient
/// failures apart.
fn classify_error(provider: &str, message: &str) -> LlmError {
    let lower = message.to_lowercase();
    let provider = provider.to_string();

    if lower.contains("401") || lower.contains("unauthorized") || lower.contains("invalid api key")
    {
        LlmError::AuthFailed { provider }
    } else if lower.contains("429") || lower.contains("rate limit") {
        LlmError::RateLimited {
            provider,
            retry_after: None,
        }
    } else if lower.contains("json") || lower.contains("deserializ") {
        LlmError::InvalidResponse {
            provider,
            reason: message.to_string(),
        }
    } else {
        LlmError::RequestFailed {
            provider,
            reason: message.to_string(),
        }
    }
}
