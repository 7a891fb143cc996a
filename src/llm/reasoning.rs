//! Reasoning layer — wraps an LLM provider with tool calling support.

use std::sync::Arc;

use crate::error::LlmError;
use crate::llm::{
    ChatMessage, CompletionRequest, LlmProvider, ToolCall, ToolCompletionRequest, ToolDefinition,
};

/// Context for a reasoning operation.
#[derive(Debug, Clone, Default)]
pub struct ReasoningContext {
    /// Directive sent as the system message, rebuilt by the caller each round.
    pub system_prompt: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDefinition>,
}

impl ReasoningContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_messages(mut self, messages: Vec<ChatMessage>) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }
}

/// Token usage from an LLM call.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Result of a reasoning call — either text or tool calls.
#[derive(Debug, Clone)]
pub enum RespondResult {
    /// The model responded with text.
    Text(String),
    /// The model wants to call tools.
    ToolCalls {
        tool_calls: Vec<ToolCall>,
        /// Optional text content alongside tool calls.
        content: Option<String>,
    },
}

/// Output from a respond_with_tools call.
#[derive(Debug, Clone)]
pub struct RespondOutput {
    pub result: RespondResult,
    pub usage: TokenUsage,
}

/// Reasoning layer that wraps an LLM provider.
pub struct Reasoning {
    llm: Arc<dyn LlmProvider>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl Reasoning {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            llm,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn model_name(&self) -> &str {
        self.llm.model_name()
    }

    /// Call the LLM with tool definitions, returning either text or tool calls.
    pub async fn respond_with_tools(
        &self,
        context: &ReasoningContext,
    ) -> Result<RespondOutput, LlmError> {
        let mut messages = Vec::with_capacity(context.messages.len() + 1);
        if let Some(ref prompt) = context.system_prompt {
            messages.push(ChatMessage::system(prompt));
        }
        messages.extend(context.messages.iter().cloned());

        // No tools: plain completion.
        if context.tools.is_empty() {
            let mut request = CompletionRequest::new(messages);
            request.temperature = self.temperature;
            request.max_tokens = self.max_tokens;

            let response = self.llm.complete(request).await?;
            return Ok(RespondOutput {
                result: RespondResult::Text(response.content),
                usage: TokenUsage {
                    input_tokens: response.input_tokens,
                    output_tokens: response.output_tokens,
                },
            });
        }

        let mut request = ToolCompletionRequest::new(messages, context.tools.clone());
        request.temperature = self.temperature;
        request.max_tokens = self.max_tokens;

        let response = self.llm.complete_with_tools(request).await?;
        let usage = TokenUsage {
            input_tokens: response.input_tokens,
            output_tokens: response.output_tokens,
        };

        if response.tool_calls.is_empty() {
            Ok(RespondOutput {
                result: RespondResult::Text(response.content.unwrap_or_default()),
                usage,
            })
        } else {
            Ok(RespondOutput {
                result: RespondResult::ToolCalls {
                    tool_calls: response.tool_calls,
                    content: response.content,
                },
                usage,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::llm::{CompletionResponse, FinishReason, Role, ToolCompletionResponse};

    /// Records the last tool request and answers with a fixed response.
    struct RecordingLlm {
        tool_calls: Vec<ToolCall>,
        seen: Mutex<Option<ToolCompletionRequest>>,
    }

    #[async_trait]
    impl LlmProvider for RecordingLlm {
        fn model_name(&self) -> &str {
            "recording"
        }

        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            Ok(CompletionResponse {
                content: format!("{} messages", request.messages.len()),
                input_tokens: 3,
                output_tokens: 4,
                finish_reason: FinishReason::Stop,
                response_id: None,
            })
        }

        async fn complete_with_tools(
            &self,
            request: ToolCompletionRequest,
        ) -> Result<ToolCompletionResponse, LlmError> {
            *self.seen.lock().unwrap() = Some(request);
            Ok(ToolCompletionResponse {
                content: Some("<question>Hi</question>".into()),
                tool_calls: self.tool_calls.clone(),
                input_tokens: 1,
                output_tokens: 2,
                finish_reason: FinishReason::Stop,
                response_id: None,
            })
        }
    }

    fn tool() -> ToolDefinition {
        ToolDefinition {
            name: "readFieldState".into(),
            description: "read".into(),
            parameters: serde_json::json!({"type": "object"}),
        }
    }

    #[tokio::test]
    async fn system_prompt_and_limits_are_forwarded() {
        let llm = Arc::new(RecordingLlm {
            tool_calls: vec![],
            seen: Mutex::new(None),
        });
        let reasoning = Reasoning::new(llm.clone())
            .with_temperature(0.0)
            .with_max_tokens(300);
        let ctx = ReasoningContext::new()
            .with_system_prompt("directive")
            .with_messages(vec![ChatMessage::user("hello")])
            .with_tools(vec![tool()]);

        let output = reasoning.respond_with_tools(&ctx).await.unwrap();
        assert!(matches!(output.result, RespondResult::Text(ref t) if t.contains("Hi")));
        assert_eq!(output.usage.total(), 3);

        let seen = llm.seen.lock().unwrap().clone().unwrap();
        assert_eq!(seen.messages[0].role, Role::System);
        assert_eq!(seen.messages[0].content, "directive");
        assert_eq!(seen.max_tokens, Some(300));
        assert_eq!(seen.temperature, Some(0.0));
    }

    #[tokio::test]
    async fn tool_calls_are_surfaced() {
        let call = ToolCall {
            id: "c1".into(),
            name: "readFieldState".into(),
            arguments: serde_json::json!({"key": "business_name"}),
        };
        let llm = Arc::new(RecordingLlm {
            tool_calls: vec![call.clone()],
            seen: Mutex::new(None),
        });
        let reasoning = Reasoning::new(llm);
        let ctx = ReasoningContext::new()
            .with_messages(vec![ChatMessage::user("hello")])
            .with_tools(vec![tool()]);

        match reasoning.respond_with_tools(&ctx).await.unwrap().result {
            RespondResult::ToolCalls { tool_calls, content } => {
                assert_eq!(tool_calls, vec![call]);
                assert!(content.is_some());
            }
            other => panic!("expected tool calls, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn no_tools_uses_plain_completion() {
        let llm = Arc::new(RecordingLlm {
            tool_calls: vec![],
            seen: Mutex::new(None),
        });
        let reasoning = Reasoning::new(llm);
        let ctx = ReasoningContext::new()
            .with_system_prompt("directive")
            .with_messages(vec![ChatMessage::user("hello")]);

        let output = reasoning.respond_with_tools(&ctx).await.unwrap();
        assert!(matches!(output.result, RespondResult::Text(ref t) if t == "2 messages"));
        assert_eq!(output.usage.total(), 7);
    }
}
