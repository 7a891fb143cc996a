//! Retry decorator for transient provider failures.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use crate::error::LlmError;
use crate::llm::provider::{
    CompletionRequest, CompletionResponse, LlmProvider, ToolCompletionRequest,
    ToolCompletionResponse,
};

/// Retries an inner provider up to `max_retries` times with exponential backoff.
///
/// Only errors reported as transient are retried; auth and malformed-response
/// failures are returned immediately.
pub struct RetryProvider {
    inner: Arc<dyn LlmProvider>,
    max_retries: u32,
    base_delay: Duration,
}

impl RetryProvider {
    pub fn new(inner: Arc<dyn LlmProvider>, max_retries: u32) -> Self {
        Self {
            inner,
            max_retries,
            base_delay: Duration::from_secs(1),
        }
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    fn delay_for(&self, attempt: u32, err: &LlmError) -> Duration {
        if let LlmError::RateLimited {
            retry_after: Some(after),
            ..
        } = err
        {
            return *after;
        }
        // 1x, 2x, 4x, ... capped at 32x.
        self.base_delay * (1u32 << attempt.min(5))
    }

    async fn run<T, F, Fut>(&self, op: &str, mut call: F) -> Result<T, LlmError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, LlmError>>,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_retries => {
                    let delay = self.delay_for(attempt, &err);
                    tracing::warn!(
                        model = self.inner.model_name(),
                        op,
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        ?delay,
                        error = %err,
                        "LLM call failed, retrying"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[async_trait]
impl LlmProvider for RetryProvider {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.run("complete", || self.inner.complete(request.clone()))
            .await
    }

    async fn complete_with_tools(
        &self,
        request: ToolCompletionRequest,
    ) -> Result<ToolCompletionResponse, LlmError> {
        self.run("complete_with_tools", || {
            self.inner.complete_with_tools(request.clone())
        })
        .await
    }
}
