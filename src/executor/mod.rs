//! C7 Executor Pool: a uniform async interface over provider-specific
//! backends, shaped after the reference platform's repository trait
//! pattern (`storage::repository`) — one `#[async_trait]` contract, swap
//! implementations behind it.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::{CoreError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub text: String,
    pub usage: Option<TokenUsage>,
    pub latency_ms: u64,
}

#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub model_id: String,
    pub prompt: String,
    pub timeout: Duration,
}

/// One provider-specific execution adapter. Implementations sit at the
/// suspension point named in §5 (executor call = network I/O); a timeout
/// here is surfaced to the caller as an `ExecutionError`, never panics.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult>;
}

/// Dispatches to one adapter per provider, keyed by the model's declared
/// `provider` field. The pool itself holds no routing logic — that's the
/// router's job; this is purely "given a model id and a prompt, run it".
pub struct ExecutorPool {
    adapters: HashMap<String, Box<dyn Executor>>,
}

impl ExecutorPool {
    pub fn new() -> Self {
        Self { adapters: HashMap::new() }
    }

    pub fn register(&mut self, provider: impl Into<String>, adapter: Box<dyn Executor>) {
        self.adapters.insert(provider.into(), adapter);
    }

    pub async fn execute(&self, provider: &str, request: &ExecutionRequest) -> Result<ExecutionResult> {
        let adapter = self
            .adapters
            .get(provider)
            .ok_or_else(|| CoreError::not_found(format!("no executor registered for provider '{provider}'")))?;

        match tokio::time::timeout(request.timeout, adapter.execute(request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(model_id = %request.model_id, provider, "executor call timed out");
                Err(CoreError::execution(format!("provider call to {} timed out", request.model_id)))
            }
        }
    }
}

impl Default for ExecutorPool {
    fn default() -> Self {
        Self::new()
    }
}

/// A deterministic double: returns a canned response and never calls out
/// over the network. Used by the task runner's own tests and by `testMode`
/// request handling (§6).
pub struct MockExecutor {
    pub response_text: String,
    pub usage: Option<TokenUsage>,
}

impl MockExecutor {
    pub fn new(response_text: impl Into<String>) -> Self {
        Self { response_text: response_text.into(), usage: None }
    }

    pub fn with_usage(mut self, input_tokens: u64, output_tokens: u64) -> Self {
        self.usage = Some(TokenUsage { input_tokens, output_tokens });
        self
    }
}

#[async_trait]
impl Executor for MockExecutor {
    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult> {
        info!(model_id = %request.model_id, "mock executor invoked");
        Ok(ExecutionResult { text: self.response_text.clone(), usage: self.usage.clone(), latency_ms: 1 })
    }
}

/// `reqwest`-backed HTTP adapter for an OpenAI-compatible chat completions
/// endpoint. Shape intentionally thin: the task runner owns prompt
/// construction, this adapter owns only the wire call.
pub struct HttpChatExecutor {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpChatExecutor {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into(), api_key: api_key.into() }
    }
}

#[async_trait]
impl Executor for HttpChatExecutor {
    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult> {
        let start = std::time::Instant::now();
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "model": request.model_id,
                "messages": [{"role": "user", "content": request.prompt}],
            }))
            .send()
            .await
            .map_err(|err| CoreError::execution(format!("provider request failed: {err}")))?;

        if !response.status().is_success() {
            return Err(CoreError::execution(format!("provider returned status {}", response.status())));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|err| CoreError::execution(format!("provider response was not valid JSON: {err}")))?;

        let text = body["choices"][0]["message"]["content"].as_str().unwrap_or_default().to_string();
        let usage = body.get("usage").map(|usage| TokenUsage {
            input_tokens: usage["prompt_tokens"].as_u64().unwrap_or(0),
            output_tokens: usage["completion_tokens"].as_u64().unwrap_or(0),
        });

        Ok(ExecutionResult { text, usage, latency_ms: start.elapsed().as_millis() as u64 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(model_id: &str) -> ExecutionRequest {
        ExecutionRequest { model_id: model_id.into(), prompt: "hello".into(), timeout: Duration::from_secs(5) }
    }

    #[tokio::test]
    async fn mock_executor_returns_canned_response() {
        let executor = MockExecutor::new("done");
        let result = executor.execute(&request("m1")).await.unwrap();
        assert_eq!(result.text, "done");
    }

    #[tokio::test]
    async fn pool_dispatches_by_registered_provider() {
        let mut pool = ExecutorPool::new();
        pool.register("mock-provider", Box::new(MockExecutor::new("ok")));
        let result = pool.execute("mock-provider", &request("m1")).await.unwrap();
        assert_eq!(result.text, "ok");
    }

    #[tokio::test]
    async fn missing_provider_returns_not_found() {
        let pool = ExecutorPool::new();
        let err = pool.execute("ghost", &request("m1")).await.unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    struct SlowExecutor;

    #[async_trait]
    impl Executor for SlowExecutor {
        async fn execute(&self, _request: &ExecutionRequest) -> Result<ExecutionResult> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(ExecutionResult { text: "late".into(), usage: None, latency_ms: 50 })
        }
    }

    #[tokio::test]
    async fn timeout_is_surfaced_as_execution_error() {
        let mut pool = ExecutorPool::new();
        pool.register("slow", Box::new(SlowExecutor));
        let mut req = request("m1");
        req.timeout = Duration::from_millis(1);
        let err = pool.execute("slow", &req).await.unwrap_err();
        assert_eq!(err.code(), "execution_error");
    }
}
