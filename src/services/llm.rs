use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::errors::{WorkerError, WorkerResult};

/// Anything that can turn a system + user prompt into completion text.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> WorkerResult<String>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// Chat-completions client for OpenAI-compatible endpoints.
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
    retry_policy: ExponentialBuilder,
}

impl OpenAiClient {
    pub fn new(config: &LlmConfig) -> WorkerResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        let retry_policy = ExponentialBuilder::default()
            .with_min_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(8))
            .with_max_times(config.max_retries)
            .with_jitter();

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            retry_policy,
        })
    }

    async fn post_once(&self, body: &ChatRequest<'_>) -> Result<reqwest::Response, reqwest::Error> {
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;
        // 5xx is retried, 4xx is returned to the caller as-is
        if resp.status().is_server_error() {
            warn!("Completion endpoint returned {} (will retry)", resp.status());
            return resp.error_for_status();
        }
        Ok(resp)
    }
}

#[async_trait]
impl CompletionProvider for OpenAiClient {
    async fn complete(&self, system: &str, user: &str) -> WorkerResult<String> {
        debug!("Requesting completion from model {}", self.model);

        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
        };

        let resp = (|| self.post_once(&body))
            .retry(self.retry_policy.clone())
            .when(|e: &reqwest::Error| {
                e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
            })
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(WorkerError::Completion(format!(
                "endpoint returned {}: {}",
                status, detail
            )));
        }

        let parsed: ChatResponse = resp.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| WorkerError::Completion("response contained no choices".into()))?;

        debug!("Completion received ({} bytes)", content.len());
        Ok(content.trim().to_string())
    }
}
