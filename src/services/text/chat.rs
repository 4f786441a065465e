// OpenAI-compatible chat completion client for the text provider

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::core::config::Config;
use crate::core::errors::{GatewayError, GatewayResult};
use crate::services::http_client::snippet;
use crate::utils::Metrics;

const PROVIDER: &str = "Qwen";

/// Text provider client (`{base}/chat/completions`, bearer auth)
#[derive(Clone)]
pub struct ChatCompletionClient {
    api_key: Option<String>,
    http_client: reqwest::Client,
    base_url: String,
    model: String,
    metrics: Option<Metrics>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

impl ChatCompletionClient {
    pub fn new(config: &Config, http_client: reqwest::Client, metrics: Option<Metrics>) -> Self {
        Self {
            api_key: config.text.api_key.clone(),
            http_client,
            base_url: config.text_base_url().to_string(),
            model: config.text.model.clone(),
            metrics,
        }
    }

    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    /// The configured credential, for request-log key suffixes
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// One system + user exchange; returns the trimmed first choice
    pub async fn complete(&self, system: &str, user: &str, timeout: Duration) -> GatewayResult<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(GatewayError::Configuration("QWEN_API_KEY"))?;

        let request = ChatCompletionRequest {
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

        let url = format!("{}/chat/completions", self.base_url);
        debug!("POST {} (model {})", url, self.model);

        let start = Instant::now();
        let result = self.send(&url, api_key, &request, timeout).await;
        match &result {
            Ok((_, usage)) => self.record(true, start, *usage),
            Err(_) => self.record(false, start, (0, 0)),
        }
        result.map(|(content, _)| content)
    }

    async fn send(
        &self,
        url: &str,
        api_key: &str,
        request: &ChatCompletionRequest<'_>,
        timeout: Duration,
    ) -> GatewayResult<(String, (u64, u64))> {
        let response = self
            .http_client
            .post(url)
            .bearer_auth(api_key)
            .header("Content-Type", "application/json")
            .timeout(timeout)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            warn!("{} returned {}: {}", PROVIDER, status, snippet(&text, 200));
            return Err(GatewayError::UpstreamApi {
                provider: PROVIDER,
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&text)
            .map_err(|e| GatewayError::ResponseShape(format!("{} ({})", e, snippet(&text, 200))))?;

        let usage = parsed
            .usage
            .as_ref()
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or((0, 0));

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| GatewayError::ResponseShape(snippet(&text, 200)))?;

        Ok((content.trim().to_string(), usage))
    }

    fn record(&self, success: bool, start: Instant, tokens: (u64, u64)) {
        if let Some(ref m) = self.metrics {
            m.record_provider_call(success, start.elapsed(), tokens.0, tokens.1);
        }
    }
}
