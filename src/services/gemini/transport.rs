use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};

use super::wire::GenerateContentResponse;
use crate::core::errors::{GatewayError, GatewayResult};
use crate::services::http_client::snippet;
use crate::utils::Metrics;

const PROVIDER: &str = "Gemini";

/// Raw HTTP access to the Gemini REST API.
///
/// Owns nothing but a clone of the shared pooled client and the base URL;
/// key selection and response interpretation belong to the callers.
#[derive(Clone)]
pub struct GeminiTransport {
    http_client: reqwest::Client,
    base_url: String,
    metrics: Option<Metrics>,
}

/// A parsed generateContent reply plus a short excerpt of the raw body
#[derive(Debug, Clone)]
pub struct GeminiReply {
    pub response: GenerateContentResponse,
    pub excerpt: String,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    models: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    name: String,
}

impl GeminiTransport {
    pub fn new(http_client: reqwest::Client, base_url: &str, metrics: Option<Metrics>) -> Self {
        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            metrics,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST `{base}/v1beta/models/{model}:generateContent`
    pub async fn generate_content<B: Serialize>(
        &self,
        model: &str,
        api_key: &str,
        body: &B,
    ) -> GatewayResult<GeminiReply> {
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, model);
        debug!("POST {}", url);

        let start = Instant::now();
        let result = self.send(&url, api_key, body).await;

        match result {
            Ok(text) => {
                let response: GenerateContentResponse = match serde_json::from_str(&text) {
                    Ok(response) => response,
                    Err(e) => {
                        self.record(false, start, (0, 0));
                        return Err(GatewayError::ResponseShape(format!(
                            "{} ({})",
                            e,
                            snippet(&text, 200)
                        )));
                    }
                };
                self.record(true, start, response.token_usage());
                Ok(GeminiReply {
                    response,
                    excerpt: snippet(&text, 200),
                })
            }
            Err(e) => {
                self.record(false, start, (0, 0));
                Err(e)
            }
        }
    }

    async fn send<B: Serialize>(&self, url: &str, api_key: &str, body: &B) -> GatewayResult<String> {
        let response = self
            .http_client
            .post(url)
            .header("x-goog-api-key", api_key)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            warn!("Gemini returned {}: {}", status, snippet(&text, 200));
            return Err(GatewayError::UpstreamApi {
                provider: PROVIDER,
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(text)
    }

    /// GET `{base}/v1beta/models`, returning model names
    pub async fn list_models(&self, api_key: &str) -> GatewayResult<Vec<String>> {
        let url = format!("{}/v1beta/models", self.base_url);
        let response = self
            .http_client
            .get(&url)
            .header("x-goog-api-key", api_key)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(GatewayError::UpstreamApi {
                provider: PROVIDER,
                status: status.as_u16(),
                body: text,
            });
        }

        let list: ModelList = serde_json::from_str(&text)
            .map_err(|e| GatewayError::ResponseShape(format!("{} ({})", e, snippet(&text, 200))))?;
        Ok(list.models.into_iter().map(|m| m.name).collect())
    }

    fn record(&self, success: bool, start: Instant, tokens: (u64, u64)) {
        if let Some(ref m) = self.metrics {
            m.record_provider_call(success, start.elapsed(), tokens.0, tokens.1);
        }
    }
}
