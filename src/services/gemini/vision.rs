use std::sync::Arc;
use tracing::{debug, instrument};

use super::transport::GeminiTransport;
use super::wire::{Content, GenerateContentRequest, Part};
use crate::core::errors::{GatewayError, GatewayResult};
use crate::core::types::{ImageDescription, InlineImage};
use crate::middleware::ApiKeyPool;
use crate::utils::image_ops::encode_base64;

/// Single-image description client for the vision model
pub struct VisionClient {
    transport: GeminiTransport,
    api_key_pool: Arc<ApiKeyPool>,
    model: String,
}

impl VisionClient {
    pub fn new(transport: GeminiTransport, api_key_pool: Arc<ApiKeyPool>, model: String) -> Self {
        Self {
            transport,
            api_key_pool,
            model,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Describe one image: a text part with `prompt` followed by the image inline.
    ///
    /// Returns the first text part of the first candidate and the key used.
    #[instrument(skip(self, image_bytes, prompt), fields(model = %self.model, bytes = image_bytes.len()))]
    pub async fn analyze(
        &self,
        image_bytes: &[u8],
        mime_type: &str,
        prompt: &str,
    ) -> GatewayResult<ImageDescription> {
        let api_key = self
            .api_key_pool
            .next_key()
            .ok_or(GatewayError::Configuration("GOOGLE_API_KEY"))?;

        let image = InlineImage::new(encode_base64(image_bytes), Some(mime_type));
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: None,
                parts: vec![Part::text(prompt), Part::inline(&image)],
            }],
            generation_config: None,
        };

        let reply = self
            .transport
            .generate_content(&self.model, &api_key, &request)
            .await?;

        let text = reply
            .response
            .first_text()
            .ok_or_else(|| GatewayError::ResponseShape(reply.excerpt.clone()))?
            .to_string();

        debug!("Vision description: {} chars", text.chars().count());
        Ok(ImageDescription {
            text,
            key_used: api_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client(server: &mockito::ServerGuard, keys: &[&str]) -> VisionClient {
        let pool = Arc::new(ApiKeyPool::new(keys.iter().map(|k| k.to_string()).collect()));
        VisionClient::new(
            GeminiTransport::new(reqwest::Client::new(), &server.url(), None),
            pool,
            "vision-model".to_string(),
        )
    }

    #[tokio::test]
    async fn test_returns_first_text_part() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1beta/models/vision-model:generateContent")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex("describe it".to_string()),
                Matcher::Regex("aW1hZ2Utb25l".to_string()),
                Matcher::Regex("image/png".to_string()),
            ]))
            .with_status(200)
            .with_body(r#"{"candidates":[{"content":{"parts":[{"text":"X"}]}}]}"#)
            .create_async()
            .await;

        let vision = client(&server, &["key-0001"]);
        let description = vision
            .analyze(b"image-one", "image/png", "describe it")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(description.text, "X");
        assert_eq!(description.key_used, "key-0001");
    }

    #[tokio::test]
    async fn test_unexpected_shape() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", Matcher::Any)
            .with_status(200)
            .with_body(r#"{"candidates":[{"content":{"parts":[]}}]}"#)
            .create_async()
            .await;

        let err = client(&server, &["k"])
            .analyze(b"img", "image/png", "p")
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::ResponseShape(_)));
    }

    #[tokio::test]
    async fn test_api_error_carries_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", Matcher::Any)
            .with_status(429)
            .with_body("quota exhausted")
            .create_async()
            .await;

        let err = client(&server, &["k"])
            .analyze(b"img", "image/png", "p")
            .await
            .unwrap_err();
        assert_eq!(err.upstream_status(), Some(429));
        assert!(err.to_string().contains("quota exhausted"));
    }

    #[tokio::test]
    async fn test_missing_keys_is_configuration_error() {
        let server = mockito::Server::new_async().await;
        let err = client(&server, &[])
            .analyze(b"img", "image/png", "p")
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Configuration("GOOGLE_API_KEY")));
    }
}
