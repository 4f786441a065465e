use std::time::Duration;
use tracing::{info, instrument};

use super::chat::ChatCompletionClient;
use crate::core::errors::GatewayResult;
use crate::core::prompts::ARCH_RENDER_SYSTEM_PROMPT;

/// Rewrites a user's idea into a narrative architectural-rendering prompt
pub struct PromptOptimizer {
    chat: ChatCompletionClient,
    timeout: Duration,
}

impl PromptOptimizer {
    pub fn new(chat: ChatCompletionClient, timeout: Duration) -> Self {
        Self { chat, timeout }
    }

    #[instrument(skip(self, text), fields(chars = text.chars().count()))]
    pub async fn optimize(&self, text: &str) -> GatewayResult<String> {
        let optimized = self
            .chat
            .complete(ARCH_RENDER_SYSTEM_PROMPT, text, self.timeout)
            .await?;
        info!("Prompt optimized ({} chars)", optimized.chars().count());
        Ok(optimized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::GatewayError;
    use crate::services::text::chat::tests::text_config;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_optimize_uses_render_system_prompt() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#""role":"system""#.to_string()),
                Matcher::Regex("glass pavilion in a forest".to_string()),
            ]))
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":"\n一座坐落于森林中的玻璃亭 \n"}}]}"#)
            .create_async()
            .await;

        let config = text_config(&server.url(), Some("k"));
        let optimizer = PromptOptimizer::new(
            ChatCompletionClient::new(&config, reqwest::Client::new(), None),
            config.limits.optimize_timeout,
        );
        let optimized = optimizer.optimize("glass pavilion in a forest").await.unwrap();

        mock.assert_async().await;
        assert_eq!(optimized, "一座坐落于森林中的玻璃亭");
    }

    #[tokio::test]
    async fn test_optimize_without_key_fails() {
        let server = mockito::Server::new_async().await;
        let config = text_config(&server.url(), None);
        let optimizer = PromptOptimizer::new(
            ChatCompletionClient::new(&config, reqwest::Client::new(), None),
            Duration::from_secs(30),
        );
        let err = optimizer.optimize("x").await.unwrap_err();
        assert!(matches!(err, GatewayError::Configuration(_)));
    }
}
