use std::time::Duration;
use tracing::{debug, warn};

use super::chat::ChatCompletionClient;
use crate::core::prompts::{
    ERROR_TRANSLATION_FALLBACK, ERROR_TRANSLATION_SYSTEM_PROMPT, ERROR_TRANSLATION_UNCONFIGURED,
};
use crate::utils::Metrics;

/// Turns raw failure text into a short user-facing message.
///
/// Never fails: timeouts, provider errors and empty answers all map to a
/// fixed fallback string.
pub struct ErrorTranslator {
    chat: ChatCompletionClient,
    timeout: Duration,
    metrics: Option<Metrics>,
}

impl ErrorTranslator {
    pub fn new(chat: ChatCompletionClient, timeout: Duration, metrics: Option<Metrics>) -> Self {
        Self {
            chat,
            timeout,
            metrics,
        }
    }

    pub async fn translate(&self, raw_error: &str) -> String {
        if !self.chat.has_credential() {
            self.record(true);
            return ERROR_TRANSLATION_UNCONFIGURED.to_string();
        }

        let user = format!("Error Message: {}", raw_error);
        let call = self
            .chat
            .complete(ERROR_TRANSLATION_SYSTEM_PROMPT, &user, self.timeout);

        // The outer bound also covers connect and body read
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(message)) if !message.is_empty() => {
                debug!("Translated error: {}", message);
                self.record(false);
                message
            }
            Ok(Ok(_)) => {
                warn!("Error translation returned empty content");
                self.fallback()
            }
            Ok(Err(e)) => {
                warn!("Error translation failed: {}", e);
                self.fallback()
            }
            Err(_) => {
                warn!("Error translation timed out after {:?}", self.timeout);
                self.fallback()
            }
        }
    }

    fn fallback(&self) -> String {
        self.record(true);
        ERROR_TRANSLATION_FALLBACK.to_string()
    }

    fn record(&self, used_fallback: bool) {
        if let Some(ref m) = self.metrics {
            m.record_error_translation(used_fallback);
        }
    }
}
