// Shared outbound HTTP client
//
// One connection-pooled reqwest client is built at startup and cloned into every
// provider client (clones share the same pool).

use anyhow::{Context, Result};
use std::time::Duration;

use crate::core::config::LimitsConfig;

/// Build the process-wide HTTP client with pooling and timeouts
pub fn build_http_client(limits: &LimitsConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(limits.api_timeout)
        .pool_max_idle_per_host(limits.http_max_idle_per_host)
        .pool_idle_timeout(limits.http_pool_idle_timeout)
        .connect_timeout(Duration::from_secs(10))
        .build()
        .context("Failed to create HTTP client")
}

/// First characters of a response body, for error messages
pub fn snippet(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_with_defaults() {
        let limits = LimitsConfig {
            max_concurrent_requests: 10,
            api_timeout: Duration::from_secs(60),
            optimize_timeout: Duration::from_secs(30),
            error_translation_timeout: Duration::from_secs(5),
            http_max_idle_per_host: 20,
            http_pool_idle_timeout: Duration::from_secs(90),
            reference_analysis_enabled: true,
        };
        assert!(build_http_client(&limits).is_ok());
    }

    #[test]
    fn test_snippet_respects_char_boundaries() {
        assert_eq!(snippet("生成失败了", 2), "生成");
        assert_eq!(snippet("short", 200), "short");
    }
}
