// Gateway: runs every heavy operation under the concurrency limiter, logs
// successes and turns failures into translated user messages.

use anyhow::{Context, Result};
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info, instrument};

use crate::core::config::Config;
use crate::core::errors::{GatewayError, GatewayResult, HeavyFailure};
use crate::core::types::{
    AnalysisType, GeneratedImage, GenerationRequest, InlineImage, RequestLogEvent, RequestType,
};
use crate::middleware::{ApiKeyPool, ConcurrencyLimiter};
use crate::services::gemini::{GeminiTransport, ImageGenerationClient, VisionClient};
use crate::services::http_client::build_http_client;
use crate::services::request_log::RequestLogger;
use crate::services::text::{ChatCompletionClient, ErrorTranslator, PromptOptimizer};
use crate::utils::Metrics;

pub struct Gateway {
    api_key_pool: Arc<ApiKeyPool>,
    limiter: ConcurrencyLimiter,
    generator: ImageGenerationClient,
    vision: Arc<VisionClient>,
    chat: ChatCompletionClient,
    optimizer: PromptOptimizer,
    translator: ErrorTranslator,
    logger: RequestLogger,
}

impl Gateway {
    /// Wire every client from configuration
    #[instrument(skip(config, metrics))]
    pub fn from_config(config: &Config, metrics: Metrics) -> Result<Self> {
        info!("Initializing gateway...");

        // One pooled client shared by every provider
        let http_client = build_http_client(&config.limits)?;

        let api_key_pool = Arc::new(ApiKeyPool::new(config.api_keys().to_vec()));
        let transport = GeminiTransport::new(
            http_client.clone(),
            config.gemini_base_url(),
            Some(metrics.clone()),
        );

        let vision = Arc::new(VisionClient::new(
            transport.clone(),
            Arc::clone(&api_key_pool),
            config.gemini.vision_model.clone(),
        ));

        let mut generator = ImageGenerationClient::new(
            config,
            transport,
            Arc::clone(&api_key_pool),
            Some(metrics.clone()),
        );
        if config.limits.reference_analysis_enabled {
            generator = generator.with_reference_analysis(Arc::clone(&vision));
        }

        let chat = ChatCompletionClient::new(config, http_client, Some(metrics.clone()));
        let optimizer = PromptOptimizer::new(chat.clone(), config.limits.optimize_timeout);
        let translator = ErrorTranslator::new(
            chat.clone(),
            config.limits.error_translation_timeout,
            Some(metrics.clone()),
        );

        let logger = RequestLogger::open(
            &config.storage.db_path,
            &config.storage.images_dir,
            Some(metrics.clone()),
        )
        .context("Failed to open request log")?;

        let limiter = ConcurrencyLimiter::new(config.max_concurrent_requests(), Some(metrics));

        info!(
            "✓ Ready (keys: {}, image model: {}, fallback: {}, max concurrent: {})",
            api_key_pool.total_keys(),
            generator.primary_model(),
            generator.fallback_model().unwrap_or("none"),
            limiter.capacity()
        );

        Ok(Self {
            api_key_pool,
            limiter,
            generator,
            vision,
            chat,
            optimizer,
            translator,
            logger,
        })
    }

    pub fn api_key_pool(&self) -> &ApiKeyPool {
        &self.api_key_pool
    }

    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    pub fn logger(&self) -> &RequestLogger {
        &self.logger
    }

    /// Rewrite a user prompt through the text provider
    #[instrument(skip(self, text))]
    pub async fn optimize(&self, text: &str, client_ip: &str) -> Result<String, HeavyFailure> {
        self.heavy("optimize", async {
            let optimized = self.optimizer.optimize(text).await?;
            self.logger
                .log(RequestLogEvent {
                    client_ip: client_ip.to_string(),
                    prompt: text.to_string(),
                    model: self.chat.model().to_string(),
                    api_key: self.chat.api_key().unwrap_or_default().to_string(),
                    image: None,
                    request_type: RequestType::Optimization,
                })
                .await;
            Ok(optimized)
        })
        .await
    }

    /// Generate one image, with reference pre-analysis and model fallback
    #[instrument(skip(self, request))]
    pub async fn generate(
        &self,
        request: GenerationRequest,
        client_ip: &str,
    ) -> Result<GeneratedImage, HeavyFailure> {
        self.heavy("generate", async {
            let image = self.generator.generate(&request).await?;
            self.logger
                .log(RequestLogEvent {
                    client_ip: client_ip.to_string(),
                    prompt: request.prompt.clone(),
                    model: image.model_used.clone(),
                    api_key: image.key_used.clone(),
                    image: Some(InlineImage::new(
                        image.image_base64.clone(),
                        Some(image.mime_type.as_str()),
                    )),
                    request_type: RequestType::Generation,
                })
                .await;
            Ok(image)
        })
        .await
    }

    /// Describe an uploaded image. An empty or missing prompt selects the
    /// preset for `analysis_type`.
    #[instrument(skip(self, image_bytes, prompt), fields(bytes = image_bytes.len()))]
    pub async fn analyze(
        &self,
        image_bytes: &[u8],
        mime_type: &str,
        prompt: Option<&str>,
        analysis_type: AnalysisType,
        client_ip: &str,
    ) -> Result<String, HeavyFailure> {
        let prompt = prompt
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| analysis_type.default_prompt());

        self.heavy("analyze", async {
            if image_bytes.is_empty() {
                return Err(GatewayError::InvalidInput("uploaded file is empty".to_string()));
            }
            let description = self.vision.analyze(image_bytes, mime_type, prompt).await?;
            self.logger
                .log(RequestLogEvent {
                    client_ip: client_ip.to_string(),
                    prompt: prompt.to_string(),
                    model: self.vision.model().to_string(),
                    api_key: description.key_used.clone(),
                    image: None,
                    request_type: RequestType::Analysis,
                })
                .await;
            Ok(description.text)
        })
        .await
    }

    /// Hold one permit for the whole operation, including error translation
    async fn heavy<T, F>(&self, operation: &'static str, work: F) -> Result<T, HeavyFailure>
    where
        F: Future<Output = GatewayResult<T>>,
    {
        let _permit = self.limiter.acquire().await;

        match work.await {
            Ok(value) => Ok(value),
            Err(source) => {
                error!("Error in {}: {}", operation, source);
                let message = self.translator.translate(&source.to_string()).await;
                Err(HeavyFailure { message, source })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::prompts::FACADE_ANALYSIS_PROMPT;
    use mockito::Matcher;
    use std::collections::HashMap;
    use std::time::Duration;
    use tempfile::TempDir;

    const IMAGE_OK: &str =
        r#"{"candidates":[{"content":{"parts":[{"inlineData":{"mimeType":"image/png","data":"aW1hZ2Utb25l"}}]}}]}"#;

    fn gateway(server_url: &str, dir: &TempDir, extra: &[(&str, &str)]) -> Gateway {
        let mut vars: HashMap<String, String> = HashMap::from([
            ("GOOGLE_API_KEY".to_string(), "gkey-00001111".to_string()),
            ("GOOGLE_API_BASE_URL".to_string(), server_url.to_string()),
            ("GEMINI_IMAGE_MODEL".to_string(), "image-model".to_string()),
            ("GEMINI_VISION_MODEL".to_string(), "vision-model".to_string()),
            ("QWEN_API_KEY".to_string(), "qkey-22223333".to_string()),
            ("QWEN_API_BASE_URL".to_string(), server_url.to_string()),
            ("QWEN_MODEL".to_string(), "qwen-test".to_string()),
            (
                "HISTORY_DB_PATH".to_string(),
                dir.path().join("history.db").display().to_string(),
            ),
            (
                "HISTORY_IMAGES_DIR".to_string(),
                dir.path().join("images").display().to_string(),
            ),
        ]);
        for (k, v) in extra {
            vars.insert(k.to_string(), v.to_string());
        }
        let config = Config::load_with(|name| vars.get(name).cloned()).unwrap();
        Gateway::from_config(&config, Metrics::new()).unwrap()
    }

    fn request(prompt: &str) -> GenerationRequest {
        GenerationRequest {
            prompt: prompt.to_string(),
            aspect_ratio: "16:9".to_string(),
            resolution: "1K".to_string(),
            images: vec![],
        }
    }

    #[tokio::test]
    async fn test_generate_logs_with_backup() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1beta/models/image-model:generateContent")
            .with_status(200)
            .with_body(IMAGE_OK)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let gateway = gateway(&server.url(), &dir, &[]);
        let image = gateway
            .generate(request("timber pavilion"), "192.168.1.20")
            .await
            .unwrap();

        assert_eq!(image.model_used, "image-model");
        assert_eq!(gateway.limiter().in_flight(), 0);

        let rows = gateway.logger().recent(5).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].prompt, "timber pavilion");
        assert_eq!(rows[0].client_ip, "192.168.1.20");
        assert_eq!(rows[0].api_key_suffix, "1111");
        assert_eq!(rows[0].request_type, RequestType::Generation);

        let filename = rows[0].image_filename.clone().unwrap();
        assert!(filename.ends_with(".png"));
        let written = std::fs::read(dir.path().join("images").join(filename)).unwrap();
        assert_eq!(written, b"image-one");
    }

    #[tokio::test]
    async fn test_failure_is_translated_and_not_logged() {
        let mut server = mockito::Server::new_async().await;
        let _generation = server
            .mock("POST", "/v1beta/models/image-model:generateContent")
            .with_status(200)
            .with_body(r#"{"promptFeedback":{"blockReason":"PROHIBITED_CONTENT"}}"#)
            .create_async()
            .await;
        let translation = server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::Regex("PROHIBITED_CONTENT".to_string()))
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":"提示词包含敏感内容，请修改后重试。"}}]}"#)
            .expect(1)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let gateway = gateway(&server.url(), &dir, &[]);
        let failure = gateway
            .generate(request("something forbidden"), "127.0.0.1")
            .await
            .unwrap_err();

        translation.assert_async().await;
        assert_eq!(failure.message, "提示词包含敏感内容，请修改后重试。");
        assert!(matches!(failure.source, GatewayError::ContentBlocked { .. }));
        assert_eq!(gateway.limiter().in_flight(), 0);
        assert_eq!(gateway.logger().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_analyze_uses_preset_prompt() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1beta/models/vision-model:generateContent")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "contents": [{"parts": [{"text": FACADE_ANALYSIS_PROMPT}]}]
            })))
            .with_status(200)
            .with_body(r#"{"candidates":[{"content":{"parts":[{"text":"A rhythmic brick facade."}]}}]}"#)
            .expect(1)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let gateway = gateway(&server.url(), &dir, &[]);
        let description = gateway
            .analyze(b"image-one", "image/png", Some("  "), AnalysisType::Facade, "10.1.1.1")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(description, "A rhythmic brick facade.");

        let rows = gateway.logger().recent(1).await.unwrap();
        assert_eq!(rows[0].request_type, RequestType::Analysis);
        assert_eq!(rows[0].model, "vision-model");
        assert!(rows[0].image_filename.is_none());
    }

    #[tokio::test]
    async fn test_optimize_logs_text_model() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":"优化后的提示词"}}]}"#)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let gateway = gateway(&server.url(), &dir, &[]);
        let optimized = gateway.optimize("a museum", "10.0.0.1").await.unwrap();
        assert_eq!(optimized, "优化后的提示词");

        let rows = gateway.logger().recent(1).await.unwrap();
        assert_eq!(rows[0].request_type, RequestType::Optimization);
        assert_eq!(rows[0].model, "qwen-test");
        assert_eq!(rows[0].api_key_suffix, "3333");
    }

    #[tokio::test]
    async fn test_missing_keys_fail_with_unconfigured_text_provider() {
        let server = mockito::Server::new_async().await;
        let dir = TempDir::new().unwrap();
        let gateway = gateway(
            &server.url(),
            &dir,
            &[("GOOGLE_API_KEY", ""), ("QWEN_API_KEY", "")],
        );

        let failure = gateway
            .generate(request("x"), "127.0.0.1")
            .await
            .unwrap_err();
        assert!(matches!(
            failure.source,
            GatewayError::Configuration("GOOGLE_API_KEY")
        ));
        assert_eq!(
            failure.message,
            crate::core::prompts::ERROR_TRANSLATION_UNCONFIGURED
        );
    }

    #[tokio::test]
    async fn test_empty_upload_is_invalid_input() {
        let mut server = mockito::Server::new_async().await;
        let vision = server
            .mock("POST", "/v1beta/models/vision-model:generateContent")
            .expect(0)
            .create_async()
            .await;
        let _translation = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":"上传的文件为空。"}}]}"#)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let gateway = gateway(&server.url(), &dir, &[]);
        let failure = gateway
            .analyze(b"", "image/png", None, AnalysisType::General, "127.0.0.1")
            .await
            .unwrap_err();

        vision.assert_async().await;
        assert!(matches!(failure.source, GatewayError::InvalidInput(_)));
        assert_eq!(failure.message, "上传的文件为空。");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_heavy_operation_holds_permit_while_running() {
        // Upstream that accepts connections and never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let upstream = format!("http://{}", listener.local_addr().unwrap());
        let hold = tokio::spawn(async move {
            let mut open = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                open.push(socket);
            }
        });

        let dir = TempDir::new().unwrap();
        let gateway = Arc::new(gateway(
            &upstream,
            &dir,
            &[("MAX_CONCURRENT_REQUESTS", "1")],
        ));

        let first = {
            let gateway = Arc::clone(&gateway);
            tokio::spawn(async move { gateway.generate(request("slow"), "10.0.0.1").await })
        };
        for _ in 0..100 {
            if gateway.limiter().in_flight() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(gateway.limiter().in_flight(), 1);
        assert_eq!(gateway.limiter().available(), 0);

        // The second call waits for the permit and never starts
        let second = tokio::time::timeout(
            Duration::from_millis(300),
            gateway.optimize("a museum", "10.0.0.2"),
        )
        .await;
        assert!(second.is_err());
        assert_eq!(gateway.limiter().in_flight(), 1);

        first.abort();
        assert!(first.await.unwrap_err().is_cancelled());
        hold.abort();
        assert_eq!(gateway.limiter().in_flight(), 0);
        assert_eq!(gateway.limiter().available(), 1);
    }
}
