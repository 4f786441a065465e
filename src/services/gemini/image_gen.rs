use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::transport::GeminiTransport;
use super::vision::VisionClient;
use super::wire::{
    extract_inline_image, Content, GenerateContentRequest, GenerationConfig, ImageConfig,
    ImageExtraction, Part,
};
use crate::core::config::Config;
use crate::core::errors::{GatewayError, GatewayResult};
use crate::core::prompts::{
    DEFAULT_NEGATIVE_PROMPT, REFERENCE_ANALYSIS_HEADER, REFERENCE_ANALYSIS_PROMPT,
};
use crate::core::types::{GeneratedImage, GenerationRequest, InlineImage};
use crate::middleware::ApiKeyPool;
use crate::utils::image_ops::decode_base64_image;
use crate::utils::Metrics;

/// Image generation client with a single fallback attempt on a missing model
pub struct ImageGenerationClient {
    transport: GeminiTransport,
    api_key_pool: Arc<ApiKeyPool>,
    primary_model: String,
    fallback_model: Option<String>,
    /// Set when reference images should be described before generation
    reference_vision: Option<Arc<VisionClient>>,
    metrics: Option<Metrics>,
}

impl ImageGenerationClient {
    pub fn new(
        config: &Config,
        transport: GeminiTransport,
        api_key_pool: Arc<ApiKeyPool>,
        metrics: Option<Metrics>,
    ) -> Self {
        Self {
            transport,
            api_key_pool,
            primary_model: config.gemini.image_model.clone(),
            fallback_model: config.image_fallback_model().map(str::to_string),
            reference_vision: None,
            metrics,
        }
    }

    /// Describe reference images with `vision` and append the result to the prompt
    pub fn with_reference_analysis(mut self, vision: Arc<VisionClient>) -> Self {
        self.reference_vision = Some(vision);
        self
    }

    pub fn primary_model(&self) -> &str {
        &self.primary_model
    }

    pub fn fallback_model(&self) -> Option<&str> {
        self.fallback_model.as_deref()
    }

    /// Generate one image.
    ///
    /// An upstream 404 on the primary model is retried once against the
    /// fallback model (when configured); every other failure is terminal.
    #[instrument(skip(self, request), fields(
        aspect_ratio = %request.aspect_ratio,
        resolution = %request.resolution,
        images = request.images.len()
    ))]
    pub async fn generate(&self, request: &GenerationRequest) -> GatewayResult<GeneratedImage> {
        let resolution = normalize_resolution(&request.resolution);

        let mut prompt = request.prompt.clone();
        if let Some(vision) = &self.reference_vision {
            prompt.push_str(&self.describe_references(vision, &request.images).await);
        }

        match self
            .generate_with_model(&prompt, request, &resolution, &self.primary_model)
            .await
        {
            Ok(image) => Ok(image),
            Err(err) if err.upstream_status() == Some(404) => {
                let Some(fallback) = self.fallback_model.as_deref() else {
                    return Err(err);
                };
                warn!(
                    "Model {} not found, retrying once with fallback {}",
                    self.primary_model, fallback
                );
                if let Some(ref m) = self.metrics {
                    m.record_fallback();
                }
                self.generate_with_model(&prompt, request, &resolution, fallback)
                    .await
            }
            Err(err) => Err(err),
        }
    }

    async fn generate_with_model(
        &self,
        prompt: &str,
        request: &GenerationRequest,
        resolution: &str,
        model: &str,
    ) -> GatewayResult<GeneratedImage> {
        let api_key = self
            .api_key_pool
            .next_key()
            .ok_or(GatewayError::Configuration("GOOGLE_API_KEY"))?;

        let body = build_generation_request(prompt, &request.aspect_ratio, resolution, &request.images);
        let reply = self.transport.generate_content(model, &api_key, &body).await?;

        let extracted = match extract_inline_image(&reply.response) {
            ImageExtraction::Image { data, mime_type } => Ok((data, mime_type)),
            ImageExtraction::PromptBlocked { reason } => Err(GatewayError::ContentBlocked { reason }),
            ImageExtraction::SafetyBlocked => Err(GatewayError::SafetyBlocked),
            ImageExtraction::RecitationBlocked => Err(GatewayError::RecitationBlocked),
            ImageExtraction::NoCandidates => Err(GatewayError::NoCandidates {
                snippet: reply.excerpt,
            }),
            ImageExtraction::NoImage { finish_reason } => Err(GatewayError::NoImageExtracted {
                finish_reason: finish_reason.unwrap_or_else(|| "none".to_string()),
                snippet: reply.excerpt,
            }),
        };
        let (image_base64, mime_type) = extracted.map_err(|err| self.record_refusal(err))?;

        info!("Generated {} image with {}", mime_type, model);
        Ok(GeneratedImage {
            image_base64,
            mime_type,
            model_used: model.to_string(),
            key_used: api_key,
        })
    }

    fn record_refusal(&self, err: GatewayError) -> GatewayError {
        if err.is_content_block() {
            if let Some(ref m) = self.metrics {
                m.record_content_block();
            }
        }
        err
    }

    /// Describe each reference image in turn and build the block appended to
    /// the prompt. Images that fail are skipped; no description yields "".
    pub async fn describe_references(&self, vision: &VisionClient, images: &[InlineImage]) -> String {
        let mut descriptions = Vec::new();

        // One vision call at a time
        for (index, image) in images.iter().enumerate() {
            let bytes = match decode_base64_image(&image.data) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Skipping reference image {}: invalid base64 ({})", index + 1, e);
                    self.reference_failed();
                    continue;
                }
            };

            match vision
                .analyze(&bytes, &image.mime_type, REFERENCE_ANALYSIS_PROMPT)
                .await
            {
                Ok(description) => {
                    debug!("Reference image {} described", index + 1);
                    descriptions.push(format!("Reference image {}: {}", index + 1, description.text));
                }
                Err(e) => {
                    warn!("Failed to analyze reference image {}: {}", index + 1, e);
                    self.reference_failed();
                }
            }
        }

        if descriptions.is_empty() {
            return String::new();
        }

        format!("\n\n{}\n{}", REFERENCE_ANALYSIS_HEADER, descriptions.join("\n"))
    }

    fn reference_failed(&self) {
        if let Some(ref m) = self.metrics {
            m.record_reference_analysis_failure();
        }
    }
}

/// Upper-case the requested size; empty means 1K
pub fn normalize_resolution(resolution: &str) -> String {
    let trimmed = resolution.trim();
    if trimmed.is_empty() {
        "1K".to_string()
    } else {
        trimmed.to_uppercase()
    }
}

/// Prompt with the fixed exclusion list appended
pub fn with_negative_prompt(prompt: &str) -> String {
    format!(
        "{}\n\n[Negative Prompt / Exclude]: {}",
        prompt,
        DEFAULT_NEGATIVE_PROMPT.trim()
    )
}

/// Assemble the generation payload: text first, then every non-empty image
pub fn build_generation_request(
    prompt: &str,
    aspect_ratio: &str,
    resolution: &str,
    images: &[InlineImage],
) -> GenerateContentRequest {
    let mut parts = vec![Part::text(with_negative_prompt(prompt))];
    parts.extend(
        images
            .iter()
            .filter(|image| !image.data.is_empty())
            .map(Part::inline),
    );

    GenerateContentRequest {
        contents: vec![Content {
            role: Some("user".to_string()),
            parts,
        }],
        generation_config: Some(GenerationConfig {
            response_modalities: vec!["IMAGE".to_string()],
            image_config: ImageConfig {
                aspect_ratio: aspect_ratio.to_string(),
                image_size: resolution.to_string(),
            },
        }),
    }
}
