// Library exports for the architectural rendering gateway
//
// Prompt optimization, image generation and image analysis in front of
// external generative-AI providers

// Core modules
pub mod core;
pub mod middleware;
pub mod orchestration;
pub mod services;
pub mod utils;

// Re-export commonly used types and functions
pub use crate::core::{
    config::Config,
    errors::{ConfigError, GatewayError, HeavyFailure, LogStoreError},
    types::{AnalysisType, GeneratedImage, GenerationRequest, InlineImage, RequestType},
};

pub use middleware::{ApiKeyPool, ConcurrencyLimiter};

pub use orchestration::Gateway;

pub use services::{ImageGenerationClient, PromptOptimizer, RequestLogger, VisionClient};

pub use utils::Metrics;
