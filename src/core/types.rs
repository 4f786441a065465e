// Shared request, result and log types

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::prompts;

/// Default mime type for images supplied without one
pub const DEFAULT_INLINE_MIME: &str = "image/jpeg";

/// An image as it travels inline to the provider: base64 payload plus mime type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub data: String,
    pub mime_type: String,
}

impl InlineImage {
    pub fn new(data: impl Into<String>, mime_type: Option<&str>) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type
                .filter(|m| !m.is_empty())
                .unwrap_or(DEFAULT_INLINE_MIME)
                .to_string(),
        }
    }
}

/// Image generation request after inbound parsing
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub aspect_ratio: String,
    pub resolution: String,
    pub images: Vec<InlineImage>,
}

/// Result of a successful generation
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub image_base64: String,
    pub mime_type: String,
    pub model_used: String,
    pub key_used: String,
}

/// Result of a successful vision call
#[derive(Debug, Clone)]
pub struct ImageDescription {
    pub text: String,
    pub key_used: String,
}

/// Preset analysis flavours offered by the analyze endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisType {
    #[default]
    General,
    Scene,
    Facade,
}

impl AnalysisType {
    /// Parse the form value; anything unrecognised is treated as `general`
    pub fn from_form(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "scene" => Self::Scene,
            "facade" => Self::Facade,
            _ => Self::General,
        }
    }

    pub fn default_prompt(self) -> &'static str {
        match self {
            Self::General => prompts::GENERAL_ANALYSIS_PROMPT,
            Self::Scene => prompts::SCENE_ANALYSIS_PROMPT,
            Self::Facade => prompts::FACADE_ANALYSIS_PROMPT,
        }
    }
}

/// Kind of heavy request recorded in the request log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
    Generation,
    Analysis,
    Optimization,
}

impl RequestType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Generation => "generation",
            Self::Analysis => "analysis",
            Self::Optimization => "optimization",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "generation" => Some(Self::Generation),
            "analysis" => Some(Self::Analysis),
            "optimization" => Some(Self::Optimization),
            _ => None,
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the gateway hands to the request log after a successful heavy call
#[derive(Debug, Clone)]
pub struct RequestLogEvent {
    pub client_ip: String,
    pub prompt: String,
    pub model: String,
    /// Full credential; only its suffix is persisted
    pub api_key: String,
    /// Result image to back up; a data-URI header in the payload is tolerated
    pub image: Option<InlineImage>,
    pub request_type: RequestType,
}

/// A persisted row of the request log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogRecord {
    pub id: String,
    pub timestamp: String,
    pub client_ip: String,
    pub prompt: String,
    pub model: String,
    pub api_key_suffix: String,
    pub image_filename: Option<String>,
    pub request_type: RequestType,
}

// Inbound/outbound HTTP bodies

#[derive(Debug, Deserialize)]
pub struct OptimizeRequest {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OptimizeResponse {
    pub optimized_prompt: String,
}

fn default_aspect_ratio() -> String {
    "16:9".to_string()
}

fn default_resolution() -> String {
    "1K".to_string()
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: String,
    #[serde(default = "default_resolution")]
    pub resolution: String,
    /// Data URIs or raw base64 strings
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub image_base64: String,
    pub mime_type: String,
    pub model_used: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub description: String,
}

/// Error body returned on any failed endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}
