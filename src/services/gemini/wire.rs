// Gemini generateContent wire format and response classification

use serde::{Deserialize, Serialize};

use crate::core::types::InlineImage;

// Request side

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn inline(image: &InlineImage) -> Self {
        Self::Inline {
            inline_data: InlineData {
                mime_type: image.mime_type.clone(),
                data: image.data.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    pub image_config: ImageConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageConfig {
    pub aspect_ratio: String,
    pub image_size: String,
}

// Response side. Every field is optional: providers and proxies omit or null
// them freely, and the classification below decides what a gap means.

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Option<Vec<Candidate>>,
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    pub usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<ResponseContent>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseContent {
    #[serde(default)]
    pub parts: Option<Vec<ResponsePart>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponsePart {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default, alias = "inline_data")]
    pub inline_data: Option<ResponseInlineData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseInlineData {
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default, alias = "mime_type")]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(default)]
    pub block_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: Option<u64>,
    #[serde(default)]
    pub candidates_token_count: Option<u64>,
}

impl GenerateContentResponse {
    fn first_candidate(&self) -> Option<&Candidate> {
        self.candidates.as_deref().and_then(|c| c.first())
    }

    /// (input_tokens, output_tokens), zero when absent
    pub fn token_usage(&self) -> (u64, u64) {
        self.usage_metadata
            .as_ref()
            .map(|u| {
                (
                    u.prompt_token_count.unwrap_or(0),
                    u.candidates_token_count.unwrap_or(0),
                )
            })
            .unwrap_or((0, 0))
    }

    /// First text part of the first candidate
    pub fn first_text(&self) -> Option<&str> {
        self.first_candidate()?
            .content
            .as_ref()?
            .parts
            .as_deref()?
            .iter()
            .find_map(|part| part.text.as_deref())
    }
}

/// Default mime type for generated images that do not declare one
pub const DEFAULT_GENERATED_MIME: &str = "image/png";

/// Outcome of scanning a generation response for an image
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageExtraction {
    Image { data: String, mime_type: String },
    PromptBlocked { reason: String },
    NoCandidates,
    SafetyBlocked,
    RecitationBlocked,
    NoImage { finish_reason: Option<String> },
}

/// Classify a generation response.
///
/// Checks run in order: prompt-level block, empty candidates, safety and
/// recitation finish reasons on the first candidate, then the first part
/// carrying non-empty inline data.
pub fn extract_inline_image(response: &GenerateContentResponse) -> ImageExtraction {
    if let Some(reason) = response
        .prompt_feedback
        .as_ref()
        .and_then(|f| f.block_reason.as_deref())
        .filter(|r| !r.is_empty())
    {
        return ImageExtraction::PromptBlocked {
            reason: reason.to_string(),
        };
    }

    let Some(candidate) = response.first_candidate() else {
        return ImageExtraction::NoCandidates;
    };

    match candidate.finish_reason.as_deref() {
        Some("SAFETY") => return ImageExtraction::SafetyBlocked,
        Some("RECITATION") => return ImageExtraction::RecitationBlocked,
        _ => {}
    }

    let parts = candidate
        .content
        .as_ref()
        .and_then(|c| c.parts.as_deref())
        .unwrap_or_default();

    for part in parts {
        let Some(inline) = &part.inline_data else {
            continue;
        };
        if let Some(data) = inline.data.as_deref().filter(|d| !d.is_empty()) {
            return ImageExtraction::Image {
                data: data.to_string(),
                mime_type: inline
                    .mime_type
                    .clone()
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| DEFAULT_GENERATED_MIME.to_string()),
            };
        }
    }

    ImageExtraction::NoImage {
        finish_reason: candidate.finish_reason.clone(),
    }
}
