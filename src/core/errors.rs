// Error types for the gateway
//
// Using thiserror for ergonomic error definitions with:
// - Type-safe matching on provider failure classes
// - Automatic Display/Error trait implementations
// - Source error chaining

use thiserror::Error;

/// Errors raised while talking to an upstream provider or shaping its result.
///
/// Every variant surfaces at the endpoint boundary as one opaque failure; the
/// error translator turns the `Display` text into a user-facing message.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0} is not set")]
    Configuration(&'static str),

    #[error("{provider} API error ({status}): {body}")]
    UpstreamApi {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("Request rejected by provider: {reason} (prompt unsafe)")]
    ContentBlocked { reason: String },

    #[error("Image generation blocked by the safety filter, please adjust the prompt")]
    SafetyBlocked,

    #[error("Generated content may be protected by copyright (recitation), please adjust the prompt")]
    RecitationBlocked,

    #[error("Generation failed: no candidates returned. Response: {snippet}")]
    NoCandidates { snippet: String },

    #[error("Unexpected response structure: {0}")]
    ResponseShape(String),

    #[error("Could not extract image data. Finish reason: {finish_reason}. Response: {snippet}")]
    NoImageExtracted {
        finish_reason: String,
        snippet: String,
    },

    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl GatewayError {
    /// Upstream HTTP status, when the failure came from a non-2xx response
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Self::UpstreamApi { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True for provider-side content refusals (prompt block, safety, recitation)
    pub fn is_content_block(&self) -> bool {
        matches!(
            self,
            Self::ContentBlocked { .. } | Self::SafetyBlocked | Self::RecitationBlocked
        )
    }
}

/// A failed heavy operation as it leaves the gateway: the translated,
/// user-facing message plus the provider error it came from.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HeavyFailure {
    pub message: String,
    #[source]
    pub source: GatewayError,
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid server config: {0}")]
    InvalidServerConfig(String),

    #[error("Invalid provider config: {0}")]
    InvalidProviderConfig(String),

    #[error("Concurrency limit must be between 1 and the semaphore maximum, got {0}")]
    InvalidConcurrency(usize),

    #[error("Timeout must be > 0 seconds ({0})")]
    InvalidTimeout(&'static str),

    #[error("Invalid storage path: {0}")]
    InvalidStoragePath(String),

    #[error("Environment variable parsing failed: {0}")]
    EnvVarError(String),
}

/// Request log storage errors
#[derive(Debug, Error)]
pub enum LogStoreError {
    #[error("SQLite operation failed: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to write image backup to {path}: {source}")]
    BackupFailed {
        path: String,
        source: std::io::Error,
    },

    #[error("Image backup payload is not valid base64: {0}")]
    BackupDecode(#[from] base64::DecodeError),

    #[error("Failed to create directory {path}: {source}")]
    DirectoryCreationFailed {
        path: String,
        source: std::io::Error,
    },

    #[error("Task join failed: {0}")]
    TaskJoinFailed(String),
}

// Convenience type aliases for Results
pub type GatewayResult<T> = Result<T, GatewayError>;
pub type ConfigResult<T> = Result<T, ConfigError>;
pub type LogStoreResult<T> = Result<T, LogStoreError>;
