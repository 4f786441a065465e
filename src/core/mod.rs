pub mod config;
pub mod errors;
pub mod prompts;
pub mod types;

// Re-export commonly used items for convenience
pub use config::Config;
pub use errors::{
    ConfigError, GatewayError, GatewayResult, HeavyFailure, LogStoreError, LogStoreResult,
};
pub use types::{
    AnalysisType, GeneratedImage, GenerationRequest, ImageDescription, LogRecord,
    InlineImage, RequestLogEvent, RequestType,
};
