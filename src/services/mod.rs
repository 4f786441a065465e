pub mod gemini;
pub mod http_client;
pub mod request_log;
pub mod text;

// Re-export commonly used services
pub use gemini::{GeminiTransport, ImageGenerationClient, VisionClient};
pub use request_log::RequestLogger;
pub use text::{ChatCompletionClient, ErrorTranslator, PromptOptimizer};
