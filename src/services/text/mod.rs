// Text provider: prompt optimization and error translation

pub mod chat;
pub mod error_translator;
pub mod optimizer;

pub use chat::ChatCompletionClient;
pub use error_translator::ErrorTranslator;
pub use optimizer::PromptOptimizer;
