// Middleware for provider calls
//
// Provides API key rotation and bounded concurrency for heavy operations

pub mod api_key_pool;
pub mod concurrency;

// Re-export commonly used types
pub use api_key_pool::ApiKeyPool;
pub use concurrency::{ConcurrencyLimiter, HeavyPermit};
