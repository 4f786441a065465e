// Gemini multimodal provider: image generation and image description

pub mod image_gen;
pub mod transport;
pub mod vision;
pub mod wire;

pub use image_gen::ImageGenerationClient;
pub use transport::{GeminiReply, GeminiTransport};
pub use vision::VisionClient;
