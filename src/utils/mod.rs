pub mod image_ops;
pub mod metrics;

// Re-export commonly used items
pub use image_ops::{decode_base64_image, encode_base64, inline_images_from_inputs, split_data_uri};
pub use metrics::{Metrics, MetricsSnapshot};
