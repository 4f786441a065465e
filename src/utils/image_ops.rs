use base64::{engine::general_purpose, Engine};

use crate::core::types::InlineImage;

/// Split a `data:<mime>;base64,<payload>` URI into its mime type and payload.
///
/// Strings without a data-URI header come back unchanged with no mime type.
/// Unknown or malformed headers are not rejected; the mime type is simply
/// dropped and the caller falls back to its default.
pub fn split_data_uri(input: &str) -> (Option<&str>, &str) {
    let Some((header, payload)) = input.split_once(',') else {
        return (None, input);
    };

    let mime = header
        .strip_prefix("data:")
        .and_then(|rest| rest.split(';').next())
        .map(str::trim)
        .filter(|m| m.contains('/'));

    (mime, payload)
}

/// Turn inbound image strings (data URIs or raw base64) into inline images
pub fn inline_images_from_inputs(inputs: &[String]) -> Vec<InlineImage> {
    inputs
        .iter()
        .map(|raw| {
            let (mime, payload) = split_data_uri(raw.trim());
            InlineImage::new(payload, mime)
        })
        .collect()
}

/// Decode a base64 payload, tolerating a data-URI header
pub fn decode_base64_image(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let (_, payload) = split_data_uri(input.trim());
    general_purpose::STANDARD.decode(payload.trim())
}

pub fn encode_base64(bytes: &[u8]) -> String {
    general_purpose::STANDARD.encode(bytes)
}

/// File extension for a backup of the given image mime type
pub fn extension_for_mime(mime_type: &str) -> &'static str {
    match mime_type.to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "png",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_data_uri_with_header() {
        let (mime, payload) = split_data_uri("data:image/png;base64,iVBORw0KGgo=");
        assert_eq!(mime, Some("image/png"));
        assert_eq!(payload, "iVBORw0KGgo=");
    }

    #[test]
    fn test_split_raw_base64() {
        let (mime, payload) = split_data_uri("iVBORw0KGgo=");
        assert_eq!(mime, None);
        assert_eq!(payload, "iVBORw0KGgo=");
    }

    #[test]
    fn test_unknown_header_keeps_payload() {
        let (mime, payload) = split_data_uri("garbage,AAAA");
        assert_eq!(mime, None);
        assert_eq!(payload, "AAAA");
    }

    #[test]
    fn test_inline_images_default_to_jpeg() {
        let images = inline_images_from_inputs(&[
            "data:image/webp;base64,UklGR".to_string(),
            "/9j/4AAQ".to_string(),
        ]);
        assert_eq!(images[0].mime_type, "image/webp");
        assert_eq!(images[0].data, "UklGR");
        assert_eq!(images[1].mime_type, "image/jpeg");
        assert_eq!(images[1].data, "/9j/4AAQ");
    }

    #[test]
    fn test_decode_tolerates_header() {
        let encoded = format!("data:image/png;base64,{}", encode_base64(b"png-bytes"));
        assert_eq!(decode_base64_image(&encoded).unwrap(), b"png-bytes");
        assert!(decode_base64_image("not base64!").is_err());
    }

    #[test]
    fn test_extension_for_mime() {
        assert_eq!(extension_for_mime("image/jpeg"), "jpg");
        assert_eq!(extension_for_mime("image/PNG"), "png");
        assert_eq!(extension_for_mime("application/octet-stream"), "png");
    }
}
