//! Request payload helpers.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use tracing::debug;

/// Decodes a base64 image, with or without a `data:<mime>;base64,` prefix.
pub fn decode_image(encoded: &str) -> Option<Bytes> {
    let trimmed = encoded.trim();
    let body = match trimmed.strip_prefix("data:") {
        Some(rest) => rest.split_once(";base64,")?.1,
        None => trimmed,
    };
    match STANDARD.decode(body) {
        Ok(data) => Some(Bytes::from(data)),
        Err(err) => {
            debug!(error = %err, "rejected malformed base64 image");
            None
        }
    }
}

/// Decodes every image, keeping positions stable. An undecodable entry
/// becomes an empty payload, which the engine then reports as "not an image"
/// at the same index.
pub fn decode_images(encoded: &[String]) -> Vec<Bytes> {
    encoded
        .iter()
        .map(|e| decode_image(e).unwrap_or_default())
        .collect()
}
