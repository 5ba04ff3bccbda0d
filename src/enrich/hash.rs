//! Image bytes to base64 thumbhash.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;

/// Bounding box the image is fitted into before hashing.
pub const THUMBNAIL_MAX_DIMENSION: u32 = 100;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("image has no pixels ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },
}

/// Decodes `bytes`, fits the image inside 100x100 keeping its aspect ratio,
/// and returns the thumbhash of its RGBA pixels as standard base64.
///
/// This is CPU bound; async callers should run it on the blocking pool.
///
/// # Errors
///
/// Returns [`HashError`] if the bytes are not a decodable image or decode
/// to an empty one.
pub fn thumbhash_from_image_bytes(bytes: &[u8]) -> Result<String, HashError> {
    let image = image::load_from_memory(bytes)?;
    let thumbnail = image
        .thumbnail(THUMBNAIL_MAX_DIMENSION, THUMBNAIL_MAX_DIMENSION)
        .to_rgba8();

    let (width, height) = thumbnail.dimensions();
    if width == 0 || height == 0 {
        return Err(HashError::EmptyImage { width, height });
    }

    let hash = thumbhash::rgba_to_thumb_hash(width as usize, height as usize, thumbnail.as_raw());
    Ok(STANDARD.encode(hash))
}
