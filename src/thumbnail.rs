//! Thumbnail generation for registered images
//!
//! Pure functions, no shared state; safe to call concurrently for
//! different paths.

use image::RgbaImage;
use std::path::Path;
use tracing::debug;

use crate::error::{Error, Result};

/// Generate a preview bitmap for an image file, bounded to `max_dim` on
/// either axis with aspect ratio preserved.
///
/// Decoding goes through an in-memory buffer so the path itself never
/// reaches the decoder; non-ASCII paths behave the same as any other.
pub fn generate(path: &Path, max_dim: u32) -> Result<RgbaImage> {
    let decoded = load_image(path)?;
    let thumb = decoded.thumbnail(max_dim, max_dim).to_rgba8();

    debug!(
        "Thumbnail for {:?}: {}x{} (max {})",
        path.file_name().unwrap_or_default(),
        thumb.width(),
        thumb.height(),
        max_dim
    );

    Ok(thumb)
}

/// Read and decode an image file into a `DynamicImage`.
pub(crate) fn load_image(path: &Path) -> Result<image::DynamicImage> {
    let bytes = std::fs::read(path)
        .map_err(|e| Error::image_load(path, image::ImageError::IoError(e)))?;
    image::load_from_memory(&bytes).map_err(|e| Error::image_load(path, e))
}
