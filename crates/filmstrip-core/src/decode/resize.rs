//! Image resizing for thumbnails and previews.
//!
//! All functions return new `Bitmap` instances without modifying the input,
//! and none of the fitting functions ever upscale.

use super::{Bitmap, FilterType};
use crate::error::{PipelineError, Result};

/// Resize an image to exact dimensions.
///
/// # Errors
///
/// Returns `PipelineError::DecodeFailed` for zero target dimensions or a
/// pixel buffer that does not match the declared size.
pub fn resize(image: &Bitmap, width: u32, height: u32, filter: FilterType) -> Result<Bitmap> {
    if width == 0 || height == 0 {
        return Err(PipelineError::DecodeFailed(format!(
            "Invalid resize target {}x{}",
            width, height
        )));
    }

    // Fast path: if dimensions match, just clone
    if image.width == width && image.height == height {
        return Ok(image.clone());
    }

    let rgb_image = image
        .to_rgb_image()
        .ok_or_else(|| PipelineError::DecodeFailed("Pixel buffer size mismatch".to_string()))?;

    // Large bilinear reductions use box sampling, which is much cheaper than
    // a triangle filter over a multi-megapixel source
    let large_reduction = image.width >= width * 2 && image.height >= height * 2;
    let resized = if filter == FilterType::Bilinear && large_reduction {
        image::imageops::thumbnail(&rgb_image, width, height)
    } else {
        image::imageops::resize(&rgb_image, width, height, filter.to_image_filter())
    };

    Ok(Bitmap::from_rgb_image(resized))
}

/// Scale an image so its longest edge is at most `max_edge`.
pub fn resize_to_fit(image: &Bitmap, max_edge: u32, filter: FilterType) -> Result<Bitmap> {
    fit_within(image, max_edge, max_edge, filter)
}

/// Scale an image to fit a `max_width` x `max_height` box, preserving aspect ratio.
///
/// Images that already fit are returned unchanged.
pub fn fit_within(
    image: &Bitmap,
    max_width: u32,
    max_height: u32,
    filter: FilterType,
) -> Result<Bitmap> {
    if max_width == 0 || max_height == 0 {
        return Err(PipelineError::DecodeFailed(format!(
            "Invalid bounding box {}x{}",
            max_width, max_height
        )));
    }

    if image.width <= max_width && image.height <= max_height {
        return Ok(image.clone());
    }

    let (new_width, new_height) = fit_dimensions(image.width, image.height, max_width, max_height);
    resize(image, new_width, new_height, filter)
}

/// Dimensions of `width` x `height` scaled down to fit the box.
///
/// Never grows either side; each side is at least 1 for non-empty input.
pub fn fit_dimensions(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (0, 0);
    }
    if width <= max_width && height <= max_height {
        return (width, height);
    }

    let scale = (max_width as f64 / width as f64).min(max_height as f64 / height as f64);
    let new_width = ((width as f64 * scale).round() as u32).clamp(1, max_width);
    let new_height = ((height as f64 * scale).round() as u32).clamp(1, max_height);
    (new_width, new_height)
}


// ============================================================================
// Property-Based Tests
// ============================================================================
