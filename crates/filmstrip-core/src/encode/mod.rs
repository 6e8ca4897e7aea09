//! Bitmap encoders.
//!
//! - JPEG for thumbnails handed to callers (CLI output)
//! - PNG for the on-disk cache tier, which must round-trip losslessly so a
//!   disk hit is bit-identical to the bitmap that was stored
//!
//! # Examples
//!
//! ```ignore
//! use filmstrip_core::decode::Bitmap;
//! use filmstrip_core::encode::encode_jpeg;
//!
//! let bitmap = Bitmap::filled(100, 100, [128, 128, 128]);
//! let jpeg_bytes = encode_jpeg(&bitmap, 90).unwrap();
//! ```

mod jpeg;
mod png;

pub use jpeg::encode_jpeg;
pub use png::encode_png;

use thiserror::Error;

use crate::decode::Bitmap;

/// Errors that can occur while encoding a bitmap.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Pixel data length doesn't match expected dimensions
    #[error("Invalid pixel data: expected {expected} bytes (width * height * 3), got {actual}")]
    InvalidPixelData { expected: usize, actual: usize },

    /// Width or height is zero
    #[error("Invalid dimensions: width ({width}) and height ({height}) must be non-zero")]
    InvalidDimensions { width: u32, height: u32 },

    /// The underlying codec failed
    #[error("Encoding failed: {0}")]
    EncodingFailed(String),
}

/// Reject bitmaps whose buffer cannot be handed to a codec.
fn validate(bitmap: &Bitmap) -> Result<(), EncodeError> {
    if bitmap.width == 0 || bitmap.height == 0 {
        return Err(EncodeError::InvalidDimensions {
            width: bitmap.width,
            height: bitmap.height,
        });
    }

    let expected = bitmap.width as usize * bitmap.height as usize * 3;
    if bitmap.pixels.len() != expected {
        return Err(EncodeError::InvalidPixelData {
            expected,
            actual: bitmap.pixels.len(),
        });
    }
    Ok(())
}
