//! JPEG encoding for thumbnails written out of the pipeline.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder};

use super::{validate, EncodeError};
use crate::decode::Bitmap;

/// Encode a bitmap as JPEG.
///
/// `quality` is clamped to 1-100.
///
/// # Errors
///
/// Returns `EncodeError::InvalidDimensions` for an empty bitmap and
/// `EncodeError::InvalidPixelData` when the buffer length is wrong.
pub fn encode_jpeg(bitmap: &Bitmap, quality: u8) -> Result<Vec<u8>, EncodeError> {
    validate(bitmap)?;

    let mut buffer = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100))
        .write_image(
            &bitmap.pixels,
            bitmap.width,
            bitmap.height,
            ExtendedColorType::Rgb8,
        )
        .map_err(|e| EncodeError::EncodingFailed(e.to_string()))?;

    Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_jpeg_markers() {
        let jpeg_bytes = encode_jpeg(&Bitmap::filled(100, 100, [128, 128, 128]), 90).unwrap();

        // SOI and EOI markers
        assert_eq!(&jpeg_bytes[0..2], &[0xFF, 0xD8]);
        let len = jpeg_bytes.len();
        assert_eq!(&jpeg_bytes[len - 2..], &[0xFF, 0xD9]);
    }

    #[test]
    fn test_encode_jpeg_quality_clamping() {
        let bitmap = Bitmap::filled(10, 10, [128, 128, 128]);
        assert!(encode_jpeg(&bitmap, 0).is_ok());
        assert!(encode_jpeg(&bitmap, 255).is_ok());
    }

    #[test]
    fn test_encode_jpeg_invalid_pixel_data() {
        let bitmap = Bitmap {
            width: 100,
            height: 100,
            pixels: vec![128u8; 99 * 100 * 3],
        };
        assert!(matches!(
            encode_jpeg(&bitmap, 90),
            Err(EncodeError::InvalidPixelData { .. })
        ));
    }

    #[test]
    fn test_encode_jpeg_zero_dimensions() {
        let bitmap = Bitmap {
            width: 0,
            height: 100,
            pixels: vec![],
        };
        assert!(matches!(
            encode_jpeg(&bitmap, 90),
            Err(EncodeError::InvalidDimensions { .. })
        ));
    }

    #[test]
    fn test_encode_jpeg_decodes_back_to_same_size() {
        let bitmap = Bitmap::filled(37, 23, [10, 200, 30]);
        let bytes = encode_jpeg(&bitmap, 85).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (37, 23));
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================
