//! Image decoding for the thumbnail pipeline.
//!
//! This module provides:
//! - Content-sniffed decoding of standard containers (JPEG, PNG, TIFF, WebP)
//! - Structural lookup of JPEGs declared inside RAW containers (TIFF IFDs, RAF header)
//! - Preview-grade sensor decoding through rawloader
//! - Resizing that never upscales
//! - [`RawDecoder`], the ordered strategy chain that turns any supported
//!   file into a display-oriented bitmap
//!
//! # Performance Strategy
//!
//! For RAW files there are two paths:
//! - **Fast path**: a JPEG the container already carries, found without
//!   decoding anything else
//! - **Slow path**: sensor data decoded with block skipping to a bounded size

mod chain;
mod container;
mod demosaic;
mod embedded;
mod markers;
mod resize;
mod types;

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

pub use chain::{DecodeStrategy, RawDecoder};
pub use container::{
    decode_bytes, decode_file, load_by_extension, read_file_orientation, read_orientation,
    OrientationPolicy,
};
pub use demosaic::decode_sensor;
pub use embedded::{
    decode_largest, find_embedded_jpegs, is_raf_container, is_tiff_container, EmbeddedJpeg,
};
pub use markers::{extract_slice, find_jpeg_end, is_jpeg_data, jpeg_dimensions, JPEG_SOI};
pub use resize::{fit_dimensions, fit_within, resize, resize_to_fit};
pub use types::{Bitmap, DecodeAttempt, FilterType, Orientation};

use crate::error::{PipelineError, Result};

/// Memory-map a file read-only.
///
/// # Errors
///
/// Returns `PipelineError::NotReadable` when the file cannot be opened or
/// mapped, or is empty.
pub fn map_file(path: &Path) -> Result<Mmap> {
    let file = File::open(path).map_err(|e| PipelineError::not_readable(path, e))?;
    let len = file
        .metadata()
        .map_err(|e| PipelineError::not_readable(path, e))?
        .len();
    if len == 0 {
        return Err(PipelineError::not_readable(path, "empty file"));
    }
    // SAFETY: the mapping is read-only and only lives for the duration of a
    // single decode. Truncation by another process while mapped can fault.
    unsafe { Mmap::map(&file) }.map_err(|e| PipelineError::not_readable(path, e))
}
