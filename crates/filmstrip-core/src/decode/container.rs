//! Standard bitmap containers (JPEG, PNG, TIFF, WebP) with EXIF orientation handling.
//!
//! Formats are sniffed from content first so renamed files still decode;
//! [`load_by_extension`] is the extension-driven variant used as a last
//! resort.

use std::fs::File;
use std::io::{BufReader, Cursor};
use std::path::Path;

use exif::{In, Reader, Tag};
use image::{DynamicImage, ImageFormat, ImageReader};

use super::{Bitmap, Orientation};
use crate::error::{PipelineError, Result};
use crate::transform::apply_orientation;

/// Where the orientation of a decoded image comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrientationPolicy {
    /// Read the EXIF orientation of the decoded bytes.
    #[default]
    Detect,
    /// Use a known orientation and skip detection.
    Fixed(Orientation),
    /// Leave pixels as stored.
    Ignore,
}

/// Decode image bytes of any supported container, applying orientation per `policy`.
///
/// # Errors
///
/// Returns `PipelineError::DecodeFailed` if the bytes are not a decodable image.
pub fn decode_bytes(bytes: &[u8], policy: OrientationPolicy) -> Result<Bitmap> {
    let img = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| PipelineError::DecodeFailed(e.to_string()))?
        .decode()
        .map_err(|e| PipelineError::DecodeFailed(e.to_string()))?;

    let orientation = match policy {
        OrientationPolicy::Detect => read_orientation(bytes),
        OrientationPolicy::Fixed(o) => Some(o),
        OrientationPolicy::Ignore => None,
    };
    Ok(oriented(img, orientation))
}

/// Decode a file by content sniffing, shrinking it to `max_edge` when given.
///
/// # Errors
///
/// - `PipelineError::NotReadable` if the file cannot be opened
/// - `PipelineError::DecodeFailed` if the content is not a decodable image
pub fn decode_file(path: &Path, max_edge: Option<u32>, policy: OrientationPolicy) -> Result<Bitmap> {
    let img = ImageReader::open(path)
        .map_err(|e| PipelineError::not_readable(path, e))?
        .with_guessed_format()
        .map_err(|e| PipelineError::not_readable(path, e))?
        .decode()
        .map_err(|e| PipelineError::DecodeFailed(e.to_string()))?;

    let img = shrink(img, max_edge);
    let orientation = match policy {
        OrientationPolicy::Detect => read_file_orientation(path),
        OrientationPolicy::Fixed(o) => Some(o),
        OrientationPolicy::Ignore => None,
    };
    Ok(oriented(img, orientation))
}

/// Load a file using the format implied by its extension.
pub fn load_by_extension(path: &Path, policy: OrientationPolicy) -> Result<Bitmap> {
    let format = ImageFormat::from_path(path)
        .map_err(|e| PipelineError::DecodeFailed(e.to_string()))?;
    let file = File::open(path).map_err(|e| PipelineError::not_readable(path, e))?;
    let img = image::load(BufReader::new(file), format)
        .map_err(|e| PipelineError::DecodeFailed(e.to_string()))?;

    let orientation = match policy {
        OrientationPolicy::Detect => read_file_orientation(path),
        OrientationPolicy::Fixed(o) => Some(o),
        OrientationPolicy::Ignore => None,
    };
    Ok(oriented(img, orientation))
}

/// EXIF orientation of in-memory container bytes, `None` when absent.
pub fn read_orientation(bytes: &[u8]) -> Option<Orientation> {
    let exif = Reader::new()
        .read_from_container(&mut Cursor::new(bytes))
        .ok()?;
    orientation_field(&exif)
}

/// EXIF orientation of a file on disk (JPEG, TIFF-based RAW, PNG, WebP, HEIF).
pub fn read_file_orientation(path: &Path) -> Option<Orientation> {
    let file = File::open(path).ok()?;
    let exif = Reader::new()
        .read_from_container(&mut BufReader::new(file))
        .ok()?;
    orientation_field(&exif)
}

fn orientation_field(exif: &exif::Exif) -> Option<Orientation> {
    let field = exif.get_field(Tag::Orientation, In::PRIMARY)?;
    Orientation::from_code(field.value.get_uint(0)?)
}

fn shrink(img: DynamicImage, max_edge: Option<u32>) -> DynamicImage {
    match max_edge {
        Some(edge) if edge > 0 && img.width().max(img.height()) > edge => img.thumbnail(edge, edge),
        _ => img,
    }
}

fn oriented(img: DynamicImage, orientation: Option<Orientation>) -> Bitmap {
    let bitmap = Bitmap::from_dynamic(img);
    match orientation {
        Some(o) if o != Orientation::Normal => apply_orientation(&bitmap, o),
        _ => bitmap,
    }
}
