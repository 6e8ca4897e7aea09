//! Embedded preview extraction from RAW containers.
//!
//! The external tool is asked for a named embedded-image tag first. When it
//! is unavailable or returns nothing, the file is memory-mapped and scanned
//! for JPEG blocks; the largest block that decodes wins.
//!
//! # Orientation
//!
//! Embedded previews are usually stored in sensor orientation. The display
//! orientation is taken from the first of:
//!
//! 1. an upright entry in the per-format override table
//! 2. the EXIF orientation inside the extracted JPEG
//! 3. the override table's vendor tag, read through the tool
//! 4. the RAW container's own orientation tag
//! 5. normal

mod overrides;
mod scan;

use std::sync::Arc;

use tracing::debug;

pub use overrides::{lookup as orientation_override, OrientationOverride, ORIENTATION_OVERRIDES};
pub use scan::find_jpeg_blocks;

use crate::decode::{
    decode_bytes, map_file, read_file_orientation, read_orientation, Bitmap, Orientation,
    OrientationPolicy,
};
use crate::error::{PipelineError, Result};
use crate::identity::FileIdentity;
use crate::metadata::LooseValue;
use crate::tool::{binary_tag_args, numeric_tags_args, ToolRunner};

/// Which embedded image to look for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewKind {
    /// The largest embedded image.
    Preview,
    /// The smallest embedded image.
    Thumbnail,
}

impl PreviewKind {
    /// Tool tags to try, in order.
    pub fn tags(self) -> [&'static str; 2] {
        match self {
            PreviewKind::Preview => ["JpgFromRaw", "PreviewImage"],
            PreviewKind::Thumbnail => ["ThumbnailImage", "PreviewImage"],
        }
    }
}

/// An embedded image as stored, before orientation.
struct Extracted {
    bitmap: Bitmap,
    embedded_orientation: Option<Orientation>,
    via: &'static str,
}

/// Extracts embedded previews and thumbnails.
pub struct PreviewExtractor {
    tool: Arc<dyn ToolRunner>,
    scan_window: usize,
}

impl PreviewExtractor {
    pub fn new(tool: Arc<dyn ToolRunner>, scan_window: usize) -> Self {
        Self {
            tool,
            scan_window: scan_window.max(1),
        }
    }

    /// The largest embedded image, display-oriented.
    ///
    /// # Errors
    ///
    /// - `PipelineError::NotReadable` if the file is missing
    /// - `PipelineError::UnsupportedFormat` if no embedded image is found
    pub fn extract_preview(&self, identity: &FileIdentity) -> Result<Bitmap> {
        self.extract(identity, PreviewKind::Preview, None)
    }

    /// The smallest embedded image, display-oriented.
    pub fn extract_thumbnail(&self, identity: &FileIdentity) -> Result<Bitmap> {
        self.extract(identity, PreviewKind::Thumbnail, None)
    }

    /// Extract with a known orientation, skipping detection.
    pub fn extract_oriented(
        &self,
        identity: &FileIdentity,
        kind: PreviewKind,
        orientation: Orientation,
    ) -> Result<Bitmap> {
        self.extract(identity, kind, Some(orientation))
    }

    fn extract(
        &self,
        identity: &FileIdentity,
        kind: PreviewKind,
        known: Option<Orientation>,
    ) -> Result<Bitmap> {
        if !identity.exists() {
            return Err(PipelineError::not_readable(identity.path(), "file not found"));
        }

        let extracted = match self.from_tool(identity, kind) {
            Some(found) => found,
            None => self.from_scan(identity)?.ok_or_else(|| PipelineError::UnsupportedFormat {
                path: identity.path().to_path_buf(),
            })?,
        };

        let orientation =
            known.unwrap_or_else(|| self.detect_orientation(identity, extracted.embedded_orientation));
        debug!(
            path = %identity,
            via = extracted.via,
            width = extracted.bitmap.width,
            height = extracted.bitmap.height,
            orientation = orientation.code(),
            "Extracted embedded image"
        );
        Ok(crate::transform::apply_orientation(&extracted.bitmap, orientation))
    }

    fn from_tool(&self, identity: &FileIdentity, kind: PreviewKind) -> Option<Extracted> {
        if !self.tool.is_available() {
            return None;
        }
        for tag in kind.tags() {
            let bytes = match self.tool.run(&binary_tag_args(tag, identity.path())) {
                Ok(bytes) if !bytes.is_empty() => bytes,
                Ok(_) => {
                    debug!(path = %identity, tag, "Tag not present");
                    continue;
                }
                Err(e) => {
                    debug!(path = %identity, tag, error = %e, "Tag extraction failed");
                    continue;
                }
            };
            match decode_bytes(&bytes, OrientationPolicy::Ignore) {
                Ok(bitmap) => {
                    return Some(Extracted {
                        bitmap,
                        embedded_orientation: read_orientation(&bytes),
                        via: tag,
                    })
                }
                Err(e) => debug!(path = %identity, tag, error = %e, "Extracted bytes did not decode"),
            }
        }
        None
    }

    fn from_scan(&self, identity: &FileIdentity) -> Result<Option<Extracted>> {
        let map = map_file(identity.path())?;
        for block in find_jpeg_blocks(&map, self.scan_window) {
            let bytes = &map[block.clone()];
            match decode_bytes(bytes, OrientationPolicy::Ignore) {
                Ok(bitmap) => {
                    return Ok(Some(Extracted {
                        bitmap,
                        embedded_orientation: read_orientation(bytes),
                        via: "scan",
                    }))
                }
                Err(e) => debug!(path = %identity, offset = block.start, error = %e, "Scanned block did not decode"),
            }
        }
        Ok(None)
    }

    /// Display orientation for an extracted image of `identity`.
    pub fn detect_orientation(&self, identity: &FileIdentity, embedded: Option<Orientation>) -> Orientation {
        let vendor = orientation_override(&identity.extension());
        if let Some(OrientationOverride::Upright) = vendor {
            return Orientation::Normal;
        }

        // A preview that claims "normal" is usually just unannotated
        if let Some(o) = embedded.filter(|o| *o != Orientation::Normal) {
            return o;
        }

        if let Some(OrientationOverride::VendorTag { tag, map }) = vendor {
            if let Some(o) = self.tool_orientation(identity, tag).and_then(map) {
                return o;
            }
        }

        read_file_orientation(identity.path())
            .or_else(|| {
                self.tool_orientation(identity, "Orientation")
                    .and_then(|v| u32::try_from(v).ok())
                    .and_then(Orientation::from_code)
            })
            .unwrap_or_default()
    }

    /// Numeric value of one tag, read through the tool.
    fn tool_orientation(&self, identity: &FileIdentity, tag: &str) -> Option<i64> {
        if !self.tool.is_available() {
            return None;
        }
        let output = self
            .tool
            .run(&numeric_tags_args(&[tag], identity.path()))
            .map_err(|e| debug!(path = %identity, tag, error = %e, "Orientation tag read failed"))
            .ok()?;
        let records: Vec<serde_json::Map<String, serde_json::Value>> =
            serde_json::from_slice(&output).ok()?;
        let value: LooseValue = serde_json::from_value(records.first()?.get(tag)?.clone()).ok()?;
        value.as_i64()
    }
}
