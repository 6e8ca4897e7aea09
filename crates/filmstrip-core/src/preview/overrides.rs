//! Per-format orientation exceptions.
//!
//! Every entry is vendor-specific tech debt: a camera family whose standard
//! orientation tag is missing or wrong for its embedded previews. Remove an
//! entry once the generic chain handles the format.

use crate::decode::Orientation;

/// How orientation is decided for a format listed in [`ORIENTATION_OVERRIDES`].
#[derive(Debug, Clone, Copy)]
pub enum OrientationOverride {
    /// Previews are stored already rotated for display.
    Upright,
    /// Read a maker-note tag through the tool and map its value.
    VendorTag {
        tag: &'static str,
        map: fn(i64) -> Option<Orientation>,
    },
}

/// Lowercase extension to override.
pub const ORIENTATION_OVERRIDES: &[(&str, OrientationOverride)] = &[
    // CR3 previews carry no EXIF orientation; Canon records the camera
    // attitude in its own maker note
    (
        "cr3",
        OrientationOverride::VendorTag {
            tag: "CameraOrientation",
            map: canon_rotation,
        },
    ),
    // RAF: the JPEG header's IFD0 often says 1 while the RAF EXIF is right
    (
        "raf",
        OrientationOverride::VendorTag {
            tag: "Orientation",
            map: exif_code,
        },
    ),
    // Sigma X3F previews are rendered upright
    ("x3f", OrientationOverride::Upright),
];

/// The override for a lowercase extension, if any.
pub fn lookup(extension: &str) -> Option<OrientationOverride> {
    ORIENTATION_OVERRIDES
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, entry)| *entry)
}

/// Canon CameraOrientation: 0 horizontal, 1 rotate 90 CW, 2 rotate 270 CW.
fn canon_rotation(value: i64) -> Option<Orientation> {
    match value {
        0 => Some(Orientation::Normal),
        1 => Some(Orientation::Rotate90CW),
        2 => Some(Orientation::Rotate270CW),
        _ => None,
    }
}

fn exif_code(value: i64) -> Option<Orientation> {
    u32::try_from(value).ok().and_then(Orientation::from_code)
}
