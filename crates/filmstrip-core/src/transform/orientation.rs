//! EXIF orientation correction.
//!
//! # Algorithm
//!
//! Orientation is applied by inverse mapping into a fresh canvas. Pixel
//! centers are expressed in doubled coordinates relative to the image center
//! (`q = 2 * x + 1 - width`), which keeps every step in integers:
//!
//! ```text
//! forward:  mirror (x -> -x), then k clockwise quarter turns ((x, y) -> (-y, x))
//! inverse:  k counter-clockwise quarter turns ((x, y) -> (y, -x)), then mirror
//! ```
//!
//! For each destination pixel the inverse transform yields exactly one
//! source pixel, so the result is a lossless permutation of the input.

use crate::decode::{Bitmap, Orientation};

/// Return a new bitmap with `orientation` applied, ready for display.
///
/// The input is never modified; `Orientation::Normal` returns a copy.
pub fn apply_orientation(bitmap: &Bitmap, orientation: Orientation) -> Bitmap {
    if orientation == Orientation::Normal || bitmap.is_empty() {
        return bitmap.clone();
    }

    let (src_w, src_h) = (bitmap.width as i64, bitmap.height as i64);
    let (dst_w, dst_h) = orientation.oriented_dimensions(bitmap.width, bitmap.height);
    let turns = orientation.quarter_turns_cw();
    let mirrored = orientation.is_mirrored();

    let mut out = vec![0u8; dst_w as usize * dst_h as usize * 3];
    let (dw, dh) = (dst_w as i64, dst_h as i64);

    for dy in 0..dh {
        let qy = 2 * dy + 1 - dh;
        for dx in 0..dw {
            let qx = 2 * dx + 1 - dw;

            let (mut px, mut py) = (qx, qy);
            for _ in 0..turns {
                (px, py) = (py, -px);
            }
            if mirrored {
                px = -px;
            }

            let sx = (px + src_w - 1) / 2;
            let sy = (py + src_h - 1) / 2;

            let src = ((sy * src_w + sx) * 3) as usize;
            let dst = ((dy * dw + dx) * 3) as usize;
            out[dst..dst + 3].copy_from_slice(&bitmap.pixels[src..src + 3]);
        }
    }

    Bitmap::new(dst_w, dst_h, out)
}


// ============================================================================
// Property-Based Tests
// ============================================================================
