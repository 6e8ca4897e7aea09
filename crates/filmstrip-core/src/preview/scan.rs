//! Byte-scan fallback for embedded JPEGs.
//!
//! Used when the tool is unavailable or finds nothing. The whole file is
//! searched for start-of-image markers followed by a segment a real
//! stream can open with; each one is delimited by a structural marker walk,
//! falling back to the first end-of-image marker inside the search window.
//! Only the largest [`MAX_SCAN_CANDIDATES`] blocks are returned.

use std::ops::Range;

use crate::decode::{find_jpeg_end, JPEG_SOI};

const EOI: [u8; 2] = [0xFF, 0xD9];

/// Blocks handed to the decoder at most, per file.
pub const MAX_SCAN_CANDIDATES: usize = 8;

/// Candidate JPEG blocks in `bytes`, largest first.
pub fn find_jpeg_blocks(bytes: &[u8], window: usize) -> Vec<Range<usize>> {
    let mut blocks = Vec::new();
    let mut pos = 0;

    while let Some(start) = find(bytes, pos, &JPEG_SOI) {
        if !opens_stream(bytes, start) {
            pos = start + JPEG_SOI.len();
            continue;
        }
        match find_jpeg_end(bytes, start, window) {
            Some(end) => {
                blocks.push(start..end);
                // Nested thumbnails sit inside the block just found
                pos = end;
            }
            None => {
                if let Some(end) = naive_end(bytes, start, window) {
                    blocks.push(start..end);
                }
                pos = start + JPEG_SOI.len();
            }
        }
    }

    blocks.sort_by(|a, b| b.len().cmp(&a.len()).then(a.start.cmp(&b.start)));
    blocks.truncate(MAX_SCAN_CANDIDATES);
    blocks
}

/// Whether the marker after the SOI at `start` can begin a JPEG stream:
/// APPn, DQT, DHT, DRI, SOFn or COM.
fn opens_stream(bytes: &[u8], start: usize) -> bool {
    matches!(
        bytes.get(start + JPEG_SOI.len()),
        Some(0xE0..=0xEF | 0xDB | 0xC4 | 0xDD | 0xFE | 0xC0..=0xC3 | 0xC5..=0xC7 | 0xC9..=0xCB | 0xCD..=0xCF)
    )
}

/// End of the first end-of-image marker within `window` bytes of `start`.
fn naive_end(bytes: &[u8], start: usize, window: usize) -> Option<usize> {
    let limit = start.saturating_add(window).min(bytes.len());
    find(&bytes[..limit], start + JPEG_SOI.len(), &EOI).map(|at| at + EOI.len())
}

fn find(haystack: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    if from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| from + i)
}
