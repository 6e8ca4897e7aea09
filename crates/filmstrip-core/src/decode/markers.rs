//! JPEG marker walking over raw byte slices.
//!
//! Used to size and delimit JPEG streams embedded in RAW containers without
//! decoding them. The walk follows segment lengths, so thumbnails nested in
//! APP segments (EXIF IFD1, MPF) do not terminate the outer stream early.

/// Start-of-image marker followed by the first byte of the next marker.
pub const JPEG_SOI: [u8; 3] = [0xFF, 0xD8, 0xFF];

const MARKER_EOI: u8 = 0xD9;
const MARKER_SOS: u8 = 0xDA;
const MARKER_TEM: u8 = 0x01;

/// Whether `data` begins with a JPEG start-of-image marker.
#[inline]
pub fn is_jpeg_data(data: &[u8]) -> bool {
    data.len() >= 3 && data[..3] == JPEG_SOI
}

/// Safely extract a slice if `offset + length` is within bounds and length is non-zero.
#[inline]
pub fn extract_slice(bytes: &[u8], offset: usize, length: usize) -> Option<&[u8]> {
    if length == 0 || offset.checked_add(length)? > bytes.len() {
        return None;
    }
    Some(&bytes[offset..offset + length])
}

/// Frame dimensions `(width, height)` from the first SOFn segment.
pub fn jpeg_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    if !is_jpeg_data(data) {
        return None;
    }
    let mut pos = 2;
    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            return None;
        }
        let marker = data[pos + 1];
        if marker == 0xFF {
            pos += 1;
            continue;
        }
        if marker == MARKER_EOI || marker == MARKER_SOS {
            return None;
        }
        if is_standalone(marker) {
            pos += 2;
            continue;
        }
        let len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        if is_frame_header(marker) && pos + 9 <= data.len() {
            let height = u16::from_be_bytes([data[pos + 5], data[pos + 6]]) as u32;
            let width = u16::from_be_bytes([data[pos + 7], data[pos + 8]]) as u32;
            if width == 0 || height == 0 {
                return None;
            }
            return Some((width, height));
        }
        pos += 2 + len;
    }
    None
}

/// Exclusive end offset of the JPEG stream that starts at `start`.
///
/// Walks marker segments and entropy-coded data; gives up after `window`
/// bytes. Returns `None` when no end-of-image marker is reached.
pub fn find_jpeg_end(bytes: &[u8], start: usize, window: usize) -> Option<usize> {
    let limit = start.saturating_add(window).min(bytes.len());
    if start >= limit || !is_jpeg_data(&bytes[start..limit]) {
        return None;
    }

    let mut pos = start + 2;
    loop {
        if pos + 2 > limit || bytes[pos] != 0xFF {
            return None;
        }
        let marker = bytes[pos + 1];
        if marker == 0xFF {
            pos += 1;
            continue;
        }
        if marker == MARKER_EOI {
            return Some(pos + 2);
        }
        if is_standalone(marker) {
            pos += 2;
            continue;
        }
        if pos + 4 > limit {
            return None;
        }
        let len = u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]) as usize;
        if len < 2 {
            return None;
        }
        pos += 2 + len;

        if marker == MARKER_SOS {
            pos = skip_entropy_coded(bytes, pos, limit)?;
        }
    }
}

/// Advance past entropy-coded data to the next real marker.
fn skip_entropy_coded(bytes: &[u8], mut pos: usize, limit: usize) -> Option<usize> {
    while pos + 1 < limit {
        if bytes[pos] == 0xFF {
            let next = bytes[pos + 1];
            // Stuffed zero bytes and restart markers belong to the scan
            if next == 0x00 || (0xD0..=0xD7).contains(&next) || next == 0xFF {
                pos += if next == 0xFF { 1 } else { 2 };
                continue;
            }
            return Some(pos);
        }
        pos += 1;
    }
    None
}

#[inline]
fn is_standalone(marker: u8) -> bool {
    marker == MARKER_TEM || (0xD0..=0xD7).contains(&marker)
}

#[inline]
fn is_frame_header(marker: u8) -> bool {
    (0xC0..=0xCF).contains(&marker) && !matches!(marker, 0xC4 | 0xC8 | 0xCC)
}
