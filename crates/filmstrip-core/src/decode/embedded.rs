//! JPEG images declared by RAW container structures.
//!
//! Most RAW formats are TIFF-based and point at their embedded previews from
//! IFD entries: `JpegInterchangeFormat`/`Length` or JPEG-compressed strips in
//! IFD0, the SubIFDs and IFD1. Fujifilm RAF files instead carry a fixed
//! header with the preview offset and length.
//!
//! Only structure is read here; nothing is decoded until a caller asks for
//! a bitmap via [`decode_largest`].

use std::collections::HashSet;
use std::io::{Cursor, Read, Seek, SeekFrom};

use tracing::debug;

use super::container::{decode_bytes, OrientationPolicy};
use super::markers::{extract_slice, is_jpeg_data, jpeg_dimensions};
use super::resize::resize_to_fit;
use super::{Bitmap, FilterType};
use crate::error::{PipelineError, Result};

// TIFF byte-order marks
const TIFF_LE: [u8; 2] = [0x49, 0x49]; // II
const TIFF_BE: [u8; 2] = [0x4D, 0x4D]; // MM

// Magic numbers following the byte-order mark: TIFF, Olympus ORF, Panasonic RW2
const TIFF_MAGICS: [u16; 4] = [0x002A, 0x4F52, 0x5352, 0x0055];

// TIFF tag IDs
const TAG_COMPRESSION: u16 = 0x0103;
const TAG_STRIP_OFFSETS: u16 = 0x0111;
const TAG_STRIP_BYTE_COUNTS: u16 = 0x0117;
const TAG_SUBIFD: u16 = 0x014A;
const TAG_JPEG_OFFSET: u16 = 0x0201; // JpegInterchangeFormat
const TAG_JPEG_LENGTH: u16 = 0x0202; // JpegInterchangeFormatLength

// JPEG compression types
const COMPRESSION_JPEG: u32 = 6;
const COMPRESSION_JPEG_OLD: u32 = 7;

// Fujifilm RAF header
const RAF_MAGIC: &[u8] = b"FUJIFILMCCD-RAW";
const RAF_JPEG_OFFSET_POS: usize = 0x54;
const RAF_JPEG_LENGTH_POS: usize = 0x58;

const MAX_IFD_ENTRIES: u16 = 1000;
const MAX_IFDS: usize = 16;
const MAX_SUBIFD_DEPTH: usize = 2;

/// Location of a JPEG stream inside a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbeddedJpeg {
    pub offset: usize,
    pub length: usize,
    /// Frame dimensions from the JPEG header, when readable.
    pub dimensions: Option<(u32, u32)>,
}

impl EmbeddedJpeg {
    fn pixel_count(&self) -> u64 {
        self.dimensions
            .map(|(w, h)| w as u64 * h as u64)
            .unwrap_or(0)
    }

    /// The JPEG bytes within `container`.
    pub fn slice<'a>(&self, container: &'a [u8]) -> &'a [u8] {
        &container[self.offset..self.offset + self.length]
    }
}

/// Check if a byte slice looks like a TIFF-based RAW container.
pub fn is_tiff_container(bytes: &[u8]) -> bool {
    tiff_byte_order(bytes).is_some()
}

/// Check if a byte slice is a Fujifilm RAF container.
pub fn is_raf_container(bytes: &[u8]) -> bool {
    bytes.starts_with(RAF_MAGIC)
}

/// All JPEG streams the container declares, largest first.
///
/// Largest is by pixel count from the frame header, then by byte length.
pub fn find_embedded_jpegs(bytes: &[u8]) -> Vec<EmbeddedJpeg> {
    let mut found = Vec::new();

    if is_raf_container(bytes) {
        if let Some(jpeg) = raf_preview(bytes) {
            found.push(jpeg);
        }
    } else if let Some(little_endian) = tiff_byte_order(bytes) {
        if let Err(e) = collect_tiff_jpegs(bytes, little_endian, &mut found) {
            debug!(error = %e, "TIFF structure walk stopped early");
        }
    }

    found.sort_by(|a, b| {
        b.pixel_count()
            .cmp(&a.pixel_count())
            .then(b.length.cmp(&a.length))
    });
    found.dedup_by_key(|j| j.offset);
    found
}

/// Decode the largest declared JPEG that decodes, capped to `max_edge`.
///
/// Embedded JPEGs usually carry no orientation of their own, so the
/// caller supplies it through `policy`.
pub fn decode_largest(bytes: &[u8], max_edge: u32, policy: OrientationPolicy) -> Result<Bitmap> {
    let candidates = find_embedded_jpegs(bytes);
    if candidates.is_empty() {
        return Err(PipelineError::DecodeFailed(
            "No embedded JPEG declared".to_string(),
        ));
    }

    let mut last_error = None;
    for candidate in candidates {
        match decode_bytes(candidate.slice(bytes), policy) {
            Ok(bitmap) => return resize_to_fit(&bitmap, max_edge, FilterType::Bilinear),
            Err(e) => {
                debug!(offset = candidate.offset, error = %e, "Embedded JPEG did not decode");
                last_error = Some(e);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| PipelineError::DecodeFailed("No embedded JPEG".into())))
}

fn tiff_byte_order(bytes: &[u8]) -> Option<bool> {
    if bytes.len() < 8 {
        return None;
    }
    let little_endian = match [bytes[0], bytes[1]] {
        TIFF_LE => true,
        TIFF_BE => false,
        _ => return None,
    };
    let magic = if little_endian {
        u16::from_le_bytes([bytes[2], bytes[3]])
    } else {
        u16::from_be_bytes([bytes[2], bytes[3]])
    };
    TIFF_MAGICS.contains(&magic).then_some(little_endian)
}

fn raf_preview(bytes: &[u8]) -> Option<EmbeddedJpeg> {
    let read = |pos: usize| -> Option<usize> {
        let b = extract_slice(bytes, pos, 4)?;
        Some(u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as usize)
    };
    let offset = read(RAF_JPEG_OFFSET_POS)?;
    let length = read(RAF_JPEG_LENGTH_POS)?;
    candidate(bytes, offset, length)
}

fn candidate(bytes: &[u8], offset: usize, length: usize) -> Option<EmbeddedJpeg> {
    let data = extract_slice(bytes, offset, length)?;
    if !is_jpeg_data(data) {
        return None;
    }
    Some(EmbeddedJpeg {
        offset,
        length,
        dimensions: jpeg_dimensions(data),
    })
}

// IFD entry structure
struct IfdEntry {
    tag: u16,
    count: u32,
    value_offset: u32,
}

fn collect_tiff_jpegs(
    bytes: &[u8],
    little_endian: bool,
    found: &mut Vec<EmbeddedJpeg>,
) -> Result<()> {
    let mut cursor = Cursor::new(bytes);
    cursor
        .seek(SeekFrom::Start(4))
        .map_err(|e| corrupted("header", e))?;
    let mut next = read_u32(&mut cursor, little_endian)?;

    let mut visited = HashSet::new();
    // IFD0 -> IFD1 -> ... chain, each with its SubIFD tree
    while next != 0 && visited.len() < MAX_IFDS && visited.insert(next) {
        let (entries, following) = parse_ifd_at(&mut cursor, next, little_endian, bytes.len())?;
        collect_from_entries(&entries, bytes, found);
        walk_subifds(&mut cursor, &entries, bytes, little_endian, 1, &mut visited, found);
        next = following;
    }
    Ok(())
}

fn walk_subifds(
    cursor: &mut Cursor<&[u8]>,
    entries: &[IfdEntry],
    bytes: &[u8],
    little_endian: bool,
    depth: usize,
    visited: &mut HashSet<u32>,
    found: &mut Vec<EmbeddedJpeg>,
) {
    if depth > MAX_SUBIFD_DEPTH {
        return;
    }
    for offset in subifd_offsets(cursor, entries, little_endian) {
        if visited.len() >= MAX_IFDS || !visited.insert(offset) {
            continue;
        }
        match parse_ifd_at(cursor, offset, little_endian, bytes.len()) {
            Ok((sub_entries, _)) => {
                collect_from_entries(&sub_entries, bytes, found);
                walk_subifds(cursor, &sub_entries, bytes, little_endian, depth + 1, visited, found);
            }
            Err(e) => debug!(offset, error = %e, "Skipping unreadable SubIFD"),
        }
    }
}

/// SubIFD pointers: inline when there is one, an array of offsets otherwise.
fn subifd_offsets(cursor: &mut Cursor<&[u8]>, entries: &[IfdEntry], little_endian: bool) -> Vec<u32> {
    let mut offsets = Vec::new();
    for entry in entries.iter().filter(|e| e.tag == TAG_SUBIFD && e.count > 0) {
        if entry.count == 1 {
            offsets.push(entry.value_offset);
            continue;
        }
        if cursor
            .seek(SeekFrom::Start(entry.value_offset as u64))
            .is_err()
        {
            continue;
        }
        for _ in 0..entry.count.min(MAX_IFDS as u32) {
            match read_u32(cursor, little_endian) {
                Ok(offset) => offsets.push(offset),
                Err(_) => break,
            }
        }
    }
    offsets
}

fn collect_from_entries(entries: &[IfdEntry], bytes: &[u8], found: &mut Vec<EmbeddedJpeg>) {
    let value = |tag: u16| entries.iter().find(|e| e.tag == tag).map(|e| e.value_offset);

    // JPEG interchange format (most common for thumbnails)
    if let (Some(offset), Some(length)) = (value(TAG_JPEG_OFFSET), value(TAG_JPEG_LENGTH)) {
        if let Some(jpeg) = candidate(bytes, offset as usize, length as usize) {
            found.push(jpeg);
        }
    }

    // Single-strip JPEG (Nikon and others)
    let strip_jpeg = value(TAG_COMPRESSION)
        .map(|c| c == COMPRESSION_JPEG || c == COMPRESSION_JPEG_OLD)
        .unwrap_or(false);
    let single_strip = entries
        .iter()
        .find(|e| e.tag == TAG_STRIP_OFFSETS)
        .map(|e| e.count == 1)
        .unwrap_or(false);
    if strip_jpeg && single_strip {
        if let (Some(offset), Some(length)) = (value(TAG_STRIP_OFFSETS), value(TAG_STRIP_BYTE_COUNTS))
        {
            if let Some(jpeg) = candidate(bytes, offset as usize, length as usize) {
                found.push(jpeg);
            }
        }
    }
}

fn parse_ifd_at(
    cursor: &mut Cursor<&[u8]>,
    offset: u32,
    little_endian: bool,
    file_size: usize,
) -> Result<(Vec<IfdEntry>, u32)> {
    if offset as usize >= file_size {
        return Err(PipelineError::DecodeFailed(format!(
            "IFD offset {} past end of file",
            offset
        )));
    }
    cursor
        .seek(SeekFrom::Start(offset as u64))
        .map_err(|e| corrupted("IFD", e))?;
    parse_ifd(cursor, little_endian, file_size)
}

fn parse_ifd<R: Read + Seek>(
    reader: &mut R,
    little_endian: bool,
    file_size: usize,
) -> Result<(Vec<IfdEntry>, u32)> {
    let entry_count = read_u16(reader, little_endian)?;

    if entry_count > MAX_IFD_ENTRIES {
        return Err(PipelineError::DecodeFailed(
            "Too many IFD entries".to_string(),
        ));
    }

    let mut entries = Vec::with_capacity(entry_count as usize);

    for _ in 0..entry_count {
        let tag = read_u16(reader, little_endian)?;
        let typ = read_u16(reader, little_endian)?;
        let count = read_u32(reader, little_endian)?;
        let raw = read_u32(reader, little_endian)?;

        // SHORT values are stored in the first two bytes of the value field
        let value_offset = if typ == 3 && count == 1 {
            if little_endian {
                raw & 0xFFFF
            } else {
                raw >> 16
            }
        } else {
            raw
        };

        // Offsets past the end of the file cannot point at anything useful
        if value_offset as usize > file_size && tag != TAG_JPEG_LENGTH {
            continue;
        }

        entries.push(IfdEntry {
            tag,
            count,
            value_offset,
        });
    }

    let next_ifd = read_u32(reader, little_endian).unwrap_or(0);

    Ok((entries, next_ifd))
}

fn read_u16<R: Read>(reader: &mut R, little_endian: bool) -> Result<u16> {
    let mut buf = [0u8; 2];
    reader
        .read_exact(&mut buf)
        .map_err(|e| corrupted("u16", e))?;
    Ok(if little_endian {
        u16::from_le_bytes(buf)
    } else {
        u16::from_be_bytes(buf)
    })
}

fn read_u32<R: Read>(reader: &mut R, little_endian: bool) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader
        .read_exact(&mut buf)
        .map_err(|e| corrupted("u32", e))?;
    Ok(if little_endian {
        u32::from_le_bytes(buf)
    } else {
        u32::from_be_bytes(buf)
    })
}

fn corrupted(what: &str, e: std::io::Error) -> PipelineError {
    PipelineError::DecodeFailed(format!("Failed to read {}: {}", what, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::encode_jpeg;

    fn jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = Bitmap::filled(width, height, [90, 120, 200]);
        encode_jpeg(&img, 80).unwrap()
    }

    // Helper function to create an IFD entry in little-endian format
    fn ifd_entry_le(tag: u16, typ: u16, count: u32, value: u32) -> Vec<u8> {
        let mut entry = Vec::new();
        entry.extend_from_slice(&tag.to_le_bytes());
        entry.extend_from_slice(&typ.to_le_bytes());
        entry.extend_from_slice(&count.to_le_bytes());
        entry.extend_from_slice(&value.to_le_bytes());
        entry
    }

    fn write_ifd(file: &mut [u8], at: usize, entries: &[Vec<u8>], next: u32) {
        file[at..at + 2].copy_from_slice(&(entries.len() as u16).to_le_bytes());
        let mut pos = at + 2;
        for entry in entries {
            file[pos..pos + 12].copy_from_slice(entry);
            pos += 12;
        }
        file[pos..pos + 4].copy_from_slice(&next.to_le_bytes());
    }

    /// TIFF with a small thumbnail in IFD0 and a larger preview in a SubIFD.
    fn tiff_with_two_previews(small: &[u8], large: &[u8]) -> Vec<u8> {
        let small_at = 512usize;
        let large_at = small_at + small.len() + 16;
        let mut file = vec![0u8; large_at + large.len() + 16];
        file[..4].copy_from_slice(&[0x49, 0x49, 0x2A, 0x00]);
        file[4..8].copy_from_slice(&8u32.to_le_bytes());

        write_ifd(
            &mut file,
            8,
            &[
                ifd_entry_le(TAG_SUBIFD, 4, 1, 200),
                ifd_entry_le(TAG_JPEG_OFFSET, 4, 1, small_at as u32),
                ifd_entry_le(TAG_JPEG_LENGTH, 4, 1, small.len() as u32),
            ],
            0,
        );
        write_ifd(
            &mut file,
            200,
            &[
                ifd_entry_le(TAG_COMPRESSION, 3, 1, COMPRESSION_JPEG),
                ifd_entry_le(TAG_STRIP_OFFSETS, 4, 1, large_at as u32),
                ifd_entry_le(TAG_STRIP_BYTE_COUNTS, 4, 1, large.len() as u32),
            ],
            0,
        );
        file[small_at..small_at + small.len()].copy_from_slice(small);
        file[large_at..large_at + large.len()].copy_from_slice(large);
        file
    }

    #[test]
    fn test_is_tiff_container() {
        assert!(is_tiff_container(&[0x49, 0x49, 0x2A, 0x00, 0x08, 0x00, 0x00, 0x00]));
        assert!(is_tiff_container(&[0x4D, 0x4D, 0x00, 0x2A, 0x00, 0x00, 0x00, 0x08]));
        // Olympus ORF
        assert!(is_tiff_container(&[0x49, 0x49, 0x52, 0x4F, 0x08, 0x00, 0x00, 0x00]));
        assert!(!is_tiff_container(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46]));
        assert!(!is_tiff_container(&[0x49, 0x49]));
        assert!(!is_tiff_container(&[]));
    }

    #[test]
    fn test_finds_ifd0_and_subifd_previews_largest_first() {
        let small = jpeg(16, 12);
        let large = jpeg(64, 48);
        let file = tiff_with_two_previews(&small, &large);

        let found = find_embedded_jpegs(&file);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].dimensions, Some((64, 48)));
        assert_eq!(found[1].dimensions, Some((16, 12)));
        assert_eq!(found[0].slice(&file), &large[..]);
    }

    #[test]
    fn test_decode_largest_caps_size() {
        let file = tiff_with_two_previews(&jpeg(16, 12), &jpeg(64, 48));
        let bitmap = decode_largest(&file, 32, OrientationPolicy::Ignore).unwrap();
        assert_eq!((bitmap.width, bitmap.height), (32, 24));
    }

    #[test]
    fn test_ifd1_thumbnail_found() {
        let thumb = jpeg(8, 8);
        let mut file = vec![0u8; 400 + thumb.len()];
        file[..4].copy_from_slice(&[0x49, 0x49, 0x2A, 0x00]);
        file[4..8].copy_from_slice(&8u32.to_le_bytes());
        write_ifd(&mut file, 8, &[], 100);
        write_ifd(
            &mut file,
            100,
            &[
                ifd_entry_le(TAG_JPEG_OFFSET, 4, 1, 400),
                ifd_entry_le(TAG_JPEG_LENGTH, 4, 1, thumb.len() as u32),
            ],
            0,
        );
        file[400..].copy_from_slice(&thumb);

        let found = find_embedded_jpegs(&file);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].offset, 400);
    }

    #[test]
    fn test_raf_header_preview() {
        let preview = jpeg(40, 30);
        let mut file = vec![0u8; 256 + preview.len()];
        file[..RAF_MAGIC.len()].copy_from_slice(RAF_MAGIC);
        file[RAF_JPEG_OFFSET_POS..RAF_JPEG_OFFSET_POS + 4].copy_from_slice(&256u32.to_be_bytes());
        file[RAF_JPEG_LENGTH_POS..RAF_JPEG_LENGTH_POS + 4]
            .copy_from_slice(&(preview.len() as u32).to_be_bytes());
        file[256..].copy_from_slice(&preview);

        assert!(is_raf_container(&file));
        let found = find_embedded_jpegs(&file);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].dimensions, Some((40, 30)));
    }

    #[test]
    fn test_no_jpeg_in_empty_tiff() {
        let mut file = vec![0u8; 32];
        file[..4].copy_from_slice(&[0x49, 0x49, 0x2A, 0x00]);
        file[4..8].copy_from_slice(&8u32.to_le_bytes());
        write_ifd(&mut file, 8, &[], 0);

        assert!(find_embedded_jpegs(&file).is_empty());
        assert!(decode_largest(&file, 100, OrientationPolicy::Ignore).is_err());
    }

    #[test]
    fn test_ifd_offset_past_eof() {
        let mut file = vec![0x49, 0x49, 0x2A, 0x00];
        file.extend_from_slice(&1000u32.to_le_bytes());
        assert!(find_embedded_jpegs(&file).is_empty());
    }

    #[test]
    fn test_ifd_loop_terminates() {
        let mut file = vec![0u8; 64];
        file[..4].copy_from_slice(&[0x49, 0x49, 0x2A, 0x00]);
        file[4..8].copy_from_slice(&8u32.to_le_bytes());
        // IFD0 points back at itself
        write_ifd(&mut file, 8, &[], 8);
        assert!(find_embedded_jpegs(&file).is_empty());
    }

    #[test]
    fn test_declared_non_jpeg_is_ignored() {
        let mut file = vec![0u8; 300];
        file[..4].copy_from_slice(&[0x49, 0x49, 0x2A, 0x00]);
        file[4..8].copy_from_slice(&8u32.to_le_bytes());
        write_ifd(
            &mut file,
            8,
            &[
                ifd_entry_le(TAG_JPEG_OFFSET, 4, 1, 100),
                ifd_entry_le(TAG_JPEG_LENGTH, 4, 1, 50),
            ],
            0,
        );
        assert!(find_embedded_jpegs(&file).is_empty());
    }

    #[test]
    fn test_read_u16_u32_endianness() {
        let mut cursor = Cursor::new(&[0x34, 0x12][..]);
        assert_eq!(read_u16(&mut cursor, true).unwrap(), 0x1234);
        let mut cursor = Cursor::new(&[0x12, 0x34, 0x56, 0x78][..]);
        assert_eq!(read_u32(&mut cursor, false).unwrap(), 0x12345678);
    }
}
