//! Geometric transforms for thumbnails.
//!
//! Currently limited to the eight EXIF orientations; every transform
//! allocates a new canvas rather than rewriting the source in place.

mod orientation;

pub use orientation::apply_orientation;
