//! Filmstrip Core - metadata and thumbnail pipeline
//!
//! This crate answers the two questions a media browser asks about every
//! file: what does its metadata say, and what does it look like. It
//! provides metadata extraction through exiftool with an embedded-EXIF
//! fallback, embedded preview extraction, RAW and standard image decoding,
//! and a two-tier thumbnail cache. [`Engine`] wires all of it together.

pub mod cache;
pub mod cancel;
pub mod catalog;
pub mod config;
pub mod decode;
pub mod encode;
pub mod engine;
pub mod error;
pub mod identity;
pub mod metadata;
pub mod pipeline;
pub mod preview;
pub mod tool;
pub mod transform;

pub use cache::{CacheKey, CacheLayer, CacheStats};
pub use cancel::CancellationToken;
pub use catalog::{Catalog, CatalogRecord, InMemoryCatalog, LabelUpdate};
pub use config::PipelineConfig;
pub use decode::{Bitmap, Orientation, RawDecoder};
pub use engine::Engine;
pub use error::{PipelineError, Result, SetupError};
pub use identity::FileIdentity;
pub use metadata::{ColorLabel, FlagStatus, MetadataExtractor, MetadataRecord};
pub use pipeline::{PrefetchSummary, TargetSize, ThumbnailPipeline};
pub use preview::PreviewExtractor;
pub use tool::{ExifTool, ToolRunner};
