//! The ordered decode chain.
//!
//! Each [`DecodeStrategy`] reports `Decoded`, `NotApplicable` or `Failed`;
//! the first decoded bitmap wins. Strategy failures are expected and only
//! logged. [`RawDecoder`] does no caching.

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use super::container::{decode_file, load_by_extension, read_file_orientation, OrientationPolicy};
use super::demosaic::decode_sensor;
use super::embedded::{decode_largest, is_raf_container, is_tiff_container};
use super::{map_file, Bitmap, DecodeAttempt};
use crate::cancel::CancellationToken;
use crate::config::DecodeConfig;
use crate::error::{PipelineError, Result};
use crate::identity::FileIdentity;
use crate::preview::PreviewExtractor;

/// One way of turning a file into a display-oriented bitmap.
pub trait DecodeStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn attempt(&self, identity: &FileIdentity) -> DecodeAttempt;
}

fn attempt_from(result: Result<Bitmap>) -> DecodeAttempt {
    match result {
        Ok(bitmap) => DecodeAttempt::Decoded(bitmap),
        Err(e) => DecodeAttempt::Failed(e.to_string()),
    }
}

/// Sensor data through rawloader, RAW extensions only.
struct SensorStrategy {
    max_dimension: u32,
}

impl DecodeStrategy for SensorStrategy {
    fn name(&self) -> &'static str {
        "sensor"
    }

    fn attempt(&self, identity: &FileIdentity) -> DecodeAttempt {
        if !identity.is_raw() {
            return DecodeAttempt::NotApplicable;
        }
        attempt_from(decode_sensor(identity.path(), self.max_dimension))
    }
}

/// Content-sniffed standard containers.
struct ContainerStrategy;

impl DecodeStrategy for ContainerStrategy {
    fn name(&self) -> &'static str {
        "container"
    }

    fn attempt(&self, identity: &FileIdentity) -> DecodeAttempt {
        attempt_from(decode_file(identity.path(), None, OrientationPolicy::Detect))
    }
}

/// JPEGs declared by TIFF IFDs or the RAF header.
struct EmbeddedThumbnailStrategy {
    cap: u32,
}

impl EmbeddedThumbnailStrategy {
    fn decode(&self, path: &Path) -> Result<Option<Bitmap>> {
        let map = map_file(path)?;
        if !is_tiff_container(&map) && !is_raf_container(&map) {
            return Ok(None);
        }
        let policy = read_file_orientation(path)
            .map(OrientationPolicy::Fixed)
            .unwrap_or(OrientationPolicy::Ignore);
        decode_largest(&map, self.cap, policy).map(Some)
    }
}

impl DecodeStrategy for EmbeddedThumbnailStrategy {
    fn name(&self) -> &'static str {
        "embedded-thumbnail"
    }

    fn attempt(&self, identity: &FileIdentity) -> DecodeAttempt {
        match self.decode(identity.path()) {
            Ok(Some(bitmap)) => DecodeAttempt::Decoded(bitmap),
            Ok(None) => DecodeAttempt::NotApplicable,
            Err(e) => DecodeAttempt::Failed(e.to_string()),
        }
    }
}

/// Extension-driven loader.
struct WholeFileStrategy;

impl DecodeStrategy for WholeFileStrategy {
    fn name(&self) -> &'static str {
        "whole-file"
    }

    fn attempt(&self, identity: &FileIdentity) -> DecodeAttempt {
        if image::ImageFormat::from_path(identity.path()).is_err() {
            return DecodeAttempt::NotApplicable;
        }
        attempt_from(load_by_extension(identity.path(), OrientationPolicy::Detect))
    }
}

/// The largest embedded preview.
struct PreviewStrategy {
    previews: Arc<PreviewExtractor>,
}

impl DecodeStrategy for PreviewStrategy {
    fn name(&self) -> &'static str {
        "preview"
    }

    fn attempt(&self, identity: &FileIdentity) -> DecodeAttempt {
        attempt_from(self.previews.extract_preview(identity))
    }
}

/// Decodes a displayable bitmap from a RAW or standard image file.
pub struct RawDecoder {
    strategies: Vec<Box<dyn DecodeStrategy>>,
}

impl RawDecoder {
    /// The standard chain: sensor, container, embedded thumbnail, whole file, preview.
    pub fn new(config: &DecodeConfig, previews: Arc<PreviewExtractor>) -> Self {
        Self::with_strategies(vec![
            Box::new(SensorStrategy {
                max_dimension: config.raw_max_dimension,
            }),
            Box::new(ContainerStrategy),
            Box::new(EmbeddedThumbnailStrategy {
                cap: config.container_thumbnail_cap,
            }),
            Box::new(WholeFileStrategy),
            Box::new(PreviewStrategy { previews }),
        ])
    }

    pub fn with_strategies(strategies: Vec<Box<dyn DecodeStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Run the chain until a strategy decodes.
    ///
    /// # Errors
    ///
    /// - `PipelineError::NotReadable` if the file is missing
    /// - `PipelineError::Cancelled` if `token` is cancelled between strategies
    /// - `PipelineError::UnsupportedFormat` if every strategy declines or fails
    pub fn decode(&self, identity: &FileIdentity, token: &CancellationToken) -> Result<Bitmap> {
        if !identity.exists() {
            return Err(PipelineError::not_readable(identity.path(), "file not found"));
        }

        for strategy in &self.strategies {
            token.check()?;
            match strategy.attempt(identity) {
                DecodeAttempt::Decoded(bitmap) if !bitmap.is_empty() => {
                    debug!(path = %identity, strategy = strategy.name(), width = bitmap.width, height = bitmap.height, "Decoded");
                    return Ok(bitmap);
                }
                DecodeAttempt::Decoded(_) => {
                    debug!(path = %identity, strategy = strategy.name(), "Strategy produced an empty bitmap");
                }
                DecodeAttempt::NotApplicable => {
                    debug!(path = %identity, strategy = strategy.name(), "Strategy not applicable");
                }
                DecodeAttempt::Failed(reason) => {
                    debug!(path = %identity, strategy = strategy.name(), %reason, "Strategy failed");
                }
            }
        }

        Err(PipelineError::UnsupportedFormat {
            path: identity.path().to_path_buf(),
        })
    }
}
