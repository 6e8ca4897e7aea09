//! Decode steps used by the thumbnail pipeline.

use std::sync::Arc;

use crate::cancel::CancellationToken;
use crate::config::DecodeConfig;
use crate::decode::{
    decode_file, decode_largest, is_raf_container, is_tiff_container, load_by_extension,
    map_file, read_file_orientation, Bitmap, Orientation, OrientationPolicy, RawDecoder,
};
use crate::error::{PipelineError, Result};
use crate::identity::FileIdentity;
use crate::preview::{PreviewExtractor, PreviewKind};

use super::TargetSize;

/// The individual steps [`ThumbnailPipeline`](super::ThumbnailPipeline)
/// chains together. Every step returns a display-oriented bitmap.
///
/// When `orientation` is given it is applied as is; otherwise each step
/// detects orientation itself.
pub trait ThumbnailSource: Send + Sync {
    /// The thumbnail a RAW container declares, decoded no larger than `target`.
    fn container_thumbnail(
        &self,
        identity: &FileIdentity,
        target: TargetSize,
        orientation: Option<Orientation>,
    ) -> Result<Bitmap>;

    /// The largest embedded preview at full size.
    fn large_preview(&self, identity: &FileIdentity, orientation: Option<Orientation>) -> Result<Bitmap>;

    /// Content-sniffed decode of a standard image, shrunk toward `target`.
    fn downsampled(
        &self,
        identity: &FileIdentity,
        target: TargetSize,
        orientation: Option<Orientation>,
    ) -> Result<Bitmap>;

    /// Extension-driven full load.
    fn whole_file(&self, identity: &FileIdentity) -> Result<Bitmap>;

    /// The smallest embedded preview.
    fn small_preview(&self, identity: &FileIdentity) -> Result<Bitmap>;

    /// The complete decode chain.
    fn full_decode(&self, identity: &FileIdentity, token: &CancellationToken) -> Result<Bitmap>;
}

fn policy(orientation: Option<Orientation>) -> OrientationPolicy {
    orientation.map_or(OrientationPolicy::Detect, OrientationPolicy::Fixed)
}

/// [`ThumbnailSource`] over the real decoders.
pub struct StandardSources {
    previews: Arc<PreviewExtractor>,
    decoder: Arc<RawDecoder>,
    thumbnail_cap: u32,
}

impl StandardSources {
    pub fn new(previews: Arc<PreviewExtractor>, decoder: Arc<RawDecoder>, config: &DecodeConfig) -> Self {
        Self {
            previews,
            decoder,
            thumbnail_cap: config.container_thumbnail_cap.max(1),
        }
    }
}

impl ThumbnailSource for StandardSources {
    fn container_thumbnail(
        &self,
        identity: &FileIdentity,
        target: TargetSize,
        orientation: Option<Orientation>,
    ) -> Result<Bitmap> {
        let map = map_file(identity.path())?;
        if !is_tiff_container(&map) && !is_raf_container(&map) {
            return Err(PipelineError::UnsupportedFormat {
                path: identity.path().to_path_buf(),
            });
        }

        // Embedded JPEGs rarely carry their own orientation; use the container's
        let policy = match orientation {
            Some(o) => OrientationPolicy::Fixed(o),
            None => read_file_orientation(identity.path())
                .map_or(OrientationPolicy::Ignore, OrientationPolicy::Fixed),
        };
        let max_edge = target.long_edge().min(self.thumbnail_cap);
        decode_largest(&map, max_edge, policy)
    }

    fn large_preview(&self, identity: &FileIdentity, orientation: Option<Orientation>) -> Result<Bitmap> {
        match orientation {
            Some(o) => self.previews.extract_oriented(identity, PreviewKind::Preview, o),
            None => self.previews.extract_preview(identity),
        }
    }

    fn downsampled(
        &self,
        identity: &FileIdentity,
        target: TargetSize,
        orientation: Option<Orientation>,
    ) -> Result<Bitmap> {
        decode_file(identity.path(), Some(target.long_edge()), policy(orientation))
    }

    fn whole_file(&self, identity: &FileIdentity) -> Result<Bitmap> {
        load_by_extension(identity.path(), OrientationPolicy::Detect)
    }

    fn small_preview(&self, identity: &FileIdentity) -> Result<Bitmap> {
        self.previews.extract_thumbnail(identity)
    }

    fn full_decode(&self, identity: &FileIdentity, token: &CancellationToken) -> Result<Bitmap> {
        self.decoder.decode(identity, token)
    }
}
