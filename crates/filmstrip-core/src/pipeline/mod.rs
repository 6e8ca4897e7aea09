//! Cached thumbnail generation.
//!
//! [`ThumbnailPipeline::generate`] answers from the cache when it can and
//! otherwise walks a format-specific sequence of [`ThumbnailSource`] steps:
//!
//! - **RAW**: the container's own thumbnail, checked against the requested
//!   size; a thumbnail that is too small is replaced by the large embedded
//!   preview when that is actually larger. Falls back to the full decode
//!   chain.
//! - **Other formats**: downsampled decode, then a whole-file load, then the
//!   smallest embedded preview.
//!
//! Results are fitted into the target box and stored in the cache. A
//! cancelled run never writes to the cache.

mod prefetch;
mod sources;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub use prefetch::PrefetchSummary;
pub use sources::{StandardSources, ThumbnailSource};

use crate::cache::CacheLayer;
use crate::cancel::CancellationToken;
use crate::config::PipelineConfig;
use crate::decode::{fit_within, Bitmap, FilterType, Orientation};
use crate::error::{PipelineError, Result};
use crate::identity::FileIdentity;
use crate::metadata::{MetadataExtractor, MetadataRecord};

/// A bounding box for a thumbnail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetSize {
    pub width: u32,
    pub height: u32,
}

impl TargetSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn square(edge: u32) -> Self {
        Self::new(edge, edge)
    }

    pub fn long_edge(self) -> u32 {
        self.width.max(self.height)
    }
}

/// Produces and caches display-oriented thumbnails.
pub struct ThumbnailPipeline {
    source: Arc<dyn ThumbnailSource>,
    cache: Arc<CacheLayer>,
    metadata: Arc<MetadataExtractor>,
    quality_threshold: f32,
    yield_every: usize,
}

impl ThumbnailPipeline {
    pub fn new(
        source: Arc<dyn ThumbnailSource>,
        cache: Arc<CacheLayer>,
        metadata: Arc<MetadataExtractor>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            source,
            cache,
            metadata,
            quality_threshold: config.decode.quality_threshold.clamp(0.0, 1.0),
            yield_every: config.metadata.yield_every,
        }
    }

    pub fn cache(&self) -> &Arc<CacheLayer> {
        &self.cache
    }

    /// A thumbnail of `identity` fitted into `target`.
    ///
    /// `orientation` overrides detection; when absent, an orientation set in
    /// the catalog is used before falling back to the file's own.
    ///
    /// # Errors
    ///
    /// - `PipelineError::Cancelled` if `token` is cancelled at any step
    /// - `PipelineError::NotReadable` if the file is missing
    /// - `PipelineError::UnsupportedFormat` if no step produced a bitmap
    pub fn generate(
        &self,
        identity: &FileIdentity,
        target: TargetSize,
        orientation: Option<Orientation>,
        token: &CancellationToken,
    ) -> Result<Arc<Bitmap>> {
        self.generate_tracked(identity, target, orientation, token)
            .map(|(bitmap, _)| bitmap)
    }

    /// Metadata first, then a thumbnail decoded with the catalog's manual
    /// rotation, or the metadata's orientation when the catalog has none.
    ///
    /// Either half may be absent when it cannot be produced; only a missing
    /// file or cancellation is an error.
    pub fn generate_with_metadata(
        &self,
        identity: &FileIdentity,
        target: TargetSize,
        token: &CancellationToken,
    ) -> Result<(Option<Arc<Bitmap>>, Option<MetadataRecord>)> {
        token.check()?;
        if !identity.exists() {
            return Err(PipelineError::not_readable(identity.path(), "file not found"));
        }

        let metadata = match self.metadata.get(identity) {
            Ok(record) => Some(record),
            Err(e) => {
                debug!(path = %identity, error = %e, "No metadata for thumbnail");
                None
            }
        };

        let orientation = self
            .metadata
            .catalog_orientation(identity)
            .or_else(|| metadata.as_ref().map(|record| record.orientation));
        let bitmap = match self.generate(identity, target, orientation, token) {
            Ok(bitmap) => Some(bitmap),
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                debug!(path = %identity, error = %e, "No thumbnail");
                None
            }
        };
        Ok((bitmap, metadata))
    }

    /// Like [`generate`](Self::generate), also reporting whether the cache answered.
    fn generate_tracked(
        &self,
        identity: &FileIdentity,
        target: TargetSize,
        orientation: Option<Orientation>,
        token: &CancellationToken,
    ) -> Result<(Arc<Bitmap>, bool)> {
        token.check()?;
        if target.width == 0 || target.height == 0 {
            return Err(PipelineError::DecodeFailed(format!(
                "Invalid target {}x{}",
                target.width, target.height
            )));
        }
        if !identity.exists() {
            return Err(PipelineError::not_readable(identity.path(), "file not found"));
        }

        let key = self.cache.key(identity, target.width, target.height);
        if let Some(hit) = self.cache.get(&key) {
            return Ok((hit, true));
        }

        let orientation = orientation.or_else(|| self.metadata.catalog_orientation(identity));
        let rendered = if identity.is_raw() {
            self.render_raw(identity, target, orientation, token)?
        } else {
            self.render_standard(identity, target, orientation, token)?
        };

        token.check()?;
        let fitted = fit_within(&rendered, target.width, target.height, FilterType::Bilinear)?;
        token.check()?;

        debug!(path = %identity, width = fitted.width, height = fitted.height, "Generated thumbnail");
        Ok((self.cache.put(key, fitted), false))
    }

    fn render_raw(
        &self,
        identity: &FileIdentity,
        target: TargetSize,
        orientation: Option<Orientation>,
        token: &CancellationToken,
    ) -> Result<Bitmap> {
        match self.source.container_thumbnail(identity, target, orientation) {
            Ok(primary) if !primary.is_empty() => {
                return self.ensure_quality(identity, target, orientation, primary, token);
            }
            Ok(_) => debug!(path = %identity, "Container thumbnail was empty"),
            Err(e) => debug!(path = %identity, error = %e, "No container thumbnail"),
        }

        token.check()?;
        self.source.full_decode(identity, token)
    }

    /// Swap a too-small primary for the large preview when that is bigger.
    fn ensure_quality(
        &self,
        identity: &FileIdentity,
        target: TargetSize,
        orientation: Option<Orientation>,
        primary: Bitmap,
        token: &CancellationToken,
    ) -> Result<Bitmap> {
        token.check()?;
        let wanted = target.long_edge() as f32 * self.quality_threshold;
        if primary.long_edge() as f32 >= wanted {
            return Ok(primary);
        }

        let chosen = match self.source.large_preview(identity, orientation) {
            Ok(preview) if preview.long_edge() > primary.long_edge() => {
                debug!(
                    path = %identity,
                    primary = primary.long_edge(),
                    preview = preview.long_edge(),
                    "Replaced small container thumbnail with preview"
                );
                preview
            }
            Ok(_) => {
                debug!(path = %identity, primary = primary.long_edge(), "Preview is no larger; keeping thumbnail");
                primary
            }
            Err(e) => {
                debug!(path = %identity, error = %e, "Preview fallback failed; keeping thumbnail");
                primary
            }
        };
        Ok(chosen)
    }

    fn render_standard(
        &self,
        identity: &FileIdentity,
        target: TargetSize,
        orientation: Option<Orientation>,
        token: &CancellationToken,
    ) -> Result<Bitmap> {
        token.check()?;
        match self.source.downsampled(identity, target, orientation) {
            Ok(bitmap) if !bitmap.is_empty() => return Ok(bitmap),
            Ok(_) => debug!(path = %identity, "Downsampled decode was empty"),
            Err(e) => debug!(path = %identity, error = %e, "Downsampled decode failed"),
        }

        token.check()?;
        match self.source.whole_file(identity) {
            Ok(bitmap) if !bitmap.is_empty() => return Ok(bitmap),
            Ok(_) => debug!(path = %identity, "Whole-file load was empty"),
            Err(e) => debug!(path = %identity, error = %e, "Whole-file load failed"),
        }

        token.check()?;
        match self.source.small_preview(identity) {
            Ok(bitmap) if !bitmap.is_empty() => Ok(bitmap),
            Ok(_) | Err(_) => Err(PipelineError::UnsupportedFormat {
                path: identity.path().to_path_buf(),
            }),
        }
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    /// Scripted [`ThumbnailSource`] that records every step it is asked for.
    ///
    /// Bitmaps are stored as landscape dimensions and returned rotated by the
    /// requested orientation. A step with no script fails.
    #[derive(Default)]
    pub struct FakeSource {
        pub steps: HashMap<&'static str, (u32, u32)>,
        pub calls: Mutex<Vec<(&'static str, Option<Orientation>)>>,
        /// Cancel this token when the named step runs.
        pub cancel_on: Option<(&'static str, CancellationToken)>,
    }

    impl FakeSource {
        pub fn with(mut self, step: &'static str, width: u32, height: u32) -> Self {
            self.steps.insert(step, (width, height));
            self
        }

        pub fn called(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().iter().map(|(step, _)| *step).collect()
        }

        fn answer(&self, step: &'static str, orientation: Option<Orientation>) -> Result<Bitmap> {
            self.calls.lock().unwrap().push((step, orientation));
            if let Some((name, token)) = &self.cancel_on {
                if *name == step {
                    token.cancel();
                }
            }
            let (width, height) = self
                .steps
                .get(step)
                .copied()
                .ok_or_else(|| PipelineError::DecodeFailed(format!("{step} not scripted")))?;
            let (width, height) = orientation.unwrap_or_default().oriented_dimensions(width, height);
            Ok(Bitmap::filled(width, height, [120, 130, 140]))
        }
    }

    impl ThumbnailSource for FakeSource {
        fn container_thumbnail(
            &self,
            _identity: &FileIdentity,
            _target: TargetSize,
            orientation: Option<Orientation>,
        ) -> Result<Bitmap> {
            self.answer("container_thumbnail", orientation)
        }

        fn large_preview(&self, _identity: &FileIdentity, orientation: Option<Orientation>) -> Result<Bitmap> {
            self.answer("large_preview", orientation)
        }

        fn downsampled(
            &self,
            _identity: &FileIdentity,
            _target: TargetSize,
            orientation: Option<Orientation>,
        ) -> Result<Bitmap> {
            self.answer("downsampled", orientation)
        }

        fn whole_file(&self, _identity: &FileIdentity) -> Result<Bitmap> {
            self.answer("whole_file", None)
        }

        fn small_preview(&self, _identity: &FileIdentity) -> Result<Bitmap> {
            self.answer("small_preview", None)
        }

        fn full_decode(&self, _identity: &FileIdentity, token: &CancellationToken) -> Result<Bitmap> {
            token.check()?;
            self.answer("full_decode", None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeSource;
    use super::*;
    use crate::catalog::{Catalog, CatalogRecord, InMemoryCatalog};
    use crate::config::MetadataConfig;
    use crate::tool::fake::FakeTool;

    fn metadata_with(catalog: Arc<dyn Catalog>) -> Arc<MetadataExtractor> {
        Arc::new(MetadataExtractor::standard(
            Arc::new(FakeTool::unavailable()),
            catalog,
            MetadataConfig::default(),
        ))
    }

    fn pipeline(source: FakeSource) -> (ThumbnailPipeline, Arc<FakeSource>) {
        let source = Arc::new(source);
        let pipeline = ThumbnailPipeline::new(
            source.clone(),
            Arc::new(CacheLayer::memory_only(64, 1 << 30, "test")),
            metadata_with(Arc::new(InMemoryCatalog::new())),
            &PipelineConfig::default(),
        );
        (pipeline, source)
    }

    fn touch(dir: &std::path::Path, name: &str) -> FileIdentity {
        let path = dir.join(name);
        std::fs::write(&path, b"bytes").unwrap();
        FileIdentity::new(path)
    }

    #[test]
    fn test_target_size() {
        assert_eq!(TargetSize::square(256), TargetSize::new(256, 256));
        assert_eq!(TargetSize::new(300, 200).long_edge(), 300);
    }

    #[test]
    fn test_raw_scenario_small_primary_uses_rotated_preview() {
        // IMG_0001.CR2: orientation 6, 500x800 primary, 4000x6000 preview
        let dir = tempfile::tempdir().unwrap();
        let identity = touch(dir.path(), "IMG_0001.CR2");
        let (pipeline, source) = pipeline(
            FakeSource::default()
                .with("container_thumbnail", 800, 500)
                .with("large_preview", 6000, 4000),
        );

        let bitmap = pipeline
            .generate(
                &identity,
                TargetSize::square(1024),
                Some(Orientation::Rotate90CW),
                &CancellationToken::new(),
            )
            .unwrap();

        assert_eq!((bitmap.width, bitmap.height), (683, 1024));
        assert_eq!(source.called(), vec!["container_thumbnail", "large_preview"]);
        let calls = source.calls.lock().unwrap();
        assert!(calls
            .iter()
            .all(|(_, o)| *o == Some(Orientation::Rotate90CW)));
    }

    #[test]
    fn test_quality_fallback_keeps_primary_when_preview_not_larger() {
        let dir = tempfile::tempdir().unwrap();
        let identity = touch(dir.path(), "a.nef");
        let (pipeline, source) = pipeline(
            FakeSource::default()
                .with("container_thumbnail", 600, 400)
                .with("large_preview", 600, 400),
        );

        let bitmap = pipeline
            .generate(&identity, TargetSize::square(1024), None, &CancellationToken::new())
            .unwrap();
        assert_eq!(bitmap.long_edge(), 600);
        assert_eq!(source.called(), vec!["container_thumbnail", "large_preview"]);
    }

    #[test]
    fn test_quality_fallback_reaches_threshold_with_larger_preview() {
        let dir = tempfile::tempdir().unwrap();
        let identity = touch(dir.path(), "a.arw");
        let (pipeline, _) = pipeline(
            FakeSource::default()
                .with("container_thumbnail", 600, 400)
                .with("large_preview", 3000, 2000),
        );

        let bitmap = pipeline
            .generate(&identity, TargetSize::square(1024), None, &CancellationToken::new())
            .unwrap();
        assert!(bitmap.long_edge() as f32 >= 0.9 * 1024.0);
        assert!(bitmap.long_edge() <= 1024);
    }

    #[test]
    fn test_adequate_primary_skips_preview() {
        let dir = tempfile::tempdir().unwrap();
        let identity = touch(dir.path(), "a.cr2");
        let (pipeline, source) = pipeline(
            FakeSource::default()
                .with("container_thumbnail", 1000, 700)
                .with("large_preview", 6000, 4000),
        );

        pipeline
            .generate(&identity, TargetSize::square(1024), None, &CancellationToken::new())
            .unwrap();
        assert_eq!(source.called(), vec!["container_thumbnail"]);
    }

    #[test]
    fn test_raw_without_container_thumbnail_uses_full_decode() {
        let dir = tempfile::tempdir().unwrap();
        let identity = touch(dir.path(), "a.dng");
        let (pipeline, source) = pipeline(FakeSource::default().with("full_decode", 2000, 1000));

        let bitmap = pipeline
            .generate(&identity, TargetSize::square(256), None, &CancellationToken::new())
            .unwrap();
        assert_eq!((bitmap.width, bitmap.height), (256, 128));
        assert_eq!(source.called(), vec!["container_thumbnail", "full_decode"]);
    }

    #[test]
    fn test_standard_chain_order() {
        let dir = tempfile::tempdir().unwrap();
        let identity = touch(dir.path(), "a.png");
        let (pipeline, source) = pipeline(FakeSource::default().with("small_preview", 100, 80));

        let bitmap = pipeline
            .generate(&identity, TargetSize::square(256), None, &CancellationToken::new())
            .unwrap();
        assert_eq!((bitmap.width, bitmap.height), (100, 80));
        assert_eq!(source.called(), vec!["downsampled", "whole_file", "small_preview"]);
    }

    #[test]
    fn test_exhausted_standard_chain_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let identity = touch(dir.path(), "a.png");
        let (pipeline, _) = pipeline(FakeSource::default());

        let result = pipeline.generate(&identity, TargetSize::square(256), None, &CancellationToken::new());
        assert!(matches!(result, Err(PipelineError::UnsupportedFormat { .. })));
    }

    #[test]
    fn test_generate_twice_is_identical_and_cached() {
        let dir = tempfile::tempdir().unwrap();
        let identity = touch(dir.path(), "a.jpg");
        let (pipeline, source) = pipeline(FakeSource::default().with("downsampled", 640, 480));
        let token = CancellationToken::new();

        let first = pipeline.generate(&identity, TargetSize::square(256), None, &token).unwrap();
        let second = pipeline.generate(&identity, TargetSize::square(256), None, &token).unwrap();

        assert_eq!(*first, *second);
        assert_eq!(source.called().len(), 1);
        assert_eq!(pipeline.cache().stats().memory_hits, 1);
    }

    #[test]
    fn test_cancelled_during_decode_leaves_no_cache_entry() {
        let dir = tempfile::tempdir().unwrap();
        let identity = touch(dir.path(), "a.jpg");
        let token = CancellationToken::new();
        let mut source = FakeSource::default().with("downsampled", 640, 480);
        source.cancel_on = Some(("downsampled", token.clone()));
        let (pipeline, _) = pipeline(source);

        let result = pipeline.generate(&identity, TargetSize::square(256), None, &token);
        assert!(matches!(result, Err(PipelineError::Cancelled)));
        assert_eq!(pipeline.cache().stats().memory_entries, 0);
    }

    #[test]
    fn test_cancelled_after_small_primary_skips_preview() {
        let dir = tempfile::tempdir().unwrap();
        let identity = touch(dir.path(), "IMG_0002.NEF");
        let token = CancellationToken::new();
        let mut source = FakeSource::default()
            .with("container_thumbnail", 160, 120)
            .with("large_preview", 6000, 4000);
        // Cancelled after the primary passed its own check
        source.cancel_on = Some(("container_thumbnail", token.clone()));
        let (pipeline, source) = pipeline(source);

        let result = pipeline.generate(&identity, TargetSize::square(1024), None, &token);
        assert!(matches!(result, Err(PipelineError::Cancelled)));
        assert_eq!(source.called(), vec!["container_thumbnail"]);
        assert_eq!(pipeline.cache().stats().memory_entries, 0);
    }

    #[test]
    fn test_cancelled_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let identity = touch(dir.path(), "a.jpg");
        let (pipeline, source) = pipeline(FakeSource::default().with("downsampled", 64, 64));
        let token = CancellationToken::new();
        token.cancel();

        let result = pipeline.generate(&identity, TargetSize::square(256), None, &token);
        assert!(matches!(result, Err(PipelineError::Cancelled)));
        assert!(source.called().is_empty());
    }

    #[test]
    fn test_missing_file_and_empty_target() {
        let (pipeline, _) = pipeline(FakeSource::default().with("downsampled", 64, 64));
        let token = CancellationToken::new();

        let missing = pipeline.generate(&FileIdentity::new("/no/such.jpg"), TargetSize::square(64), None, &token);
        assert!(matches!(missing, Err(PipelineError::NotReadable { .. })));

        let dir = tempfile::tempdir().unwrap();
        let identity = touch(dir.path(), "a.jpg");
        let empty = pipeline.generate(&identity, TargetSize::new(0, 64), None, &token);
        assert!(matches!(empty, Err(PipelineError::DecodeFailed(_))));
    }

    #[test]
    fn test_catalog_orientation_is_the_default_hint() {
        let dir = tempfile::tempdir().unwrap();
        let identity = touch(dir.path(), "a.jpg");
        let catalog = Arc::new(InMemoryCatalog::new());
        catalog.store(
            &identity,
            CatalogRecord {
                orientation: Some(Orientation::Rotate270CW),
                ..CatalogRecord::default()
            },
        );
        let source = Arc::new(FakeSource::default().with("downsampled", 300, 200));
        let pipeline = ThumbnailPipeline::new(
            source.clone(),
            Arc::new(CacheLayer::memory_only(8, 1 << 24, "test")),
            metadata_with(catalog),
            &PipelineConfig::default(),
        );

        let bitmap = pipeline
            .generate(&identity, TargetSize::square(512), None, &CancellationToken::new())
            .unwrap();
        assert_eq!((bitmap.width, bitmap.height), (200, 300));
        assert_eq!(
            source.calls.lock().unwrap()[0],
            ("downsampled", Some(Orientation::Rotate270CW))
        );
    }

    #[test]
    fn test_generate_with_metadata_without_readable_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let identity = touch(dir.path(), "a.jpg");
        let (pipeline, _) = pipeline(FakeSource::default().with("downsampled", 64, 48));

        // Neither the fake tool nor the container source can read these bytes
        let (bitmap, metadata) = pipeline
            .generate_with_metadata(&identity, TargetSize::square(256), &CancellationToken::new())
            .unwrap();
        assert!(metadata.is_none());
        assert_eq!(bitmap.map(|b| (b.width, b.height)), Some((64, 48)));
    }

    #[test]
    fn test_generate_with_metadata_uses_record_orientation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.cr2");
        std::fs::write(&path, b"raw bytes").unwrap();
        let identity = FileIdentity::new(&path);

        let json = format!(
            r#"[{{"SourceFile":"{}","Make":"Canon","Orientation":6,"ImageWidth":6000,"ImageHeight":4000}}]"#,
            path.display()
        );
        let tool = FakeTool::new(move |_| Ok(json.clone().into_bytes()));
        let metadata = Arc::new(MetadataExtractor::standard(
            Arc::new(tool),
            Arc::new(InMemoryCatalog::new()),
            MetadataConfig::default(),
        ));
        let source = Arc::new(FakeSource::default().with("container_thumbnail", 1600, 1067));
        let pipeline = ThumbnailPipeline::new(
            source.clone(),
            Arc::new(CacheLayer::memory_only(8, 1 << 24, "test")),
            metadata,
            &PipelineConfig::default(),
        );

        let (bitmap, record) = pipeline
            .generate_with_metadata(&identity, TargetSize::square(1024), &CancellationToken::new())
            .unwrap();
        let record = record.unwrap();
        assert_eq!(record.orientation, Orientation::Rotate90CW);
        let bitmap = bitmap.unwrap();
        assert!(bitmap.height > bitmap.width);
        assert_eq!(
            source.calls.lock().unwrap()[0],
            ("container_thumbnail", Some(Orientation::Rotate90CW))
        );
    }

    #[test]
    fn test_generate_with_metadata_honors_catalog_orientation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("landscape.jpg");
        let bytes = crate::encode::encode_jpeg(&Bitmap::filled(320, 240, [90, 90, 90]), 80).unwrap();
        std::fs::write(&path, bytes).unwrap();
        let identity = FileIdentity::new(&path);
        let catalog = Arc::new(InMemoryCatalog::new());
        catalog.store(
            &identity,
            CatalogRecord {
                orientation: Some(Orientation::Rotate90CW),
                ..CatalogRecord::default()
            },
        );
        let build = |source: Arc<FakeSource>| {
            ThumbnailPipeline::new(
                source,
                Arc::new(CacheLayer::memory_only(8, 1 << 24, "test")),
                metadata_with(catalog.clone()),
                &PipelineConfig::default(),
            )
        };
        let token = CancellationToken::new();

        let with_source = Arc::new(FakeSource::default().with("downsampled", 320, 240));
        let (bitmap, record) = build(with_source.clone())
            .generate_with_metadata(&identity, TargetSize::square(512), &token)
            .unwrap();
        // The file itself is upright
        assert_eq!(record.unwrap().orientation, Orientation::Normal);
        let bitmap = bitmap.unwrap();
        assert_eq!((bitmap.width, bitmap.height), (240, 320));
        assert_eq!(
            with_source.calls.lock().unwrap()[0],
            ("downsampled", Some(Orientation::Rotate90CW))
        );

        let plain = build(Arc::new(FakeSource::default().with("downsampled", 320, 240)))
            .generate(&identity, TargetSize::square(512), None, &token)
            .unwrap();
        assert_eq!((plain.width, plain.height), (bitmap.width, bitmap.height));
    }
}
