//! The wired-up pipeline.
//!
//! [`Engine`] owns one instance of every component, a shared worker pool
//! and the background cancellation context. Foreground calls take their own
//! token; background prefetch runs under the context token, which
//! [`Engine::switch_context`] cancels.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::info;

use crate::cache::{CacheLayer, CacheStats};
use crate::cancel::CancellationToken;
use crate::catalog::{Catalog, LabelUpdate};
use crate::config::PipelineConfig;
use crate::decode::{Bitmap, RawDecoder};
use crate::error::{Result, SetupError};
use crate::identity::FileIdentity;
use crate::metadata::{MetadataExtractor, MetadataRecord};
use crate::pipeline::{PrefetchSummary, StandardSources, TargetSize, ThumbnailPipeline};
use crate::preview::PreviewExtractor;
use crate::tool::{ExifTool, ToolRunner};

pub struct Engine {
    tool: Arc<dyn ToolRunner>,
    metadata: Arc<MetadataExtractor>,
    previews: Arc<PreviewExtractor>,
    decoder: Arc<RawDecoder>,
    thumbnails: ThumbnailPipeline,
    cache: Arc<CacheLayer>,
    pool: ThreadPool,
    context: Mutex<CancellationToken>,
}

impl Engine {
    /// Wire every component against the configured exiftool.
    ///
    /// # Errors
    ///
    /// Returns `SetupError` if the worker pool or the disk cache root
    /// cannot be created.
    pub fn from_config(config: PipelineConfig, catalog: Arc<dyn Catalog>) -> std::result::Result<Self, SetupError> {
        let tool = Arc::new(ExifTool::from_config(&config.tool));
        Self::with_tool(config, tool, catalog)
    }

    /// Wire every component against an explicit tool runner.
    pub fn with_tool(
        config: PipelineConfig,
        tool: Arc<dyn ToolRunner>,
        catalog: Arc<dyn Catalog>,
    ) -> std::result::Result<Self, SetupError> {
        let threads = config.workers.resolved_threads();
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("filmstrip-{i}"))
            .build()?;

        let cache = Arc::new(CacheLayer::new(&config.cache)?);
        let metadata = Arc::new(MetadataExtractor::standard(
            tool.clone(),
            catalog,
            config.metadata.clone(),
        ));
        let previews = Arc::new(PreviewExtractor::new(tool.clone(), config.decode.scan_window_bytes));
        let decoder = Arc::new(RawDecoder::new(&config.decode, previews.clone()));
        let sources = Arc::new(StandardSources::new(previews.clone(), decoder.clone(), &config.decode));
        let thumbnails = ThumbnailPipeline::new(sources, cache.clone(), metadata.clone(), &config);

        info!(
            threads,
            disk_cache = config.cache.disk_enabled,
            version = %config.cache.format_version,
            "Engine ready"
        );

        Ok(Self {
            tool,
            metadata,
            previews,
            decoder,
            thumbnails,
            cache,
            pool,
            context: Mutex::new(CancellationToken::new()),
        })
    }

    /// Whether the external metadata tool can be run.
    pub fn tool_available(&self) -> bool {
        self.tool.is_available()
    }

    pub fn metadata(&self, identity: &FileIdentity) -> Result<MetadataRecord> {
        self.metadata.get(identity)
    }

    pub fn metadata_batch(
        &self,
        identities: &[FileIdentity],
        token: &CancellationToken,
    ) -> Result<HashMap<PathBuf, MetadataRecord>> {
        self.pool.install(|| self.metadata.get_batch(identities, token))
    }

    pub fn thumbnail(
        &self,
        identity: &FileIdentity,
        target: TargetSize,
        token: &CancellationToken,
    ) -> Result<Arc<Bitmap>> {
        self.pool
            .install(|| self.thumbnails.generate(identity, target, None, token))
    }

    pub fn thumbnail_with_metadata(
        &self,
        identity: &FileIdentity,
        target: TargetSize,
        token: &CancellationToken,
    ) -> Result<(Option<Arc<Bitmap>>, Option<MetadataRecord>)> {
        self.pool
            .install(|| self.thumbnails.generate_with_metadata(identity, target, token))
    }

    /// The largest embedded preview, uncached.
    pub fn preview(&self, identity: &FileIdentity) -> Result<Bitmap> {
        self.previews.extract_preview(identity)
    }

    /// A full decode through the strategy chain, uncached.
    pub fn decode(&self, identity: &FileIdentity, token: &CancellationToken) -> Result<Bitmap> {
        self.pool.install(|| self.decoder.decode(identity, token))
    }

    /// Warm the cache under the current background context.
    pub fn prefetch(&self, identities: &[FileIdentity], target: TargetSize) -> PrefetchSummary {
        let token = self.background_token();
        self.pool
            .install(|| self.thumbnails.prefetch(identities, target, &token))
    }

    /// A token cancelled by the next [`switch_context`](Self::switch_context).
    pub fn background_token(&self) -> CancellationToken {
        self.lock_context().child()
    }

    /// Cancel background work and start a fresh context.
    ///
    /// Memory tiers are dropped to bound peak memory; the disk tier stays.
    pub fn switch_context(&self) -> CancellationToken {
        let fresh = CancellationToken::new();
        let previous = std::mem::replace(&mut *self.lock_context(), fresh.clone());
        previous.cancel();

        self.cache.clear_memory();
        self.metadata.clear();
        info!("Switched context");
        fresh
    }

    /// Store a rating/label change and drop what depended on the old values.
    pub fn write_labels(&self, identity: &FileIdentity, update: &LabelUpdate) -> Result<()> {
        self.metadata.write_labels(identity, update)?;
        // The tool rewrites the file, which changes its modification time
        self.cache.invalidate(identity);
        Ok(())
    }

    pub fn invalidate_metadata(&self, identity: &FileIdentity) {
        self.metadata.invalidate(identity);
    }

    pub fn clear_all_caches(&self) {
        self.metadata.clear();
        self.cache.clear();
        info!("Cleared all caches");
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn lock_context(&self) -> MutexGuard<'_, CancellationToken> {
        self.context.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
