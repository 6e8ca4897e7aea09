//! Metadata extraction.
//!
//! [`MetadataExtractor`] resolves a [`MetadataRecord`] for a file by trying
//! its sources in priority order (the external tool, then the file's own
//! EXIF block), caches the result per identity and overlays the catalog's
//! user decisions on every answer.
//!
//! # Batch mode
//!
//! [`MetadataExtractor::get_batch`] hands the tool one chunk of files per
//! invocation. A chunk that fails as a whole is resolved file by file, so a
//! single unreadable file never costs the rest of the chunk.

mod record;
mod source;
mod tool_record;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;

use tracing::{debug, warn};

pub use record::{format_shutter_speed, ColorLabel, FlagStatus, GpsCoordinate, MetadataRecord};
pub use source::{ContainerPropertiesSource, MetadataSource, ToolBackedSource};
pub use tool_record::{LooseValue, ToolRecord, TOOL_TAGS, TOOL_TAG_LIST_VERSION};

use crate::cancel::{CancellationToken, Checkpoint};
use crate::catalog::{Catalog, LabelUpdate};
use crate::config::MetadataConfig;
use crate::decode::Orientation;
use crate::error::{PipelineError, Result};
use crate::identity::FileIdentity;
use crate::tool::ToolRunner;

struct CachedRecord {
    record: MetadataRecord,
    modified: Option<SystemTime>,
}

/// Cached, catalog-aware metadata lookup.
pub struct MetadataExtractor {
    sources: Vec<Arc<dyn MetadataSource>>,
    writer: Option<Arc<ToolBackedSource>>,
    catalog: Arc<dyn Catalog>,
    cache: RwLock<HashMap<PathBuf, CachedRecord>>,
    config: MetadataConfig,
}

impl MetadataExtractor {
    /// An extractor over explicit sources, highest priority first.
    pub fn new(
        sources: Vec<Arc<dyn MetadataSource>>,
        catalog: Arc<dyn Catalog>,
        config: MetadataConfig,
    ) -> Self {
        Self {
            sources,
            writer: None,
            catalog,
            cache: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Tool first, then embedded EXIF; label writes go through the tool.
    pub fn standard(tool: Arc<dyn ToolRunner>, catalog: Arc<dyn Catalog>, config: MetadataConfig) -> Self {
        let tool_source = Arc::new(ToolBackedSource::new(tool));
        let sources: Vec<Arc<dyn MetadataSource>> = vec![
            tool_source.clone(),
            Arc::new(ContainerPropertiesSource::new()),
        ];
        Self::new(sources, catalog, config).with_writer(tool_source)
    }

    pub fn with_writer(mut self, writer: Arc<ToolBackedSource>) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Metadata for one file, with catalog overrides applied.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::NotReadable` when the file is missing or no
    /// source can read it.
    pub fn get(&self, identity: &FileIdentity) -> Result<MetadataRecord> {
        if !identity.exists() {
            return Err(PipelineError::not_readable(identity.path(), "file not found"));
        }
        let modified = identity.current_modified();
        if let Some(record) = self.cached(identity, modified) {
            return Ok(self.with_catalog(identity, record));
        }

        let record = self.resolve(identity)?;
        self.store(identity, record.clone(), modified);
        Ok(self.with_catalog(identity, record))
    }

    /// Metadata for many files, keyed by normalized path.
    ///
    /// Missing and unreadable files are absent from the result. Only
    /// cancellation is an error.
    pub fn get_batch(
        &self,
        identities: &[FileIdentity],
        token: &CancellationToken,
    ) -> Result<HashMap<PathBuf, MetadataRecord>> {
        token.check()?;
        let mut results = HashMap::with_capacity(identities.len());
        let mut pending = Vec::new();

        for identity in identities {
            if !identity.exists() {
                debug!(path = %identity, "Skipping missing file in batch");
                continue;
            }
            let modified = identity.current_modified();
            match self.cached(identity, modified) {
                Some(record) => {
                    results.insert(identity.path().to_path_buf(), self.with_catalog(identity, record));
                }
                None => pending.push((identity, modified)),
            }
        }

        let batch_source = self
            .sources
            .iter()
            .find(|s| s.supports_batch() && s.is_available());
        let mut checkpoint = Checkpoint::new(token, self.config.yield_every);

        for (index, chunk) in pending.chunks(self.config.chunk_size.max(1)).enumerate() {
            token.check()?;

            let mut found = match batch_source {
                Some(source) => {
                    let ids: Vec<FileIdentity> = chunk.iter().map(|(id, _)| (*id).clone()).collect();
                    match source.extract_batch(&ids) {
                        Ok(found) => found,
                        Err(e) => {
                            warn!(chunk = index, files = chunk.len(), error = %e, "Batch metadata chunk failed, resolving files individually");
                            HashMap::new()
                        }
                    }
                }
                None => HashMap::new(),
            };

            for (identity, modified) in chunk {
                checkpoint.tick()?;
                let record = match found.remove(identity.path()) {
                    Some(record) => record,
                    None => match self.resolve(identity) {
                        Ok(record) => record,
                        Err(e) => {
                            debug!(path = %identity, error = %e, "No metadata for file");
                            continue;
                        }
                    },
                };
                self.store(identity, record.clone(), *modified);
                results.insert(identity.path().to_path_buf(), self.with_catalog(identity, record));
            }
        }

        Ok(results)
    }

    /// Forget the cached record for one file.
    pub fn invalidate(&self, identity: &FileIdentity) {
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(identity.path());
    }

    pub fn clear(&self) {
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of cached records.
    pub fn cached_len(&self) -> usize {
        self.cache.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Orientation the user set in the catalog, if any.
    pub fn catalog_orientation(&self, identity: &FileIdentity) -> Option<Orientation> {
        self.catalog.record(identity).and_then(|record| record.orientation)
    }

    /// Record a rating/label change.
    ///
    /// The catalog is updated first and is authoritative; writing XMP into
    /// the file is best-effort. The cached record is dropped either way.
    pub fn write_labels(&self, identity: &FileIdentity, update: &LabelUpdate) -> Result<()> {
        let mut record = self.catalog.record(identity).unwrap_or_default();
        record.apply(update);
        self.catalog.store(identity, record);

        if let Some(writer) = &self.writer {
            if writer.is_available() {
                if let Err(e) = writer.write_labels(identity, update) {
                    warn!(path = %identity, error = %e, "Could not write labels to file");
                }
            }
        }

        self.invalidate(identity);
        Ok(())
    }

    /// Try each source in order; the first record wins.
    fn resolve(&self, identity: &FileIdentity) -> Result<MetadataRecord> {
        let mut last_error = None;
        for source in &self.sources {
            if !source.is_available() {
                debug!(source = source.name(), "Metadata source unavailable");
                continue;
            }
            match source.extract(identity) {
                Ok(record) => return Ok(record),
                Err(e) => {
                    debug!(source = source.name(), path = %identity, error = %e, "Metadata source failed");
                    last_error = Some(e);
                }
            }
        }
        let reason = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no metadata source available".to_string());
        Err(PipelineError::not_readable(identity.path(), reason))
    }

    fn cached(&self, identity: &FileIdentity, modified: Option<SystemTime>) -> Option<MetadataRecord> {
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        cache
            .get(identity.path())
            .filter(|entry| entry.modified == modified)
            .map(|entry| entry.record.clone())
    }

    fn store(&self, identity: &FileIdentity, record: MetadataRecord, modified: Option<SystemTime>) {
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(identity.path().to_path_buf(), CachedRecord { record, modified });
    }

    fn with_catalog(&self, identity: &FileIdentity, mut record: MetadataRecord) -> MetadataRecord {
        if let Some(catalog) = self.catalog.record(identity) {
            record.apply_catalog(&catalog);
        }
        record
    }
}
