//! Pipeline configuration.
//!
//! Defaults are seeded into the `config` builder, then an optional file and
//! `FILMSTRIP_*` environment variables (sections separated by `__`, e.g.
//! `FILMSTRIP_TOOL__TIMEOUT_SECS=10`) are layered on top.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SetupError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub tool: ToolConfig,
    pub metadata: MetadataConfig,
    pub cache: CacheConfig,
    pub decode: DecodeConfig,
    pub workers: WorkerConfig,
}

/// External metadata tool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Program name or path of exiftool.
    pub program: String,
    /// Upper bound on a single invocation, in seconds.
    pub timeout_secs: u64,
    /// Set to false to never spawn the tool.
    pub enabled: bool,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            program: "exiftool".to_string(),
            timeout_secs: 30,
            enabled: true,
        }
    }
}

impl ToolConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// Files per tool invocation in batch mode.
    pub chunk_size: usize,
    /// Items between cooperative yields in batch loops.
    pub yield_every: usize,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            chunk_size: 50,
            yield_every: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub memory_entries: usize,
    pub memory_bytes: usize,
    /// Disk tier root; the platform cache directory when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_dir: Option<PathBuf>,
    pub disk_enabled: bool,
    /// Bumped whenever rendering changes so old disk entries are ignored.
    pub format_version: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_entries: 512,
            memory_bytes: 256 * 1024 * 1024, // 256MB
            disk_dir: None,
            disk_enabled: true,
            format_version: "3".to_string(),
        }
    }
}

impl CacheConfig {
    /// Disk tier root, falling back to `<cache dir>/filmstrip/thumbnails`.
    pub fn resolved_disk_dir(&self) -> PathBuf {
        self.disk_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("filmstrip")
                .join("thumbnails")
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeConfig {
    /// Longest edge produced by the sensor decoder.
    pub raw_max_dimension: u32,
    /// Longest edge kept from container-declared thumbnails.
    pub container_thumbnail_cap: u32,
    /// Fraction of the target's longest edge a primary decode must reach.
    pub quality_threshold: f32,
    /// Bytes searched after a JPEG start marker for its end marker.
    pub scan_window_bytes: usize,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            raw_max_dimension: 4096,
            container_thumbnail_cap: 2048,
            quality_threshold: 0.9,
            scan_window_bytes: 20 * 1024 * 1024, // 20MB
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Worker threads; 0 uses the available parallelism.
    pub threads: usize,
}

impl WorkerConfig {
    pub fn resolved_threads(&self) -> usize {
        if self.threads > 0 {
            return self.threads;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    }
}

/// Load configuration from defaults, an optional file and the environment.
pub fn load(path: Option<&Path>) -> Result<PipelineConfig, SetupError> {
    let mut settings =
        config::Config::builder().add_source(config::Config::try_from(&PipelineConfig::default())?);
    if let Some(p) = path {
        settings = settings.add_source(config::File::from(p));
    } else {
        settings = settings.add_source(config::File::with_name("filmstrip").required(false));
    }
    settings = settings.add_source(
        config::Environment::with_prefix("FILMSTRIP")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );
    let cfg = settings.build()?;
    Ok(cfg.try_deserialize()?)
}
