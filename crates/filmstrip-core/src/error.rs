//! Error types shared across the pipeline.
//!
//! Individual strategies report expected failures as values
//! ([`DecodeAttempt`](crate::decode::DecodeAttempt)); only exhaustion of a
//! whole chain, or a condition the caller must react to, surfaces as a
//! [`PipelineError`].

use std::path::PathBuf;

use thiserror::Error;

/// Runtime errors surfaced by metadata extraction and thumbnail generation.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The file does not exist or cannot be read.
    #[error("Cannot read {}: {reason}", path.display())]
    NotReadable { path: PathBuf, reason: String },

    /// Every strategy declined or failed for this file.
    #[error("Unsupported format: {}", path.display())]
    UnsupportedFormat { path: PathBuf },

    /// The external metadata tool is not installed or not executable.
    #[error("External tool unavailable: {0}")]
    ExternalToolUnavailable(String),

    /// The external tool ran but produced an error, a non-zero exit or unusable output.
    #[error("External tool failed: {0}")]
    ExternalToolFailed(String),

    /// Bytes were found but could not be turned into a bitmap.
    #[error("Decode failed: {0}")]
    DecodeFailed(String),

    /// The operation observed a cancelled token.
    #[error("Operation cancelled")]
    Cancelled,
}

impl PipelineError {
    pub(crate) fn not_readable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        PipelineError::NotReadable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// True for [`PipelineError::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled)
    }
}

/// Errors raised while wiring the pipeline together.
#[derive(Debug, Error)]
pub enum SetupError {
    /// Configuration sources could not be read or deserialized.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// The shared worker pool could not be built.
    #[error("Worker pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// The on-disk cache root could not be created.
    #[error("Cache directory {}: {source}", path.display())]
    CacheDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PipelineError>;
