//! Background warming of the thumbnail cache.

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use super::{TargetSize, ThumbnailPipeline};
use crate::cancel::{CancellationToken, Checkpoint};
use crate::identity::FileIdentity;

/// Outcome counts for one [`ThumbnailPipeline::prefetch`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PrefetchSummary {
    pub generated: usize,
    pub cache_hits: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl PrefetchSummary {
    pub fn total(&self) -> usize {
        self.generated + self.cache_hits + self.failed + self.cancelled
    }

    fn merge(mut self, other: Self) -> Self {
        self.generated += other.generated;
        self.cache_hits += other.cache_hits;
        self.failed += other.failed;
        self.cancelled += other.cancelled;
        self
    }
}

enum Outcome {
    Generated,
    CacheHit,
    Failed,
    Cancelled,
}

impl From<Outcome> for PrefetchSummary {
    fn from(outcome: Outcome) -> Self {
        let mut summary = PrefetchSummary::default();
        match outcome {
            Outcome::Generated => summary.generated = 1,
            Outcome::CacheHit => summary.cache_hits = 1,
            Outcome::Failed => summary.failed = 1,
            Outcome::Cancelled => summary.cancelled = 1,
        }
        summary
    }
}

impl ThumbnailPipeline {
    /// Generate thumbnails for `identities` on the current rayon pool.
    ///
    /// The token is checked per item; once it is cancelled the remaining
    /// items are counted as cancelled without being touched. Failures are
    /// counted, never returned.
    pub fn prefetch(
        &self,
        identities: &[FileIdentity],
        target: TargetSize,
        token: &CancellationToken,
    ) -> PrefetchSummary {
        let summary = identities
            .par_iter()
            .map_init(
                || Checkpoint::new(token, self.yield_every),
                |checkpoint, identity| self.prefetch_one(checkpoint, identity, target, token),
            )
            .map(PrefetchSummary::from)
            .reduce(PrefetchSummary::default, PrefetchSummary::merge);

        info!(
            generated = summary.generated,
            cache_hits = summary.cache_hits,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "Prefetch finished"
        );
        summary
    }

    fn prefetch_one(
        &self,
        checkpoint: &mut Checkpoint<'_>,
        identity: &FileIdentity,
        target: TargetSize,
        token: &CancellationToken,
    ) -> Outcome {
        if checkpoint.tick().is_err() {
            return Outcome::Cancelled;
        }
        match self.generate_tracked(identity, target, None, token) {
            Ok((_, true)) => Outcome::CacheHit,
            Ok((_, false)) => Outcome::Generated,
            Err(e) if e.is_cancelled() => Outcome::Cancelled,
            Err(e) => {
                debug!(path = %identity, error = %e, "Prefetch failed");
                Outcome::Failed
            }
        }
    }
}
