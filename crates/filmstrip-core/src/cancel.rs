//! Cooperative cancellation.
//!
//! A [`CancellationToken`] is passed through every pipeline call. Child
//! tokens observe their own flag and every ancestor's, so cancelling a
//! context token stops all work derived from it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone)]
pub struct CancellationToken {
    flags: Vec<Arc<AtomicBool>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            flags: vec![Arc::new(AtomicBool::new(false))],
        }
    }

    /// A token that is cancelled when either it or `self` is cancelled.
    pub fn child(&self) -> Self {
        let mut flags = self.flags.clone();
        flags.push(Arc::new(AtomicBool::new(false)));
        Self { flags }
    }

    /// Cancel this token and every child derived from it.
    pub fn cancel(&self) {
        if let Some(own) = self.flags.last() {
            own.store(true, Ordering::SeqCst);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.flags.iter().any(|f| f.load(Ordering::SeqCst))
    }

    /// `Err(Cancelled)` once the token is cancelled.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts work items in a batch loop and yields the worker every `every` items.
#[derive(Debug)]
pub struct Checkpoint<'a> {
    token: &'a CancellationToken,
    every: usize,
    seen: usize,
}

impl<'a> Checkpoint<'a> {
    pub fn new(token: &'a CancellationToken, every: usize) -> Self {
        Self {
            token,
            every: every.max(1),
            seen: 0,
        }
    }

    /// Record one item; checks the token and periodically yields.
    pub fn tick(&mut self) -> Result<()> {
        self.seen += 1;
        if self.seen % self.every == 0 {
            // Outside a rayon pool there is nothing to steal; yield the OS thread.
            if rayon::yield_now().is_none() {
                std::thread::yield_now();
            }
        }
        self.token.check()
    }

    pub fn seen(&self) -> usize {
        self.seen
    }
}
