//! Generation guard for discarding results of superseded async work.
//!
//! Every request takes a new generation. When the work finishes it asks the
//! guard whether its generation is still the latest; if not, the result is
//! dropped. Nothing is cancelled early.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Ticket identifying one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    /// Raw counter value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

/// Monotonic counter shared by everyone requesting the same computation.
///
/// Cloning shares the counter.
#[derive(Debug, Clone, Default)]
pub struct GenerationGuard {
    latest: Arc<AtomicU64>,
}

impl GenerationGuard {
    /// Create a guard at generation 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new request, superseding all earlier ones.
    #[must_use]
    pub fn next(&self) -> Generation {
        Generation(self.latest.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// The most recently issued generation.
    #[must_use]
    pub fn current(&self) -> Generation {
        Generation(self.latest.load(Ordering::Acquire))
    }

    /// Whether `generation` is still the latest request.
    #[must_use]
    pub fn is_current(&self, generation: Generation) -> bool {
        self.current() == generation
    }

    /// Keep `value` only if `generation` is still the latest request.
    pub fn accept<T>(&self, generation: Generation, value: T) -> Option<T> {
        if self.is_current(generation) {
            Some(value)
        } else {
            tracing::debug!(
                stale = generation.value(),
                latest = self.current().value(),
                "Discarding superseded result"
            );
            None
        }
    }
}
