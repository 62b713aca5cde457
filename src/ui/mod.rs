//! fltk front end pieces. Only built with the `gui` feature.

pub mod theme;
pub mod trace_view;

use std::time::{Duration, Instant};

pub use trace_view::TraceView;

/// Holds the latest value until input has been quiet for `delay`.
///
/// Slider drags produce a burst of changes; only the value the user settles
/// on should reach the equalize endpoint.
pub struct Debounce<T> {
    pending: Option<(T, Instant)>,
    delay: Duration,
}

impl<T> Debounce<T> {
    pub fn new(delay_ms: u64) -> Self {
        Self { pending: None, delay: Duration::from_millis(delay_ms) }
    }

    pub fn push(&mut self, value: T, now: Instant) {
        self.pending = Some((value, now));
    }

    /// Take the pending value if it has settled.
    pub fn take_ready(&mut self, now: Instant) -> Option<T> {
        match &self.pending {
            Some((_, at)) if now.saturating_duration_since(*at) >= self.delay => {
                self.pending.take().map(|(value, _)| value)
            }
            _ => None,
        }
    }

    /// Drop the pending value without delivering it.
    pub fn clear(&mut self) {
        self.pending = None;
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================
