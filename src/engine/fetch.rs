use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::backend::{BackendError, WindowRequest, WindowResponse};

/// Monotonic request counter.
///
/// Clones share the same counter, so a completion handler holding a clone
/// sees every later dispatch or invalidation.
#[derive(Debug, Clone, Default)]
pub struct RequestSequence(Arc<AtomicU64>);

impl RequestSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the next sequence number.
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, seq: u64) -> bool {
        seq == self.current()
    }

    /// Orphan everything dispatched so far.
    pub fn invalidate(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// A request that passed the throttle and must be sent to the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub seq: u64,
    pub request: WindowRequest,
    pub shows_loading: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Applied(WindowResponse),
    Stale,
    Failed(String),
}

/// Throttles window requests and drops out-of-order responses.
///
/// While playing, a request arriving within `throttle` of the previous
/// dispatch is dropped (the next tick supersedes it), as is a request
/// identical to the last one sent. While paused, every request goes out and
/// raises the loading flag.
pub struct FetchScheduler {
    throttle: Duration,
    sequence: RequestSequence,
    last_dispatch: Option<Instant>,
    last_request: Option<WindowRequest>,
    loading_seq: Option<u64>,
    error: Option<String>,
}

impl FetchScheduler {
    pub fn new(throttle: Duration) -> Self {
        Self {
            throttle,
            sequence: RequestSequence::new(),
            last_dispatch: None,
            last_request: None,
            loading_seq: None,
            error: None,
        }
    }

    pub fn throttle(&self) -> Duration {
        self.throttle
    }

    pub fn sequence(&self) -> &RequestSequence {
        &self.sequence
    }

    pub fn is_loading(&self) -> bool {
        self.loading_seq.is_some()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn request_window(&mut self, now: Instant, request: WindowRequest) -> Option<Dispatch> {
        if request.is_playing {
            if let Some(last) = self.last_dispatch {
                if now.saturating_duration_since(last) < self.throttle {
                    return None;
                }
            }
            if self.last_request.as_ref() == Some(&request) {
                return None;
            }
        }

        let seq = self.sequence.next();
        let shows_loading = !request.is_playing;
        if shows_loading {
            self.loading_seq = Some(seq);
        }
        self.last_dispatch = Some(now);
        self.last_request = Some(request.clone());

        log::debug!(
            "[Fetch] dispatch #{} [{:.3}, {:.3}) playing={}",
            seq, request.time_start, request.time_end, request.is_playing
        );

        Some(Dispatch { seq, request, shows_loading })
    }

    /// Fold a provider response back in. Stale responses change nothing.
    pub fn complete(&mut self, seq: u64, result: Result<WindowResponse, BackendError>) -> FetchOutcome {
        if !self.sequence.is_current(seq) {
            log::debug!("[Fetch] discarding stale response #{} (current #{})", seq, self.sequence.current());
            return FetchOutcome::Stale;
        }

        self.loading_seq = None;
        match result {
            Ok(response) => {
                self.error = None;
                FetchOutcome::Applied(response)
            }
            Err(e) => {
                let message = format!("Window fetch failed: {}", e);
                log::warn!("[Fetch] {}", message);
                self.error = Some(message.clone());
                FetchOutcome::Failed(message)
            }
        }
    }

    /// Drop every in-flight request (signal or mode switch). The next request
    /// always dispatches.
    pub fn invalidate(&mut self) {
        self.sequence.invalidate();
        self.last_dispatch = None;
        self.last_request = None;
        self.loading_seq = None;
        log::debug!("[Fetch] invalidated in-flight requests (now #{})", self.sequence.current());
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================
