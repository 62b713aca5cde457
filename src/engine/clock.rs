use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// One clock tick. `generation` identifies the arm() call that produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    pub generation: u64,
    pub elapsed: Duration,
}

/// Fixed-interval playback clock.
///
/// Ticks travel through a channel, so a tick can already be queued when
/// `cancel()` runs. Every tick therefore carries the generation it was armed
/// with, and `is_live()` rejects anything from an older generation: after
/// `cancel()` returns, no tick is observable.
pub struct ClockDriver {
    interval: Duration,
    generation: Arc<AtomicU64>,
    task: Option<JoinHandle<()>>,
}

impl ClockDriver {
    pub fn new(tick_rate_hz: f64) -> Self {
        let hz = if tick_rate_hz.is_finite() && tick_rate_hz > 0.0 { tick_rate_hz } else { 30.0 };
        Self {
            interval: Duration::from_secs_f64(1.0 / hz),
            generation: Arc::new(AtomicU64::new(0)),
            task: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_armed(&self) -> bool {
        self.task.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// True if `tick` belongs to the currently armed run.
    pub fn is_live(&self, tick: &Tick) -> bool {
        self.task.is_some() && tick.generation == self.generation()
    }

    /// Start ticking into `tx`. Re-arming restarts the cadence. Must be
    /// called from inside a tokio runtime.
    pub fn arm<T, F>(&mut self, tx: UnboundedSender<T>, wrap: F)
    where
        T: Send + 'static,
        F: Fn(Tick) -> T + Send + 'static,
    {
        self.cancel();
        let generation = self.generation();
        let live = Arc::clone(&self.generation);
        let period = self.interval;

        log::debug!("[Clock] armed generation {} at {:?}", generation, period);

        self.task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last = Instant::now();

            loop {
                let now = interval.tick().await;
                if live.load(Ordering::SeqCst) != generation {
                    break;
                }
                let elapsed = now.saturating_duration_since(last);
                last = now;
                if tx.send(wrap(Tick { generation, elapsed })).is_err() {
                    break;
                }
            }
        }));
    }

    /// Idempotent.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            self.generation.fetch_add(1, Ordering::SeqCst);
            task.abort();
            log::debug!("[Clock] cancelled");
        }
    }
}

impl Drop for ClockDriver {
    fn drop(&mut self) {
        self.cancel();
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn test_ticks_at_fixed_cadence() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut clock = ClockDriver::new(20.0);
        clock.arm(tx, |tick| tick);

        for _ in 0..3 {
            let tick = rx.recv().await.unwrap();
            assert!(clock.is_live(&tick));
            assert_eq!(tick.elapsed, Duration::from_millis(50));
        }
        clock.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_makes_queued_ticks_dead() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut clock = ClockDriver::new(50.0);
        clock.arm(tx, |tick| tick);

        // Let a few ticks queue up without draining them
        tokio::time::sleep(Duration::from_millis(100)).await;
        clock.cancel();
        assert!(!clock.is_armed());

        while let Ok(tick) = rx.try_recv() {
            assert!(!clock.is_live(&tick));
        }

        // Nothing new arrives after cancellation
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_idempotent_and_rearm_works() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut clock = ClockDriver::new(30.0);
        clock.cancel();
        clock.cancel();
        let before = clock.generation();

        clock.arm(tx.clone(), |tick| tick);
        clock.arm(tx, |tick| tick);
        assert_eq!(clock.generation(), before + 1);

        let tick = rx.recv().await.unwrap();
        assert!(clock.is_live(&tick));
    }
}
