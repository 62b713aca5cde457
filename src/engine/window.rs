//! Visible time-window math shared by every linked viewer.
//!
//! Two window policies exist for the playing state:
//!
//! - `Centered` (default): the playhead sits in the middle of the window,
//!   clamped so the window never leaves `[0, duration]`.
//! - `Forward`: the window starts at the playhead and scrolls strictly forward.
//!
//! While paused or scrubbing, the window always starts at the absolute
//! playhead time (`start = current_time`). There is no separate pan state.
//!
//! Under `Centered` this means a Pause/Play toggle shifts the window by half
//! its width: a playhead at 5.0 with a 2 s window shows `[4, 6)` while
//! playing and `[5, 7)` once paused, and each toggle fetches the shifted
//! window. `Forward` has no jump.

/// Slack allowed on the far edge of a window to absorb float error.
pub const WINDOW_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowPolicy {
    #[default]
    Centered,
    Forward,
}

impl WindowPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            WindowPolicy::Centered => "Centered",
            WindowPolicy::Forward => "Forward",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "centered" | "centred" | "center" => Some(WindowPolicy::Centered),
            "forward" | "scroll" => Some(WindowPolicy::Forward),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    Playing,
    Paused,
}

/// Half-open interval `[start, end)` in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TimeWindow {
    pub start: f64,
    pub end: f64,
}

impl TimeWindow {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Time at a normalized position (0 = left edge, 1 = right edge).
    pub fn time_at(&self, fraction: f64) -> f64 {
        self.start + self.duration() * fraction
    }

    /// Normalized position of `time`, clamped to 0..1.
    pub fn fraction_of(&self, time: f64) -> f64 {
        let range = self.duration();
        if range <= 0.0 {
            return 0.0;
        }
        ((time - self.start) / range).clamp(0.0, 1.0)
    }

    pub fn contains(&self, time: f64) -> bool {
        time >= self.start && time < self.end
    }
}

/// Fixed inputs of the window computation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowGeometry {
    pub duration: f64,
    pub base_window: f64,
    pub policy: WindowPolicy,
}

impl WindowGeometry {
    pub fn window_duration(&self, zoom: f64) -> f64 {
        window_duration(self.base_window, zoom)
    }

    /// Length actually shown: never longer than the signal.
    pub fn visible_duration(&self, zoom: f64) -> f64 {
        self.window_duration(zoom).min(self.duration.max(0.0))
    }

    /// Largest start that keeps the full window inside the signal.
    pub fn max_start(&self, zoom: f64) -> f64 {
        (self.duration - self.window_duration(zoom)).max(0.0)
    }

    pub fn compute(&self, zoom: f64, mode: ViewMode, current_time: f64) -> TimeWindow {
        compute_window(self.duration, zoom, self.base_window, self.policy, mode, current_time)
    }

    /// Playhead time that yields a window starting at `start`. Inverse of
    /// `compute` ignoring edge clamps.
    pub fn time_for_start(&self, zoom: f64, mode: ViewMode, start: f64) -> f64 {
        match (mode, self.policy) {
            (ViewMode::Playing, WindowPolicy::Centered) => start + self.visible_duration(zoom) / 2.0,
            _ => start,
        }
    }
}

/// `base_window / zoom`, with zoom floored at 1.
pub fn window_duration(base_window: f64, zoom: f64) -> f64 {
    let zoom = if zoom.is_finite() { zoom.max(1.0) } else { 1.0 };
    base_window.max(0.0) / zoom
}

/// Compute the visible window. Never returns a negative start or an end past
/// `duration + WINDOW_EPSILON`; a signal shorter than the window is shown whole.
pub fn compute_window(
    duration: f64,
    zoom: f64,
    base_window: f64,
    policy: WindowPolicy,
    mode: ViewMode,
    current_time: f64,
) -> TimeWindow {
    let duration = duration.max(0.0);
    let span = window_duration(base_window, zoom);

    if duration <= span {
        return TimeWindow { start: 0.0, end: duration };
    }

    let current_time = if current_time.is_finite() { current_time.clamp(0.0, duration) } else { 0.0 };
    let raw_start = match (mode, policy) {
        (ViewMode::Playing, WindowPolicy::Centered) => current_time - span / 2.0,
        (ViewMode::Playing, WindowPolicy::Forward) | (ViewMode::Paused, _) => current_time,
    };

    let start = raw_start.clamp(0.0, duration - span);
    TimeWindow { start, end: (start + span).min(duration) }
}

// ============================================================================
// UNIT TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_window_containment_grid() {
        let durations = [0.5, 1.0, 2.0, 3.7, 10.0, 125.0];
        let zooms = [1.0, 1.5, 2.0, 7.3, 20.0, 100.0];
        let policies = [WindowPolicy::Centered, WindowPolicy::Forward];
        let modes = [ViewMode::Playing, ViewMode::Paused];

        for &duration in &durations {
            for &zoom in &zooms {
                for &policy in &policies {
                    for &mode in &modes {
                        for step in 0..=20 {
                            let t = duration * step as f64 / 20.0;
                            let w = compute_window(duration, zoom, 2.0, policy, mode, t);
                            assert!(w.start >= 0.0, "negative start for d={duration} z={zoom} t={t}");
                            assert!(w.end <= duration + WINDOW_EPSILON);
                            let span = window_duration(2.0, zoom).min(duration);
                            assert!((w.duration() - span).abs() < EPS);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_centered_policy_tracks_playhead() {
        let w = compute_window(10.0, 1.0, 2.0, WindowPolicy::Centered, ViewMode::Playing, 5.0);
        assert!((w.start - 4.0).abs() < EPS);
        assert!((w.end - 6.0).abs() < EPS);

        // Clamped at both ends
        let w = compute_window(10.0, 1.0, 2.0, WindowPolicy::Centered, ViewMode::Playing, 0.3);
        assert_eq!(w.start, 0.0);
        let w = compute_window(10.0, 1.0, 2.0, WindowPolicy::Centered, ViewMode::Playing, 9.9);
        assert!((w.start - 8.0).abs() < EPS);
    }

    #[test]
    fn test_forward_policy_starts_at_playhead() {
        let w = compute_window(10.0, 2.0, 2.0, WindowPolicy::Forward, ViewMode::Playing, 3.0);
        assert!((w.start - 3.0).abs() < EPS);
        assert!((w.end - 4.0).abs() < EPS);
    }

    #[test]
    fn test_paused_window_uses_absolute_time() {
        let w = compute_window(10.0, 1.0, 2.0, WindowPolicy::Centered, ViewMode::Paused, 3.0);
        assert!((w.start - 3.0).abs() < EPS);
        assert!((w.end - 5.0).abs() < EPS);
    }

    #[test]
    fn test_centered_pause_shifts_by_half_a_window() {
        let playing = compute_window(10.0, 1.0, 2.0, WindowPolicy::Centered, ViewMode::Playing, 5.0);
        let paused = compute_window(10.0, 1.0, 2.0, WindowPolicy::Centered, ViewMode::Paused, 5.0);
        assert_eq!(playing, TimeWindow { start: 4.0, end: 6.0 });
        assert_eq!(paused, TimeWindow { start: 5.0, end: 7.0 });

        let forward_playing = compute_window(10.0, 1.0, 2.0, WindowPolicy::Forward, ViewMode::Playing, 5.0);
        let forward_paused = compute_window(10.0, 1.0, 2.0, WindowPolicy::Forward, ViewMode::Paused, 5.0);
        assert_eq!(forward_playing, forward_paused);
    }

    #[test]
    fn test_short_signal_shows_everything() {
        let w = compute_window(1.2, 1.0, 2.0, WindowPolicy::Centered, ViewMode::Playing, 0.8);
        assert_eq!(w, TimeWindow { start: 0.0, end: 1.2 });
    }

    #[test]
    fn test_degenerate_inputs() {
        let w = compute_window(10.0, f64::NAN, 2.0, WindowPolicy::Forward, ViewMode::Paused, f64::NAN);
        assert_eq!(w, TimeWindow { start: 0.0, end: 2.0 });
        let w = compute_window(10.0, 0.25, 2.0, WindowPolicy::Forward, ViewMode::Paused, 1.0);
        assert!((w.duration() - 2.0).abs() < EPS);
    }

    #[test]
    fn test_time_for_start_inverts_compute() {
        let geometry = WindowGeometry { duration: 10.0, base_window: 2.0, policy: WindowPolicy::Centered };
        let t = geometry.time_for_start(1.0, ViewMode::Playing, 4.0);
        assert!((geometry.compute(1.0, ViewMode::Playing, t).start - 4.0).abs() < EPS);
        let t = geometry.time_for_start(2.0, ViewMode::Paused, 4.0);
        assert!((geometry.compute(2.0, ViewMode::Paused, t).start - 4.0).abs() < EPS);
    }

    #[test]
    fn test_fraction_helpers() {
        let w = TimeWindow { start: 2.0, end: 4.0 };
        assert!((w.time_at(0.25) - 2.5).abs() < EPS);
        assert!((w.fraction_of(3.0) - 0.5).abs() < EPS);
        assert_eq!(w.fraction_of(10.0), 1.0);
        assert!(w.contains(2.0) && !w.contains(4.0));
    }
}
