// ============================================================================
// CONTROLLER.RS - Playback state machine
// ============================================================================
//
// The controller is the only writer of the playback state (playhead time,
// zoom, speed, transport status). Everything else reads a `PlaybackState`
// snapshot.
//
// TRANSITIONS:
//   Stopped --play--> Playing       (needs a loaded signal + backend handle)
//   Paused  --play--> Playing
//   Playing --pause--> Paused
//   any     --scrub--> Paused       (the clock must not fight the drag)
//   any     --reset--> Stopped      (time 0, zoom 1, speed 1)
//   Playing --tick past end--> Stopped, playhead clamped to the last window
// ============================================================================

use std::time::Duration;

use super::window::{TimeWindow, ViewMode, WindowGeometry, WindowPolicy};

pub const MIN_SPEED: f64 = 0.1;
pub const MIN_ZOOM: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportStatus {
    Stopped,
    Playing,
    Paused,
}

/// Read-only snapshot handed to the rest of the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackState {
    pub is_playing: bool,
    pub speed: f64,
    pub current_time: f64,
    pub zoom: f64,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self { is_playing: false, speed: 1.0, current_time: 0.0, zoom: 1.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerConfig {
    pub base_window: f64,
    pub max_zoom: f64,
    pub max_speed: f64,
    pub policy: WindowPolicy,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self { base_window: 2.0, max_zoom: 20.0, max_speed: 4.0, policy: WindowPolicy::Centered }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not playing; nothing changed.
    Idle,
    Advanced,
    /// Reached the end boundary on this tick. Reported once per pass.
    Ended,
}

pub struct PlaybackController {
    config: ControllerConfig,
    status: TransportStatus,
    speed: f64,
    current_time: f64,
    zoom: f64,
    duration: Option<f64>,
    backend_ready: bool,
    scrubbing: bool,
}

impl PlaybackController {
    pub fn new(config: ControllerConfig) -> Self {
        Self {
            config,
            status: TransportStatus::Stopped,
            speed: 1.0,
            current_time: 0.0,
            zoom: 1.0,
            duration: None,
            backend_ready: false,
            scrubbing: false,
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn status(&self) -> TransportStatus {
        self.status
    }

    pub fn is_scrubbing(&self) -> bool {
        self.scrubbing
    }

    pub fn has_signal(&self) -> bool {
        self.duration.is_some()
    }

    pub fn duration(&self) -> f64 {
        self.duration.unwrap_or(0.0)
    }

    pub fn snapshot(&self) -> PlaybackState {
        PlaybackState {
            is_playing: self.status == TransportStatus::Playing,
            speed: self.speed,
            current_time: self.current_time,
            zoom: self.zoom,
        }
    }

    pub fn view_mode(&self) -> ViewMode {
        if self.status == TransportStatus::Playing { ViewMode::Playing } else { ViewMode::Paused }
    }

    pub fn geometry(&self) -> WindowGeometry {
        WindowGeometry {
            duration: self.duration(),
            base_window: self.config.base_window,
            policy: self.config.policy,
        }
    }

    pub fn window(&self) -> TimeWindow {
        self.geometry().compute(self.zoom, self.view_mode(), self.current_time)
    }

    pub fn window_duration(&self) -> f64 {
        self.geometry().window_duration(self.zoom)
    }

    // ─── Signal lifecycle ──────────────────────────────────────────────────────

    /// New signal: everything goes back to defaults.
    pub fn load(&mut self, duration: f64) {
        self.reset();
        self.duration = if duration.is_finite() && duration > 0.0 { Some(duration) } else { None };
        self.backend_ready = false;
    }

    pub fn unload(&mut self) {
        self.reset();
        self.duration = None;
        self.backend_ready = false;
    }

    /// Backend handle became valid (or was lost).
    pub fn set_backend_ready(&mut self, ready: bool) {
        self.backend_ready = ready;
        if !ready && self.status == TransportStatus::Playing {
            self.status = TransportStatus::Paused;
        }
    }

    pub fn is_backend_ready(&self) -> bool {
        self.backend_ready
    }

    // ─── Transport ─────────────────────────────────────────────────────────────

    /// Returns true if playback started.
    pub fn play(&mut self) -> bool {
        if self.status == TransportStatus::Playing || !self.has_signal() || !self.backend_ready {
            return false;
        }
        // Play after an auto-stop at the end starts over
        if self.status == TransportStatus::Stopped
            && self.current_time > 0.0
            && self.current_time >= self.geometry().max_start(self.zoom) - 1e-9
        {
            self.current_time = 0.0;
        }
        self.scrubbing = false;
        self.status = TransportStatus::Playing;
        true
    }

    pub fn pause(&mut self) -> bool {
        if self.status != TransportStatus::Playing {
            return false;
        }
        self.status = TransportStatus::Paused;
        true
    }

    /// Stop/Reset. Never fails.
    pub fn reset(&mut self) {
        self.status = TransportStatus::Stopped;
        self.current_time = 0.0;
        self.zoom = 1.0;
        self.speed = 1.0;
        self.scrubbing = false;
    }

    /// Advance by one clock tick. The speed in effect at tick time applies.
    pub fn tick(&mut self, elapsed: Duration) -> TickOutcome {
        if self.status != TransportStatus::Playing {
            return TickOutcome::Idle;
        }
        let Some(duration) = self.duration else { return TickOutcome::Idle; };

        self.current_time += elapsed.as_secs_f64() * self.speed;

        let span = self.window_duration();
        if self.current_time + span >= duration {
            self.current_time = (duration - span).max(0.0);
            self.status = TransportStatus::Stopped;
            log::debug!("[Playback] reached end, playhead clamped to {:.3}", self.current_time);
            return TickOutcome::Ended;
        }
        TickOutcome::Advanced
    }

    // ─── Scrubbing ─────────────────────────────────────────────────────────────

    pub fn begin_scrub(&mut self) -> bool {
        if !self.has_signal() {
            return false;
        }
        self.scrubbing = true;
        self.status = TransportStatus::Paused;
        true
    }

    /// Move the playhead to an absolute time. Pauses playback.
    pub fn scrub_to(&mut self, time: f64) -> bool {
        if !self.has_signal() || !time.is_finite() {
            return false;
        }
        self.status = TransportStatus::Paused;
        self.current_time = time.clamp(0.0, self.geometry().max_start(self.zoom));
        true
    }

    pub fn end_scrub(&mut self) {
        self.scrubbing = false;
    }

    // ─── Speed / zoom ──────────────────────────────────────────────────────────

    pub fn set_speed(&mut self, speed: f64) -> bool {
        if !speed.is_finite() || speed <= 0.0 {
            return false;
        }
        self.speed = speed.clamp(MIN_SPEED, self.config.max_speed.max(MIN_SPEED));
        true
    }

    pub fn clamp_zoom(&self, zoom: f64) -> f64 {
        if !zoom.is_finite() {
            return self.zoom;
        }
        zoom.clamp(MIN_ZOOM, self.config.max_zoom.max(MIN_ZOOM))
    }

    /// Zoom while keeping the time under `anchor_fraction` (0 = left edge of
    /// the visible window, 1 = right edge) fixed on screen.
    ///
    /// While playing the clock owns the playhead, so only the zoom changes and
    /// the window re-derives around the playhead.
    pub fn zoom_at(&mut self, zoom: f64, anchor_fraction: f64) -> bool {
        if !self.has_signal() {
            return false;
        }
        let new_zoom = self.clamp_zoom(zoom);
        if (new_zoom - self.zoom).abs() < f64::EPSILON {
            return false;
        }

        if self.status == TransportStatus::Playing {
            self.zoom = new_zoom;
            return true;
        }

        let geometry = self.geometry();
        let fraction = if anchor_fraction.is_finite() { anchor_fraction.clamp(0.0, 1.0) } else { 0.0 };
        let anchor = self.window().time_at(fraction);

        let new_span = geometry.visible_duration(new_zoom);
        let new_start = (anchor - fraction * new_span).clamp(0.0, geometry.max_start(new_zoom));

        self.zoom = new_zoom;
        self.current_time = geometry
            .time_for_start(new_zoom, self.view_mode(), new_start)
            .clamp(0.0, geometry.max_start(new_zoom));
        true
    }

    /// Zoom anchored at the playhead.
    pub fn zoom_to(&mut self, zoom: f64) -> bool {
        let fraction = self.window().fraction_of(self.current_time);
        self.zoom_at(zoom, fraction)
    }

    pub fn zoom_by(&mut self, factor: f64) -> bool {
        if !factor.is_finite() || factor <= 0.0 {
            return false;
        }
        self.zoom_to(self.zoom * factor)
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================
