//! Sans-IO viewer session.
//!
//! The session owns the playback controller, the fetch scheduler and the
//! current render state. Every input (user action, clock tick, backend
//! completion) goes through one method that mutates state and returns the
//! side effects the runtime has to perform. Each call works from a fresh
//! `PlaybackState` snapshot, never from values captured by an earlier call.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::backend::{BackendError, EqualizeRequest, UploadRequest, WindowRequest, WindowResponse};
use crate::equalizer::EqualizerSettings;
use crate::signal::{Signal, SignalRole};
use crate::traces::{self, FreqScale, Trace};

use super::controller::{ControllerConfig, PlaybackController, PlaybackState, TickOutcome, TransportStatus};
use super::fetch::{Dispatch, FetchOutcome, FetchScheduler, RequestSequence};
use super::window::TimeWindow;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub controller: ControllerConfig,
    pub tick_rate_hz: f64,
    pub fetch_throttle: Duration,
    pub waveform_max_points: usize,
    pub fft_max_points: usize,
    pub fft_scale: FreqScale,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            controller: ControllerConfig::default(),
            tick_rate_hz: 30.0,
            fetch_throttle: Duration::from_millis(50),
            waveform_max_points: 2000,
            fft_max_points: 1000,
            fft_scale: FreqScale::Linear,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UserAction {
    Play,
    Pause,
    TogglePlay,
    /// Stop and reset time, zoom and speed.
    Stop,
    BeginScrub,
    ScrubTo(f64),
    EndScrub,
    SetSpeed(f64),
    ZoomTo(f64),
    ZoomBy(f64),
    ZoomAt { zoom: f64, anchor_fraction: f64 },
    SetGain { index: usize, gain: f32 },
    /// Put every slider back to unity gain.
    ResetGains,
    ApplyMode(EqualizerSettings),
    SetFreqScale(FreqScale),
    ClearError,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum UploadState {
    #[default]
    Idle,
    Pending,
    Ready(String),
    Failed(String),
}

impl UploadState {
    pub fn signal_id(&self) -> Option<&str> {
        match self {
            UploadState::Ready(id) => Some(id),
            _ => None,
        }
    }
}

/// Side effects requested by the session.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    ArmClock,
    CancelClock,
    FetchWindow(Dispatch),
    Upload { seq: u64, request: UploadRequest },
    Equalize { seq: u64, request: EqualizeRequest },
}

#[derive(Debug, Clone, Default)]
pub struct SignalSet {
    pub input: Option<Arc<Signal>>,
    pub output: Option<Arc<Signal>>,
    pub model: Option<Arc<Signal>>,
}

impl SignalSet {
    pub fn get(&self, role: SignalRole) -> Option<Arc<Signal>> {
        match role {
            SignalRole::Input => self.input.clone(),
            SignalRole::Output => self.output.clone(),
            SignalRole::Model => self.model.clone(),
        }
    }
}

/// Everything a renderer needs for one frame.
#[derive(Debug, Clone)]
pub struct RenderState {
    pub status: TransportStatus,
    pub playback: PlaybackState,
    pub duration: f64,
    pub window: TimeWindow,
    /// Window the traces below were fetched for.
    pub rendered_window: Option<TimeWindow>,
    pub input_waveform: Trace,
    pub output_waveform: Trace,
    pub input_fft: Trace,
    pub output_fft: Trace,
    pub fft_scale: FreqScale,
    pub loading: bool,
    pub equalizing: bool,
    pub error: Option<String>,
    pub upload: UploadState,
    pub settings: EqualizerSettings,
    pub signals: SignalSet,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            status: TransportStatus::Stopped,
            playback: PlaybackState::default(),
            duration: 0.0,
            window: TimeWindow::default(),
            rendered_window: None,
            input_waveform: Trace::default(),
            output_waveform: Trace::default(),
            input_fft: Trace::default(),
            output_fft: Trace::default(),
            fft_scale: FreqScale::Linear,
            loading: false,
            equalizing: false,
            error: None,
            upload: UploadState::Idle,
            settings: EqualizerSettings::default(),
            signals: SignalSet::default(),
        }
    }
}

pub struct Session {
    config: EngineConfig,
    controller: PlaybackController,
    scheduler: FetchScheduler,
    upload_seq: RequestSequence,
    equalize_seq: RequestSequence,
    last_response: Option<WindowResponse>,
    dispatched_window: Option<(u64, TimeWindow)>,
    render: RenderState,
}

impl Session {
    pub fn new(config: EngineConfig, settings: EqualizerSettings) -> Self {
        let render = RenderState { fft_scale: config.fft_scale, settings, ..Default::default() };
        let mut session = Self {
            controller: PlaybackController::new(config.controller),
            scheduler: FetchScheduler::new(config.fetch_throttle),
            upload_seq: RequestSequence::new(),
            equalize_seq: RequestSequence::new(),
            last_response: None,
            dispatched_window: None,
            render,
            config,
        };
        session.refresh();
        session
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn render(&self) -> &RenderState {
        &self.render
    }

    pub fn snapshot(&self) -> PlaybackState {
        self.controller.snapshot()
    }

    pub fn status(&self) -> TransportStatus {
        self.controller.status()
    }

    pub fn signal(&self, role: SignalRole) -> Option<Arc<Signal>> {
        self.render.signals.get(role)
    }

    pub fn window_sequence(&self) -> RequestSequence {
        self.scheduler.sequence().clone()
    }

    pub fn upload_sequence(&self) -> RequestSequence {
        self.upload_seq.clone()
    }

    pub fn equalize_sequence(&self) -> RequestSequence {
        self.equalize_seq.clone()
    }

    // ─── Signal lifecycle ──────────────────────────────────────────────────────

    /// Replace the input signal. Resets playback, orphans every in-flight
    /// request and starts an upload.
    pub fn load_signal(&mut self, signal: Signal) -> Vec<Effect> {
        let mut effects = vec![Effect::CancelClock];

        self.scheduler.invalidate();
        self.scheduler.clear_error();
        self.equalize_seq.invalidate();
        self.last_response = None;
        self.dispatched_window = None;
        self.clear_traces();
        self.render.error = None;
        self.render.equalizing = false;

        let signal = Arc::new(signal);
        self.render.signals = SignalSet {
            input: Some(Arc::clone(&signal)),
            output: Some(Arc::clone(&signal)),
            model: None,
        };

        if signal.is_empty() {
            self.upload_seq.invalidate();
            self.controller.unload();
            self.render.upload = UploadState::Failed("Signal is empty".to_string());
            log::warn!("[Session] refusing to upload an empty signal");
            self.refresh();
            return effects;
        }

        self.controller.load(signal.duration_seconds);
        let seq = self.upload_seq.next();
        self.render.upload = UploadState::Pending;
        log::info!(
            "[Session] loaded signal: {:.2}s @ {} Hz ({} samples), uploading #{}",
            signal.duration_seconds, signal.sample_rate, signal.num_samples(), seq
        );

        effects.push(Effect::Upload {
            seq,
            request: UploadRequest {
                signal: signal.samples.clone(),
                sample_rate: signal.sample_rate,
                duration: signal.duration_seconds,
            },
        });
        self.refresh();
        effects
    }

    /// Output and model signals are replaced wholesale; the input goes
    /// through `load_signal`.
    pub fn set_signal(&mut self, role: SignalRole, signal: Signal) -> Vec<Effect> {
        match role {
            SignalRole::Input => return self.load_signal(signal),
            SignalRole::Output => self.render.signals.output = Some(Arc::new(signal)),
            SignalRole::Model => self.render.signals.model = Some(Arc::new(signal)),
        }
        Vec::new()
    }

    pub fn on_uploaded(&mut self, now: Instant, seq: u64, result: Result<String, BackendError>) -> Vec<Effect> {
        if !self.upload_seq.is_current(seq) {
            log::debug!("[Session] ignoring stale upload #{}", seq);
            return Vec::new();
        }

        let mut effects = Vec::new();
        match result {
            Ok(signal_id) => {
                log::info!("[Session] upload ready: {}", signal_id);
                self.render.upload = UploadState::Ready(signal_id);
                self.controller.set_backend_ready(true);
                effects.extend(self.request_current_window(now));
            }
            Err(e) => {
                let message = format!("Upload failed: {}", e);
                log::warn!("[Session] {}", message);
                self.render.upload = UploadState::Failed(message);
                self.controller.set_backend_ready(false);
            }
        }
        self.refresh();
        effects
    }

    // ─── User input ────────────────────────────────────────────────────────────

    pub fn handle_action(&mut self, now: Instant, action: UserAction) -> Vec<Effect> {
        let mut effects = Vec::new();
        let was_playing = self.controller.status() == TransportStatus::Playing;

        match action {
            UserAction::Play => {
                if self.controller.play() {
                    effects.push(Effect::ArmClock);
                    effects.extend(self.request_current_window(now));
                }
            }
            UserAction::Pause => {
                if self.controller.pause() {
                    effects.push(Effect::CancelClock);
                    effects.extend(self.request_current_window(now));
                }
            }
            UserAction::TogglePlay => {
                let next = if was_playing { UserAction::Pause } else { UserAction::Play };
                return self.handle_action(now, next);
            }
            UserAction::Stop => {
                self.controller.reset();
                self.scheduler.invalidate();
                effects.push(Effect::CancelClock);
                effects.extend(self.request_current_window(now));
            }
            UserAction::BeginScrub => {
                if self.controller.begin_scrub() && was_playing {
                    effects.push(Effect::CancelClock);
                }
            }
            UserAction::ScrubTo(time) => {
                if self.controller.scrub_to(time) {
                    if was_playing {
                        effects.push(Effect::CancelClock);
                    }
                    effects.extend(self.request_current_window(now));
                }
            }
            UserAction::EndScrub => self.controller.end_scrub(),
            UserAction::SetSpeed(speed) => {
                self.controller.set_speed(speed);
            }
            UserAction::ZoomTo(zoom) => {
                if self.controller.zoom_to(zoom) {
                    effects.extend(self.request_current_window(now));
                }
            }
            UserAction::ZoomBy(factor) => {
                if self.controller.zoom_by(factor) {
                    effects.extend(self.request_current_window(now));
                }
            }
            UserAction::ZoomAt { zoom, anchor_fraction } => {
                if self.controller.zoom_at(zoom, anchor_fraction) {
                    effects.extend(self.request_current_window(now));
                }
            }
            UserAction::SetGain { index, gain } => {
                if self.render.settings.set_gain(index, gain) {
                    effects.extend(self.request_equalize());
                    effects.extend(self.request_current_window(now));
                }
            }
            UserAction::ResetGains => {
                if !self.render.settings.is_flat() {
                    self.render.settings.reset_gains();
                    effects.extend(self.request_equalize());
                    effects.extend(self.request_current_window(now));
                }
            }
            UserAction::ApplyMode(settings) => {
                log::info!("[Session] switching to mode '{}'", settings.mode);
                self.render.settings = settings;
                self.scheduler.invalidate();
                self.equalize_seq.invalidate();
                effects.extend(self.request_equalize());
                effects.extend(self.request_current_window(now));
            }
            UserAction::SetFreqScale(scale) => {
                self.render.fft_scale = scale;
                self.rebuild_fft_traces();
            }
            UserAction::ClearError => {
                self.scheduler.clear_error();
                self.render.error = None;
            }
        }

        self.refresh();
        effects
    }

    // ─── Clock ─────────────────────────────────────────────────────────────────

    pub fn on_tick(&mut self, now: Instant, elapsed: Duration) -> Vec<Effect> {
        let mut effects = Vec::new();
        match self.controller.tick(elapsed) {
            TickOutcome::Idle => return effects,
            TickOutcome::Advanced => effects.extend(self.request_current_window(now)),
            TickOutcome::Ended => {
                log::info!("[Session] playback reached the end");
                effects.push(Effect::CancelClock);
                effects.extend(self.request_current_window(now));
            }
        }
        self.refresh();
        effects
    }

    // ─── Backend completions ───────────────────────────────────────────────────

    pub fn on_window_loaded(&mut self, seq: u64, result: Result<WindowResponse, BackendError>) {
        match self.scheduler.complete(seq, result) {
            FetchOutcome::Stale => return,
            FetchOutcome::Applied(response) => {
                self.render.rendered_window = self
                    .dispatched_window
                    .filter(|(dispatched, _)| *dispatched == seq)
                    .map(|(_, window)| window);
                self.last_response = Some(response);
                self.render.error = None;
                self.rebuild_traces();
            }
            FetchOutcome::Failed(_) => {}
        }
        self.refresh();
    }

    /// A fresh equalization replaces the Output signal. When not playing the
    /// visible window is refetched right away; while playing the next tick
    /// picks it up.
    pub fn on_equalized(&mut self, now: Instant, seq: u64, result: Result<Vec<f32>, BackendError>) -> Vec<Effect> {
        if !self.equalize_seq.is_current(seq) {
            log::debug!("[Session] ignoring stale equalization #{}", seq);
            return Vec::new();
        }
        let mut effects = Vec::new();
        self.render.equalizing = false;
        match result {
            Ok(samples) => {
                if let Some(input) = &self.render.signals.input {
                    let output = Signal::with_duration(samples, input.sample_rate, input.duration_seconds);
                    self.render.signals.output = Some(Arc::new(output));
                }
                if self.controller.status() != TransportStatus::Playing {
                    effects.extend(self.request_current_window(now));
                }
            }
            Err(e) => {
                let message = format!("Equalization failed: {}", e);
                log::warn!("[Session] {}", message);
                self.render.error = Some(message);
            }
        }
        self.refresh();
        effects
    }

    // ─── Internals ─────────────────────────────────────────────────────────────

    fn request_current_window(&mut self, now: Instant) -> Option<Effect> {
        let signal_id = self.render.upload.signal_id()?.to_string();
        if !self.controller.has_signal() {
            return None;
        }

        let snapshot = self.controller.snapshot();
        let window = self.controller.window();
        let request = WindowRequest {
            signal_id,
            settings: self.render.settings.clone(),
            time_start: window.start,
            time_end: window.end,
            is_playing: snapshot.is_playing,
        };

        let dispatch = self.scheduler.request_window(now, request)?;
        self.dispatched_window = Some((dispatch.seq, window));
        Some(Effect::FetchWindow(dispatch))
    }

    fn request_equalize(&mut self) -> Option<Effect> {
        let input = self.render.signals.input.clone()?;
        self.render.upload.signal_id()?;

        let seq = self.equalize_seq.next();
        self.render.equalizing = true;
        Some(Effect::Equalize {
            seq,
            request: EqualizeRequest {
                signal: input.samples.clone(),
                sample_rate: input.sample_rate,
                settings: self.render.settings.clone(),
            },
        })
    }

    fn clear_traces(&mut self) {
        self.render.input_waveform = Trace::default();
        self.render.output_waveform = Trace::default();
        self.render.input_fft = Trace::default();
        self.render.output_fft = Trace::default();
        self.render.rendered_window = None;
    }

    fn rebuild_traces(&mut self) {
        let Some(response) = &self.last_response else { return; };
        let max_points = self.config.waveform_max_points;
        self.render.input_waveform = traces::waveform_from_series(&response.input_waveform, max_points);
        self.render.output_waveform = traces::waveform_from_series(&response.output_waveform, max_points);
        self.rebuild_fft_traces();
    }

    fn rebuild_fft_traces(&mut self) {
        let Some(response) = &self.last_response else { return; };
        let (scale, max_points) = (self.render.fft_scale, self.config.fft_max_points);
        self.render.input_fft = traces::fft_from_series(response.input_fft.as_ref(), scale, max_points);
        self.render.output_fft = traces::fft_from_series(response.output_fft.as_ref(), scale, max_points);
    }

    /// Copy controller and scheduler state into the render snapshot.
    fn refresh(&mut self) {
        self.render.status = self.controller.status();
        self.render.playback = self.controller.snapshot();
        self.render.duration = self.controller.duration();
        self.render.window = self.controller.window();
        self.render.loading = self.scheduler.is_loading();
        if let Some(error) = self.scheduler.error() {
            self.render.error = Some(error.to_string());
        }
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::WaveformSeries;
    use crate::equalizer::Slider;

    const EPS: f64 = 1e-9;

    fn eq_settings() -> EqualizerSettings {
        EqualizerSettings::new("uniform", vec![Slider::range("Low", 0.0, 500.0), Slider::range("High", 500.0, 4000.0)])
    }

    fn ten_second_signal() -> Signal {
        Signal::new(vec![0.0; 1000], 100.0)
    }

    fn fetches(effects: &[Effect]) -> Vec<&Dispatch> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::FetchWindow(d) => Some(d),
                _ => None,
            })
            .collect()
    }

    fn ready_session(t0: Instant) -> Session {
        let mut session = Session::new(EngineConfig::default(), eq_settings());
        let effects = session.load_signal(ten_second_signal());
        let seq = match &effects[1] {
            Effect::Upload { seq, .. } => *seq,
            other => panic!("expected upload, got {:?}", other),
        };
        session.on_uploaded(t0, seq, Ok("sig-1".to_string()));
        session
    }

    fn response_marked(marker: f64) -> WindowResponse {
        WindowResponse {
            input_waveform: WaveformSeries { time: vec![marker, marker + 1.0], amplitude: vec![0.0, 1.0] },
            output_waveform: WaveformSeries { time: vec![marker], amplitude: vec![marker as f32] },
            ..Default::default()
        }
    }

    #[test]
    fn test_load_emits_upload_and_resets() {
        let mut session = Session::new(EngineConfig::default(), eq_settings());
        let effects = session.load_signal(ten_second_signal());
        assert_eq!(effects[0], Effect::CancelClock);
        match &effects[1] {
            Effect::Upload { request, .. } => {
                assert_eq!(request.sample_rate, 100.0);
                assert!((request.duration - 10.0).abs() < EPS);
            }
            other => panic!("expected upload, got {:?}", other),
        }
        assert_eq!(session.render().upload, UploadState::Pending);
        assert!(session.signal(SignalRole::Output).is_some());
    }

    #[test]
    fn test_no_fetch_before_upload_completes() {
        let t0 = Instant::now();
        let mut session = Session::new(EngineConfig::default(), eq_settings());
        session.load_signal(ten_second_signal());
        assert!(session.handle_action(t0, UserAction::Play).is_empty());
        assert!(fetches(&session.handle_action(t0, UserAction::ScrubTo(2.0))).is_empty());
    }

    #[test]
    fn test_upload_failure_is_terminal() {
        let t0 = Instant::now();
        let mut session = Session::new(EngineConfig::default(), eq_settings());
        let effects = session.load_signal(ten_second_signal());
        let Effect::Upload { seq, .. } = &effects[1] else { panic!("expected upload") };
        let effects = session.on_uploaded(t0, *seq, Err(BackendError::Network("refused".to_string())));
        assert!(effects.is_empty());
        assert!(matches!(session.render().upload, UploadState::Failed(ref m) if m.contains("refused")));
        assert!(session.handle_action(t0, UserAction::Play).is_empty());
    }

    #[test]
    fn test_stale_upload_ignored_after_reload() {
        let t0 = Instant::now();
        let mut session = Session::new(EngineConfig::default(), eq_settings());
        let first = session.load_signal(ten_second_signal());
        let Effect::Upload { seq: old, .. } = &first[1] else { panic!("expected upload") };
        session.load_signal(Signal::new(vec![0.0; 500], 100.0));
        session.on_uploaded(t0, *old, Ok("old".to_string()));
        assert_eq!(session.render().upload, UploadState::Pending);
    }

    #[test]
    fn test_empty_signal_is_rejected() {
        let mut session = Session::new(EngineConfig::default(), eq_settings());
        let effects = session.load_signal(Signal::new(Vec::new(), 44100.0));
        assert_eq!(effects, vec![Effect::CancelClock]);
        assert!(matches!(session.render().upload, UploadState::Failed(_)));
    }

    #[test]
    fn test_play_arms_clock_and_fetches() {
        let t0 = Instant::now();
        let mut session = ready_session(t0);
        let effects = session.handle_action(t0 + Duration::from_secs(1), UserAction::Play);
        assert_eq!(effects[0], Effect::ArmClock);
        let f = fetches(&effects);
        assert_eq!(f.len(), 1);
        assert!(f[0].request.is_playing);
        assert!(!f[0].shows_loading);
        assert_eq!(f[0].request.signal_id, "sig-1");
    }

    #[test]
    fn test_ticks_within_throttle_dispatch_once() {
        let t0 = Instant::now();
        let mut session = ready_session(t0);
        let start = t0 + Duration::from_secs(1);
        session.handle_action(start, UserAction::ScrubTo(3.0));
        session.handle_action(start, UserAction::Play);

        let a = session.on_tick(start + Duration::from_millis(60), Duration::from_millis(60));
        let b = session.on_tick(start + Duration::from_millis(80), Duration::from_millis(20));
        assert_eq!(fetches(&a).len(), 1);
        assert!(fetches(&b).is_empty());
    }

    #[test]
    fn test_e2e_playback_ends_on_last_window() {
        let t0 = Instant::now();
        let mut session = ready_session(t0);
        session.handle_action(t0, UserAction::Play);

        let tick = Duration::from_millis(50);
        let mut now = t0;
        let mut cancels = 0;
        let mut last_fetch = None;
        for _ in 0..170 {
            now += tick;
            let effects = session.on_tick(now, tick);
            cancels += effects.iter().filter(|e| **e == Effect::CancelClock).count();
            if let Some(d) = fetches(&effects).last() {
                last_fetch = Some((*d).clone());
            }
        }

        assert_eq!(cancels, 1);
        assert_eq!(session.status(), TransportStatus::Stopped);
        let w = session.render().window;
        assert!((w.start - 8.0).abs() < EPS);
        assert!((w.end - 10.0).abs() < EPS);

        let last = last_fetch.unwrap();
        assert!(!last.request.is_playing);
        assert!((last.request.time_start - 8.0).abs() < EPS);
        assert!(session.render().loading);
    }

    #[test]
    fn test_e2e_paused_zoom_anchor() {
        let t0 = Instant::now();
        let mut session = ready_session(t0);
        session.handle_action(t0, UserAction::ScrubTo(3.0));
        let effects = session.handle_action(t0, UserAction::ZoomTo(2.0));
        let f = fetches(&effects);
        assert_eq!(f.len(), 1);
        assert!((f[0].request.time_start - 3.0).abs() < EPS);
        assert!((f[0].request.time_end - 4.0).abs() < EPS);
    }

    #[test]
    fn test_pointer_zoom_keeps_time_under_pointer() {
        let t0 = Instant::now();
        let mut session = ready_session(t0);
        session.handle_action(t0, UserAction::ScrubTo(3.0));
        // Pointer in the middle of [3, 5) sits on 4.0
        let effects = session.handle_action(t0, UserAction::ZoomAt { zoom: 2.0, anchor_fraction: 0.5 });
        let f = fetches(&effects);
        assert_eq!(f.len(), 1);
        assert!((f[0].request.time_start - 3.5).abs() < EPS);
        assert!((f[0].request.time_end - 4.5).abs() < EPS);
        assert!((session.render().playback.current_time - 3.5).abs() < EPS);
    }

    #[test]
    fn test_latest_window_wins_out_of_order() {
        let t0 = Instant::now();
        let mut session = ready_session(t0);
        let a = session.handle_action(t0, UserAction::ScrubTo(1.0));
        let b = session.handle_action(t0, UserAction::ScrubTo(5.0));
        let (seq_a, seq_b) = (fetches(&a)[0].seq, fetches(&b)[0].seq);

        session.on_window_loaded(seq_b, Ok(response_marked(5.0)));
        session.on_window_loaded(seq_a, Ok(response_marked(1.0)));

        let render = session.render();
        assert_eq!(render.output_waveform.y, vec![5.0]);
        assert_eq!(render.rendered_window.unwrap().start, 5.0);
        // Waveform x axis is re-based to the window start
        assert_eq!(render.input_waveform.x, vec![0.0, 1.0]);
        assert!(!render.loading);
    }

    #[test]
    fn test_fetch_error_keeps_playback() {
        let t0 = Instant::now();
        let mut session = ready_session(t0);
        let effects = session.handle_action(t0 + Duration::from_secs(1), UserAction::Play);
        let seq = fetches(&effects)[0].seq;
        let before = session.snapshot();

        session.on_window_loaded(seq, Err(BackendError::Status { status: 502, message: "gateway".to_string() }));
        assert_eq!(session.snapshot(), before);
        assert_eq!(session.status(), TransportStatus::Playing);
        assert!(session.render().error.as_deref().unwrap().contains("gateway"));

        session.handle_action(t0, UserAction::ClearError);
        assert!(session.render().error.is_none());
    }

    #[test]
    fn test_stop_invalidates_in_flight() {
        let t0 = Instant::now();
        let mut session = ready_session(t0);
        let effects = session.handle_action(t0, UserAction::ScrubTo(4.0));
        let seq = fetches(&effects)[0].seq;

        let effects = session.handle_action(t0, UserAction::Stop);
        assert!(effects.contains(&Effect::CancelClock));
        session.on_window_loaded(seq, Ok(response_marked(4.0)));
        assert!(session.render().output_waveform.is_empty());
        assert_eq!(session.snapshot(), PlaybackState::default());
    }

    #[test]
    fn test_scrub_while_playing_pauses_and_cancels_clock() {
        let t0 = Instant::now();
        let mut session = ready_session(t0);
        session.handle_action(t0, UserAction::Play);
        let effects = session.handle_action(t0, UserAction::BeginScrub);
        assert_eq!(effects, vec![Effect::CancelClock]);
        assert_eq!(session.status(), TransportStatus::Paused);
        assert!(session.on_tick(t0, Duration::from_millis(50)).is_empty());
    }

    #[test]
    fn test_gain_change_requests_equalization() {
        let t0 = Instant::now();
        let mut session = ready_session(t0);
        let effects = session.handle_action(t0, UserAction::SetGain { index: 1, gain: 0.5 });
        let seq = effects
            .iter()
            .find_map(|e| match e {
                Effect::Equalize { seq, request } => {
                    assert_eq!(request.settings.sliders[1].gain, 0.5);
                    Some(*seq)
                }
                _ => None,
            })
            .unwrap();
        assert!(session.render().equalizing);
        assert_eq!(fetches(&effects).len(), 1);

        let effects = session.on_equalized(t0, seq, Ok(vec![0.25; 1000]));
        assert!(fetches(&effects)[0].shows_loading);
        let output = session.signal(SignalRole::Output).unwrap();
        assert_eq!(output.samples[0], 0.25);
        assert!((output.duration_seconds - 10.0).abs() < EPS);
        assert!(!session.render().equalizing);
        // Input untouched
        assert_eq!(session.signal(SignalRole::Input).unwrap().samples[0], 0.0);
    }

    #[test]
    fn test_reset_gains_only_when_not_flat() {
        let t0 = Instant::now();
        let mut session = ready_session(t0);
        assert!(session.handle_action(t0, UserAction::ResetGains).is_empty());

        session.handle_action(t0, UserAction::SetGain { index: 0, gain: 1.8 });
        let effects = session.handle_action(t0, UserAction::ResetGains);
        assert!(effects.iter().any(|e| matches!(e, Effect::Equalize { .. })));
        assert!(session.render().settings.is_flat());
    }

    #[test]
    fn test_stale_equalization_ignored() {
        let t0 = Instant::now();
        let mut session = ready_session(t0);
        let first = session.handle_action(t0, UserAction::SetGain { index: 0, gain: 0.2 });
        session.handle_action(t0, UserAction::SetGain { index: 0, gain: 0.4 });
        let old = first.iter().find_map(|e| match e {
            Effect::Equalize { seq, .. } => Some(*seq),
            _ => None,
        });
        let effects = session.on_equalized(t0, old.unwrap(), Ok(vec![9.0; 1000]));
        assert!(effects.is_empty());
        assert_eq!(session.signal(SignalRole::Output).unwrap().samples[0], 0.0);
        assert!(session.render().equalizing);
    }

    #[test]
    fn test_mode_switch_invalidates_requests() {
        let t0 = Instant::now();
        let mut session = ready_session(t0);
        let effects = session.handle_action(t0, UserAction::ScrubTo(2.0));
        let old = fetches(&effects)[0].seq;

        let animal = EqualizerSettings::new("animal", vec![Slider::voice("Dog", "dog")]);
        let effects = session.handle_action(t0, UserAction::ApplyMode(animal));
        assert!(effects.iter().any(|e| matches!(e, Effect::Equalize { .. })));
        assert_eq!(fetches(&effects)[0].request.settings.mode, "animal");

        session.on_window_loaded(old, Ok(response_marked(2.0)));
        assert!(session.render().output_waveform.is_empty());
    }

    #[test]
    fn test_freq_scale_rebuilds_without_fetch() {
        let t0 = Instant::now();
        let mut session = ready_session(t0);
        let effects = session.handle_action(t0, UserAction::ScrubTo(2.0));
        let seq = fetches(&effects)[0].seq;
        let response = WindowResponse {
            input_fft: Some(crate::backend::SpectrumSeries {
                frequencies: vec![60.0, 125.0, 5000.0],
                magnitudes: vec![1.0, 2.0, 3.0],
            }),
            ..Default::default()
        };
        session.on_window_loaded(seq, Ok(response));
        assert_eq!(session.render().input_fft.len(), 3);

        let effects = session.handle_action(t0, UserAction::SetFreqScale(FreqScale::Audiogram));
        assert!(effects.is_empty());
        assert_eq!(session.render().input_fft.x, vec![125.0]);
    }
}
