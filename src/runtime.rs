// ============================================================================
// RUNTIME.RS - Async event loop around the session
// ============================================================================
//
// One tokio task owns the Session. User commands, clock ticks and backend
// completions all arrive on the same channel and are handled one at a time,
// so the session never needs a lock. Backend calls run as detached tasks and
// post their result back; each one holds a clone of the relevant
// RequestSequence and drops its result if a newer request (or a reset) has
// happened in the meantime.
//
// After every event the current RenderState is published on a watch channel.
// ============================================================================

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::backend::{Backend, BackendError, WindowResponse};
use crate::engine::clock::{ClockDriver, Tick};
use crate::engine::fetch::RequestSequence;
use crate::engine::session::{Effect, EngineConfig, RenderState, Session, UserAction};
use crate::equalizer::EqualizerSettings;
use crate::signal::{Signal, SignalRole};

#[derive(Debug)]
pub enum Command {
    LoadSignal(Signal),
    SetSignal(SignalRole, Signal),
    Action(UserAction),
    Shutdown,
}

enum Event {
    Command(Command),
    Tick(Tick),
    WindowLoaded { seq: u64, result: Result<WindowResponse, BackendError> },
    Uploaded { seq: u64, result: Result<String, BackendError> },
    Equalized { seq: u64, result: Result<Vec<f32>, BackendError> },
}

/// Front door to a running viewer.
pub struct ViewerHandle {
    events: mpsc::UnboundedSender<Event>,
    render: watch::Receiver<RenderState>,
    task: JoinHandle<()>,
}

impl ViewerHandle {
    /// Returns false once the event loop has exited.
    pub fn send(&self, command: Command) -> bool {
        self.events.send(Event::Command(command)).is_ok()
    }

    pub fn action(&self, action: UserAction) -> bool {
        self.send(Command::Action(action))
    }

    pub fn load_signal(&self, signal: Signal) -> bool {
        self.send(Command::LoadSignal(signal))
    }

    /// Latest published state.
    pub fn render(&self) -> RenderState {
        self.render.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RenderState> {
        self.render.clone()
    }

    pub async fn shutdown(self) {
        let _ = self.events.send(Event::Command(Command::Shutdown));
        if let Err(e) = self.task.await {
            log::warn!("[Runtime] event loop ended abnormally: {}", e);
        }
    }
}

/// Start the event loop on the current tokio runtime.
pub fn spawn_viewer(backend: Arc<dyn Backend>, config: EngineConfig, settings: EqualizerSettings) -> ViewerHandle {
    let session = Session::new(config, settings);
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (render_tx, render_rx) = watch::channel(session.render().clone());

    let event_loop = EventLoop {
        clock: ClockDriver::new(session.config().tick_rate_hz),
        session,
        backend,
        events_tx: events_tx.clone(),
        render_tx,
    };
    let task = tokio::spawn(event_loop.run(events_rx));

    ViewerHandle { events: events_tx, render: render_rx, task }
}

struct EventLoop {
    session: Session,
    clock: ClockDriver,
    backend: Arc<dyn Backend>,
    events_tx: mpsc::UnboundedSender<Event>,
    render_tx: watch::Sender<RenderState>,
}

impl EventLoop {
    async fn run(mut self, mut events: mpsc::UnboundedReceiver<Event>) {
        log::debug!("[Runtime] event loop started");

        while let Some(event) = events.recv().await {
            let now = tokio::time::Instant::now().into_std();
            let effects = match event {
                Event::Command(Command::Shutdown) => break,
                Event::Command(Command::LoadSignal(signal)) => self.session.load_signal(signal),
                Event::Command(Command::SetSignal(role, signal)) => self.session.set_signal(role, signal),
                Event::Command(Command::Action(action)) => self.session.handle_action(now, action),
                Event::Tick(tick) => {
                    // Queued before a cancel; never observable
                    if !self.clock.is_live(&tick) {
                        continue;
                    }
                    self.session.on_tick(now, tick.elapsed)
                }
                Event::WindowLoaded { seq, result } => {
                    self.session.on_window_loaded(seq, result);
                    Vec::new()
                }
                Event::Uploaded { seq, result } => self.session.on_uploaded(now, seq, result),
                Event::Equalized { seq, result } => self.session.on_equalized(now, seq, result),
            };

            for effect in effects {
                self.apply(effect);
            }
            self.render_tx.send_replace(self.session.render().clone());
        }

        self.clock.cancel();
        log::debug!("[Runtime] event loop stopped");
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::ArmClock => self.clock.arm(self.events_tx.clone(), Event::Tick),
            Effect::CancelClock => self.clock.cancel(),
            Effect::FetchWindow(dispatch) => {
                let backend = Arc::clone(&self.backend);
                let sequence = self.session.window_sequence();
                let seq = dispatch.seq;
                spawn_request(self.events_tx.clone(), sequence, seq, "window", async move {
                    let result = backend.fetch_window(&dispatch.request).await;
                    Event::WindowLoaded { seq, result }
                });
            }
            Effect::Upload { seq, request } => {
                let backend = Arc::clone(&self.backend);
                spawn_request(self.events_tx.clone(), self.session.upload_sequence(), seq, "upload", async move {
                    let result = backend.upload(&request).await;
                    Event::Uploaded { seq, result }
                });
            }
            Effect::Equalize { seq, request } => {
                let backend = Arc::clone(&self.backend);
                spawn_request(self.events_tx.clone(), self.session.equalize_sequence(), seq, "equalize", async move {
                    let result = backend.equalize(&request).await;
                    Event::Equalized { seq, result }
                });
            }
        }
    }
}

/// Run one backend call off the loop. The result is posted only if `seq` is
/// still the current value of `sequence` when the call returns.
fn spawn_request<F>(events: mpsc::UnboundedSender<Event>, sequence: RequestSequence, seq: u64, what: &'static str, call: F)
where
    F: Future<Output = Event> + Send + 'static,
{
    tokio::spawn(async move {
        let event = call.await;
        if !sequence.is_current(seq) {
            log::debug!("[Runtime] dropping stale {} result #{}", what, seq);
            return;
        }
        let _ = events.send(event);
    });
}

// ============================================================================
// UNIT TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{EqualizeRequest, UploadRequest, WaveformSeries, WindowRequest};
    use crate::engine::controller::TransportStatus;
    use crate::engine::session::UploadState;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Backend that answers from memory. Window responses echo the requested
    /// start time so tests can tell responses apart.
    #[derive(Default)]
    struct MemoryBackend {
        windows: Mutex<Vec<WindowRequest>>,
        equalized: Mutex<usize>,
        /// Per-call latency for window fetches, consumed front to back.
        delays: Mutex<Vec<Duration>>,
        fail_upload: bool,
    }

    #[async_trait::async_trait]
    impl Backend for MemoryBackend {
        async fn upload(&self, request: &UploadRequest) -> Result<String, BackendError> {
            if self.fail_upload {
                return Err(BackendError::Status { status: 400, message: "bad audio".to_string() });
            }
            Ok(format!("mem-{}", request.signal.len()))
        }

        async fn fetch_window(&self, request: &WindowRequest) -> Result<WindowResponse, BackendError> {
            let delay = {
                self.windows.lock().unwrap().push(request.clone());
                let mut delays = self.delays.lock().unwrap();
                if delays.is_empty() { Duration::from_millis(5) } else { delays.remove(0) }
            };
            tokio::time::sleep(delay).await;
            let series = WaveformSeries {
                time: vec![request.time_start, request.time_start + 0.5],
                amplitude: vec![request.time_start as f32, 0.0],
            };
            Ok(WindowResponse { input_waveform: series.clone(), output_waveform: series, ..Default::default() })
        }

        async fn equalize(&self, request: &EqualizeRequest) -> Result<Vec<f32>, BackendError> {
            *self.equalized.lock().unwrap() += 1;
            let gain = request.settings.sliders.first().map(|s| s.gain).unwrap_or(1.0);
            Ok(request.signal.iter().map(|s| s * gain).collect())
        }
    }

    fn ten_seconds() -> Signal {
        Signal::new(vec![0.5; 1000], 100.0)
    }

    async fn ready_viewer(backend: Arc<MemoryBackend>) -> ViewerHandle {
        let settings = crate::modes::BuiltinModes::all()[1].settings();
        let handle = spawn_viewer(backend, EngineConfig::default(), settings);
        handle.load_signal(ten_seconds());
        let mut rx = handle.subscribe();
        rx.wait_for(|r| matches!(r.upload, UploadState::Ready(_))).await.unwrap();
        handle
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_then_initial_window() {
        let backend = Arc::new(MemoryBackend::default());
        let handle = ready_viewer(Arc::clone(&backend)).await;
        let mut rx = handle.subscribe();
        rx.wait_for(|r| r.rendered_window.is_some()).await.unwrap();

        let render = handle.render();
        assert_eq!(render.upload, UploadState::Ready("mem-1000".to_string()));
        assert_eq!(render.rendered_window.unwrap().end, 2.0);
        assert!(!render.loading);
        assert_eq!(backend.windows.lock().unwrap()[0].signal_id, "mem-1000");
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_failure_blocks_fetching() {
        let backend = Arc::new(MemoryBackend { fail_upload: true, ..Default::default() });
        let handle = spawn_viewer(backend.clone(), EngineConfig::default(), EqualizerSettings::default());
        handle.load_signal(ten_seconds());
        let mut rx = handle.subscribe();
        rx.wait_for(|r| matches!(r.upload, UploadState::Failed(_))).await.unwrap();

        handle.action(UserAction::Play);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(handle.render().status, TransportStatus::Stopped);
        assert!(backend.windows.lock().unwrap().is_empty());
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_e2e_playback_auto_stops_on_last_window() {
        let backend = Arc::new(MemoryBackend::default());
        let handle = ready_viewer(Arc::clone(&backend)).await;

        handle.action(UserAction::Play);
        tokio::time::sleep(Duration::from_millis(8500)).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        let render = handle.render();
        assert_eq!(render.status, TransportStatus::Stopped);
        assert!(!render.playback.is_playing);
        assert!((render.window.start - 8.0).abs() < 1e-9);
        assert!((render.window.end - 10.0).abs() < 1e-9);
        assert_eq!(render.rendered_window.map(|w| w.start), Some(render.window.start));

        // Playing requests were throttled well below the tick rate
        let sent = backend.windows.lock().unwrap().len();
        assert!(sent > 10 && sent < 8 * 30, "sent {} window requests", sent);

        // No ticks after the auto-stop
        let parked = handle.render().playback.current_time;
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(handle.render().playback.current_time, parked);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_cancels_clock() {
        let handle = ready_viewer(Arc::new(MemoryBackend::default())).await;
        handle.action(UserAction::Play);
        tokio::time::sleep(Duration::from_millis(1000)).await;
        handle.action(UserAction::Pause);
        tokio::time::sleep(Duration::from_millis(10)).await;

        let paused_at = handle.render().playback.current_time;
        assert!(paused_at > 0.5);
        tokio::time::sleep(Duration::from_secs(2)).await;
        let render = handle.render();
        assert_eq!(render.status, TransportStatus::Paused);
        assert_eq!(render.playback.current_time, paused_at);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_old_response_never_overwrites_newer() {
        let backend = Arc::new(MemoryBackend::default());
        let handle = ready_viewer(Arc::clone(&backend)).await;
        let mut rx = handle.subscribe();
        rx.wait_for(|r| r.rendered_window.is_some()).await.unwrap();

        *backend.delays.lock().unwrap() = vec![Duration::from_millis(500), Duration::from_millis(10)];
        handle.action(UserAction::ScrubTo(1.0));
        handle.action(UserAction::ScrubTo(5.0));
        tokio::time::sleep(Duration::from_secs(1)).await;

        let render = handle.render();
        assert_eq!(render.rendered_window.unwrap().start, 5.0);
        assert_eq!(render.input_waveform.y[0], 5.0);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_gain_change_refreshes_output_signal() {
        let backend = Arc::new(MemoryBackend::default());
        let handle = ready_viewer(Arc::clone(&backend)).await;

        handle.action(UserAction::SetGain { index: 0, gain: 2.0 });
        let mut rx = handle.subscribe();
        rx.wait_for(|r| !r.equalizing && r.signals.output.as_ref().is_some_and(|s| s.samples[0] == 1.0))
            .await
            .unwrap();

        let render = handle.render();
        assert_eq!(render.signals.input.as_ref().unwrap().samples[0], 0.5);
        assert_eq!(*backend.equalized.lock().unwrap(), 1);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_resets_everything() {
        let handle = ready_viewer(Arc::new(MemoryBackend::default())).await;
        handle.action(UserAction::ZoomTo(4.0));
        handle.action(UserAction::SetSpeed(2.0));
        handle.action(UserAction::Play);
        tokio::time::sleep(Duration::from_millis(500)).await;
        handle.action(UserAction::Stop);
        tokio::time::sleep(Duration::from_millis(100)).await;

        let render = handle.render();
        assert_eq!(render.status, TransportStatus::Stopped);
        assert_eq!(render.playback, crate::engine::controller::PlaybackState::default());
        handle.shutdown().await;
    }
}
