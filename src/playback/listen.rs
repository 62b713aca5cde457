use std::sync::Arc;

use anyhow::{Result, bail};

use crate::engine::window::TimeWindow;
use crate::signal::{Signal, SignalRole};

/// An exclusive output voice. Starting a buffer replaces whatever was playing.
pub trait AudioOutput {
    fn start(&mut self, samples: Arc<Vec<f32>>, sample_rate: u32) -> Result<()>;
    fn stop(&mut self);
    fn is_active(&self) -> bool;
}

/// Plays a whole signal once. At most one voice is audible at a time.
pub struct AudioPlaybackAdapter<O: AudioOutput> {
    output: O,
    current: Option<SignalRole>,
}

impl<O: AudioOutput> AudioPlaybackAdapter<O> {
    pub fn new(output: O) -> Self {
        Self { output, current: None }
    }

    /// Stop the previous voice, then start `signal` from its first sample.
    pub fn play(&mut self, role: SignalRole, signal: &Signal) -> Result<()> {
        self.start(role, signal, &signal.samples)?;
        log::info!("[Listen] playing {} ({:.2}s)", role.name(), signal.duration_seconds);
        Ok(())
    }

    /// Like `play`, but only the samples under `window`.
    pub fn play_window(&mut self, role: SignalRole, signal: &Signal, window: &TimeWindow) -> Result<()> {
        self.start(role, signal, signal.window_slice(window))?;
        log::info!("[Listen] playing {} [{:.2}, {:.2})", role.name(), window.start, window.end);
        Ok(())
    }

    fn start(&mut self, role: SignalRole, signal: &Signal, samples: &[f32]) -> Result<()> {
        self.stop();

        if signal.is_empty() || samples.is_empty() {
            bail!("{} signal is empty", role.name());
        }
        let sample_rate = signal.sample_rate.round();
        if !(sample_rate.is_finite() && sample_rate >= 1.0) {
            bail!("Invalid sample rate: {}", signal.sample_rate);
        }

        self.output.start(Arc::new(samples.to_vec()), sample_rate as u32)?;
        self.current = Some(role);
        Ok(())
    }

    pub fn stop(&mut self) {
        if self.current.take().is_some() || self.output.is_active() {
            self.output.stop();
        }
    }

    /// Role of the buffer still sounding, if any.
    pub fn playing(&self) -> Option<SignalRole> {
        self.current.filter(|_| self.output.is_active())
    }

    pub fn output(&self) -> &O {
        &self.output
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct MockOutput {
        started: Vec<(usize, u32)>,
        stops: usize,
        active: bool,
        fail: bool,
    }

    impl AudioOutput for MockOutput {
        fn start(&mut self, samples: Arc<Vec<f32>>, sample_rate: u32) -> Result<()> {
            if self.fail {
                bail!("no device");
            }
            assert!(!self.active, "previous voice still active");
            self.started.push((samples.len(), sample_rate));
            self.active = true;
            Ok(())
        }

        fn stop(&mut self) {
            self.stops += 1;
            self.active = false;
        }

        fn is_active(&self) -> bool {
            self.active
        }
    }

    #[test]
    fn test_play_starts_full_buffer() {
        let mut adapter = AudioPlaybackAdapter::new(MockOutput::default());
        adapter.play(SignalRole::Input, &Signal::new(vec![0.1; 441], 44100.0)).unwrap();
        assert_eq!(adapter.output().started, vec![(441, 44100)]);
        assert_eq!(adapter.playing(), Some(SignalRole::Input));
    }

    #[test]
    fn test_new_play_stops_previous_voice() {
        let mut adapter = AudioPlaybackAdapter::new(MockOutput::default());
        adapter.play(SignalRole::Input, &Signal::new(vec![0.0; 100], 8000.0)).unwrap();
        adapter.play(SignalRole::Output, &Signal::new(vec![0.0; 50], 8000.0)).unwrap();
        assert_eq!(adapter.output().stops, 1);
        assert_eq!(adapter.output().started.len(), 2);
        assert_eq!(adapter.playing(), Some(SignalRole::Output));
    }

    #[test]
    fn test_rejects_empty_signal() {
        let mut adapter = AudioPlaybackAdapter::new(MockOutput::default());
        assert!(adapter.play(SignalRole::Model, &Signal::new(Vec::new(), 8000.0)).is_err());
        assert!(adapter.output().started.is_empty());
        assert_eq!(adapter.playing(), None);
    }

    #[test]
    fn test_device_failure_surfaces() {
        let mut adapter = AudioPlaybackAdapter::new(MockOutput { fail: true, ..Default::default() });
        assert!(adapter.play(SignalRole::Input, &Signal::new(vec![0.0; 10], 8000.0)).is_err());
        assert_eq!(adapter.playing(), None);
    }

    #[test]
    fn test_play_window_starts_visible_samples() {
        let mut adapter = AudioPlaybackAdapter::new(MockOutput::default());
        // 100 samples standing in for 10 s, so 10 samples per second
        let signal = Signal::with_duration(vec![0.0; 100], 10.0, 10.0);
        adapter.play_window(SignalRole::Output, &signal, &TimeWindow { start: 2.0, end: 4.0 }).unwrap();
        assert_eq!(adapter.output().started, vec![(20, 10)]);
        assert_eq!(adapter.playing(), Some(SignalRole::Output));

        // A window past the end leaves nothing to play
        let past_end = TimeWindow { start: 12.0, end: 14.0 };
        assert!(adapter.play_window(SignalRole::Output, &signal, &past_end).is_err());
        assert_eq!(adapter.playing(), None);
    }

    #[test]
    fn test_finished_voice_is_not_playing() {
        let mut adapter = AudioPlaybackAdapter::new(MockOutput::default());
        adapter.play(SignalRole::Input, &Signal::new(vec![0.0; 10], 8000.0)).unwrap();
        adapter.output.active = false;
        assert_eq!(adapter.playing(), None);
    }
}
