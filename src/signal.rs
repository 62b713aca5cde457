use anyhow::{Context, Result};
use hound::{SampleFormat, WavReader};
use std::f32::consts::PI;
use std::path::Path;

use crate::engine::window::TimeWindow;

/// Which viewer a signal feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalRole {
    Input,
    Output,
    Model,
}

impl SignalRole {
    pub const ALL: &'static [SignalRole] = &[SignalRole::Input, SignalRole::Output, SignalRole::Model];

    pub fn name(&self) -> &'static str {
        match self {
            SignalRole::Input => "Input",
            SignalRole::Output => "Equalized",
            SignalRole::Model => "AI Remix",
        }
    }
}

/// Immutable mono signal.
///
/// `duration_seconds` is authoritative for time-to-index mapping: the backend
/// may hand back a downsampled sample array while the duration still refers
/// to the original decode.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub samples: Vec<f32>,
    pub sample_rate: f32,
    pub duration_seconds: f64,
}

impl Signal {
    /// Duration derived from `samples.len() / sample_rate`.
    pub fn new(samples: Vec<f32>, sample_rate: f32) -> Self {
        let duration_seconds = if sample_rate > 0.0 {
            samples.len() as f64 / sample_rate as f64
        } else {
            0.0
        };
        Self { samples, sample_rate, duration_seconds }
    }

    /// Keep an externally known duration (e.g. the equalized output of a
    /// downsampled upload).
    pub fn with_duration(samples: Vec<f32>, sample_rate: f32, duration_seconds: f64) -> Self {
        Self { samples, sample_rate, duration_seconds: duration_seconds.max(0.0) }
    }

    pub fn from_wav_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut reader = WavReader::open(&path)
            .with_context(|| format!("Failed to open WAV file: {:?}", path.as_ref()))?;

        let spec = reader.spec();
        let channels = spec.channels.max(1);

        let samples: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<Result<Vec<f32>, _>>()
                .context("Failed to read float samples")?,
            SampleFormat::Int => match spec.bits_per_sample {
                16 => reader
                    .samples::<i16>()
                    .map(|s| s.map(|v| v as f32 / i16::MAX as f32))
                    .collect::<Result<Vec<f32>, _>>()
                    .context("Failed to read i16 samples")?,
                24 => reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / 8388608.0))
                    .collect::<Result<Vec<f32>, _>>()
                    .context("Failed to read i24 samples")?,
                32 => reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / i32::MAX as f32))
                    .collect::<Result<Vec<f32>, _>>()
                    .context("Failed to read i32 samples")?,
                bits => anyhow::bail!("Unsupported bit depth: {}", bits),
            },
        };

        // Downmix to mono
        let mono = if channels == 1 {
            samples
        } else {
            samples
                .chunks(channels as usize)
                .map(|chunk| chunk.iter().sum::<f32>() / channels as f32)
                .collect()
        };

        Ok(Signal::new(mono, spec.sample_rate as f32))
    }

    #[inline]
    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty() || self.duration_seconds <= 0.0
    }

    /// Map a time in seconds to a sample index using the authoritative duration.
    pub fn sample_index(&self, time_seconds: f64) -> usize {
        if self.samples.is_empty() || self.duration_seconds <= 0.0 {
            return 0;
        }
        let frac = (time_seconds / self.duration_seconds).clamp(0.0, 1.0);
        ((frac * self.samples.len() as f64) as usize).min(self.samples.len())
    }

    pub fn window_slice(&self, window: &TimeWindow) -> &[f32] {
        let start = self.sample_index(window.start);
        let end = self.sample_index(window.end).max(start);
        &self.samples[start..end]
    }
}

// ─── Test signal generators ────────────────────────────────────────────────────

pub mod generators {
    use super::*;

    /// Generated signals offered when no file is loaded.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum TestSignal {
        Chirp,
        Sine,
        Multitone,
        Noise,
    }

    impl TestSignal {
        pub const ALL: &'static [TestSignal] =
            &[TestSignal::Chirp, TestSignal::Sine, TestSignal::Multitone, TestSignal::Noise];

        pub fn name(&self) -> &'static str {
            match self {
                TestSignal::Chirp => "chirp",
                TestSignal::Sine => "sine",
                TestSignal::Multitone => "multitone",
                TestSignal::Noise => "noise",
            }
        }

        pub fn from_name(name: &str) -> Option<Self> {
            let name = name.trim().to_ascii_lowercase();
            Self::ALL.iter().copied().find(|t| t.name() == name)
        }

        /// Content sweeps the 100 Hz - 4 kHz range the built-in bands cover.
        pub fn generate(&self, duration: f32, sample_rate: f32) -> Signal {
            match self {
                TestSignal::Chirp => chirp(100.0, 4000.0, duration, sample_rate),
                TestSignal::Sine => sine(440.0, duration, sample_rate),
                TestSignal::Multitone => multitone(&[110.0, 440.0, 1760.0, 3520.0], duration, sample_rate),
                TestSignal::Noise => white_noise(duration, sample_rate),
            }
        }
    }

    pub fn sine(frequency: f32, duration: f32, sample_rate: f32) -> Signal {
        let num_samples = (sample_rate * duration) as usize;
        let samples = (0..num_samples)
            .map(|i| {
                let t = i as f32 / sample_rate;
                (2.0 * PI * frequency * t).sin()
            })
            .collect();
        Signal::new(samples, sample_rate)
    }

    /// Linear sweep from `start_freq` to `end_freq`.
    pub fn chirp(start_freq: f32, end_freq: f32, duration: f32, sample_rate: f32) -> Signal {
        let num_samples = (sample_rate * duration) as usize;
        let samples = (0..num_samples)
            .map(|i| {
                let t = i as f32 / sample_rate;
                let progress = t / duration;
                let freq = start_freq + (end_freq - start_freq) * progress;
                (2.0 * PI * freq * t).sin()
            })
            .collect();
        Signal::new(samples, sample_rate)
    }

    pub fn multitone(frequencies: &[f32], duration: f32, sample_rate: f32) -> Signal {
        let num_samples = (sample_rate * duration) as usize;
        let count = frequencies.len().max(1) as f32;
        let samples = (0..num_samples)
            .map(|i| {
                let t = i as f32 / sample_rate;
                frequencies.iter().map(|&f| (2.0 * PI * f * t).sin() / count).sum::<f32>()
            })
            .collect();
        Signal::new(samples, sample_rate)
    }

    pub fn white_noise(duration: f32, sample_rate: f32) -> Signal {
        use rand::Rng;

        let num_samples = (sample_rate * duration) as usize;
        let mut rng = rand::rng();
        let samples = (0..num_samples).map(|_| rng.random_range(-1.0f32..1.0)).collect();
        Signal::new(samples, sample_rate)
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================
