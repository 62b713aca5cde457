//! Turns raw window data into bounded, plot-ready series.
//!
//! Decimation is a plain stride: every `ceil(len / max_points)`-th point is
//! kept as-is. Nothing is interpolated or averaged, so hover readouts show
//! real sample values.

use crate::backend::{SpectrumSeries, WaveformSeries};

/// Octave-band centers used by the audiogram scale.
pub const AUDIOGRAM_BANDS_HZ: [f64; 7] = [125.0, 250.0, 500.0, 1000.0, 2000.0, 4000.0, 8000.0];
pub const AUDIOGRAM_TOLERANCE_HZ: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FreqScale {
    #[default]
    Linear,
    Audiogram,
}

impl FreqScale {
    pub fn name(&self) -> &'static str {
        match self {
            FreqScale::Linear => "Linear",
            FreqScale::Audiogram => "Audiogram",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "linear" => Some(FreqScale::Linear),
            "audiogram" | "log" => Some(FreqScale::Audiogram),
            _ => None,
        }
    }
}

/// One plottable series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trace {
    pub x: Vec<f64>,
    pub y: Vec<f32>,
}

impl Trace {
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// (min, max) of the y values, or None for an empty trace.
    pub fn y_range(&self) -> Option<(f32, f32)> {
        self.y.iter().fold(None, |acc, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
    }
}

fn stride_for(len: usize, max_points: usize) -> usize {
    if len <= max_points { 1 } else { len.div_ceil(max_points) }
}

/// Waveform trace with time re-based to the first sample, so the x axis
/// always spans `[0, window)` whatever the absolute playhead is.
pub fn build_waveform_trace(times: &[f64], amplitudes: &[f32], max_points: usize) -> Trace {
    let len = times.len().min(amplitudes.len());
    if len == 0 || max_points == 0 {
        return Trace::default();
    }

    let origin = times[0];
    let stride = stride_for(len, max_points);

    let mut trace = Trace {
        x: Vec::with_capacity(len / stride + 1),
        y: Vec::with_capacity(len / stride + 1),
    };
    for i in (0..len).step_by(stride) {
        trace.x.push(times[i] - origin);
        trace.y.push(amplitudes[i]);
    }
    trace
}

fn near_audiogram_band(freq: f64) -> bool {
    AUDIOGRAM_BANDS_HZ
        .iter()
        .any(|&center| (freq - center).abs() <= AUDIOGRAM_TOLERANCE_HZ)
}

pub fn build_fft_trace(frequencies: &[f64], magnitudes: &[f32], scale: FreqScale, max_points: usize) -> Trace {
    let len = frequencies.len().min(magnitudes.len());
    if len == 0 || max_points == 0 {
        return Trace::default();
    }

    let (x, y): (Vec<f64>, Vec<f32>) = frequencies[..len]
        .iter()
        .zip(&magnitudes[..len])
        .filter(|(f, _)| match scale {
            FreqScale::Linear => true,
            FreqScale::Audiogram => near_audiogram_band(**f),
        })
        .map(|(&f, &m)| (f, m))
        .unzip();

    let stride = stride_for(x.len(), max_points);
    if stride == 1 {
        return Trace { x, y };
    }
    Trace {
        x: x.iter().step_by(stride).copied().collect(),
        y: y.iter().step_by(stride).copied().collect(),
    }
}

/// Convenience wrappers over the wire series.
pub fn waveform_from_series(series: &WaveformSeries, max_points: usize) -> Trace {
    build_waveform_trace(&series.time, &series.amplitude, max_points)
}

pub fn fft_from_series(series: Option<&SpectrumSeries>, scale: FreqScale, max_points: usize) -> Trace {
    match series {
        Some(s) => build_fft_trace(&s.frequencies, &s.magnitudes, scale, max_points),
        None => Trace::default(),
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================
