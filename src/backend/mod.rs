//! Wire types and the async seam to the signal-processing service.
//!
//! The service owns all FFT, equalization and separation math. This crate
//! only ships sample arrays up, asks for windows of prepared data and gets
//! plain arrays back.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::equalizer::EqualizerSettings;

pub use http::HttpBackend;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("network error: {0}")]
    Network(String),
    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("could not decode response: {0}")]
    Decode(String),
}

// ─── Requests ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadRequest {
    pub signal: Vec<f32>,
    #[serde(rename = "sampleRate")]
    pub sample_rate: f32,
    pub duration: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowRequest {
    pub signal_id: String,
    pub settings: EqualizerSettings,
    pub time_start: f64,
    pub time_end: f64,
    pub is_playing: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EqualizeRequest {
    pub signal: Vec<f32>,
    #[serde(rename = "sampleRate")]
    pub sample_rate: f32,
    #[serde(flatten)]
    pub settings: EqualizerSettings,
}

// ─── Responses ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct WaveformSeries {
    #[serde(default)]
    pub time: Vec<f64>,
    #[serde(default)]
    pub amplitude: Vec<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SpectrumSeries {
    #[serde(default)]
    pub frequencies: Vec<f64>,
    #[serde(default)]
    pub magnitudes: Vec<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct WindowResponse {
    #[serde(default)]
    pub input_waveform: WaveformSeries,
    #[serde(default)]
    pub output_waveform: WaveformSeries,
    #[serde(default)]
    pub input_fft: Option<SpectrumSeries>,
    #[serde(default)]
    pub output_fft: Option<SpectrumSeries>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct UploadResponse {
    pub signal_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct EqualizeResponse {
    #[serde(rename = "outputSignal")]
    pub output_signal: Vec<f32>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorBody {
    pub error: String,
}

/// The three remote operations the engine needs.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Returns the opaque signal handle used by every later window request.
    async fn upload(&self, request: &UploadRequest) -> Result<String, BackendError>;

    async fn fetch_window(&self, request: &WindowRequest) -> Result<WindowResponse, BackendError>;

    /// Returns the equalized sample array.
    async fn equalize(&self, request: &EqualizeRequest) -> Result<Vec<f32>, BackendError>;
}

// ============================================================================
// UNIT TESTS
// ============================================================================
