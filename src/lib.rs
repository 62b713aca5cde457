//! Cine-style playback engine for an audio equalizer.
//!
//! A [`engine::Session`] keeps playback time, zoom and speed, derives the
//! visible time window and decides when to ask the processing backend for
//! windowed waveform and spectrum data. [`runtime`] drives a session on
//! tokio against a [`backend::Backend`]; [`traces`] turns responses into
//! bounded plot series.

pub mod backend;
pub mod engine;
pub mod equalizer;
pub mod modes;
pub mod playback;
pub mod runtime;
pub mod settings;
pub mod signal;
pub mod traces;

#[cfg(feature = "gui")]
pub mod ui;

pub use engine::{EngineConfig, RenderState, Session, UserAction};
pub use runtime::{Command, ViewerHandle, spawn_viewer};
pub use settings::Settings;
pub use signal::{Signal, SignalRole};

/// `M:SS.ss` transport label. Negative or non-finite input shows as zero.
pub fn format_time(seconds: f64) -> String {
    let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
    let hundredths = (seconds * 100.0).round() as u64;
    let minutes = hundredths / 6000;
    let rest = hundredths % 6000;
    format!("{}:{:02}.{:02}", minutes, rest / 100, rest % 100)
}
