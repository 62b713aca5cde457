//! "Listen" playback: one-shot buffer playback that runs beside the cine
//! clock, never synced to it.

pub mod device;
pub mod listen;

pub use device::MiniaudioOutput;
pub use listen::{AudioOutput, AudioPlaybackAdapter};
