//! Playback engine: clock, window math, fetch scheduling and the session
//! state machine that ties them together.

pub mod clock;
pub mod controller;
pub mod fetch;
pub mod session;
pub mod window;

pub use clock::{ClockDriver, Tick};
pub use controller::{ControllerConfig, PlaybackController, PlaybackState, TickOutcome, TransportStatus};
pub use fetch::{Dispatch, FetchOutcome, FetchScheduler, RequestSequence};
pub use session::{EngineConfig, Effect, RenderState, Session, SignalSet, UploadState, UserAction};
pub use window::{TimeWindow, ViewMode, WindowGeometry, WindowPolicy, compute_window, window_duration};
