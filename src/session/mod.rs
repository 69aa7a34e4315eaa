//! Capture session lifecycle.
//!
//! A [`CaptureSession`] acquires a stream, simulates subject detection,
//! optionally counts down, captures encoded stills and releases the device.
//! A [`SessionDriver`] runs it as a single-task command loop.

mod driver;
mod lifecycle;
mod state;
mod timers;

pub use driver::{DriverError, SessionCommand, SessionDriver, SessionHandle, COMMAND_QUEUE_DEPTH};
pub use lifecycle::CaptureSession;
pub use state::{DetectionState, SessionSnapshot, SessionStats, SessionStatus};
pub use timers::{TimerKind, COUNTDOWN_TICK};
