//! Camera Capture Sessions
//!
//! Manages one camera acquisition-to-release cycle at a time: acquire a
//! video stream, check it for a subject, optionally count down, capture an
//! encoded still, and release the device deterministically.
//!
//! # Architecture
//!
//! ```text
//! capture (VideoSource) → session (CaptureSession) → encoding → on_capture
//!                              ↑           ↓
//!                         detection    metrics
//! ```
//!
//! # Design Principles
//!
//! - **Single owner**: the session owns its stream and its timers; nothing
//!   else can release or fire them
//! - **Cancel, don't ignore**: stopping drops pending timers, so no capture
//!   or detection happens after stop
//! - **No-op outside preconditions**: only device access can fail, and it
//!   surfaces as a status
//! - **Pluggable detection**: the simulated detector is one [`Detector`]
//!   among any others
//!
//! # Example
//!
//! ```no_run
//! use facecap::{CaptureSession, MockSource, SessionConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let config = SessionConfig {
//!     auto_capture: true,
//!     ..SessionConfig::default()
//! };
//!
//! let mut session = CaptureSession::new(MockSource::new(), config)
//!     .on_capture(|image| println!("captured {} bytes", image.bytes().len()));
//!
//! session.start();
//!
//! // Detection, three countdown ticks, then the capture
//! while session.stats().captures == 0 {
//!     session.process_next_timer().await;
//! }
//!
//! session.stop();
//! # }
//! ```

#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod capture;
pub mod detection;
pub mod encoding;
pub mod metrics;
pub mod roster;
pub mod session;

// Re-export commonly used types at crate root
pub use capture::{
    DeviceAccessError, FileConfig, Frame, MediaStream, MockSource, SessionConfig, VideoSource,
};
pub use detection::{Detection, Detector, SimulatedDetector};
pub use encoding::{CapturedImage, EncodingFormat, StillEncoder};
pub use roster::{Employee, EmployeeRepository, EmployeeUpdate, InMemoryRoster};
pub use session::{
    CaptureSession, DetectionState, SessionDriver, SessionHandle, SessionSnapshot, SessionStatus,
};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
