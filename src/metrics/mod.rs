//! Prometheus metrics for capture sessions.
//!
//! # Metrics Exposed
//!
//! ## State
//! - `facecap_session_active` - 1 while a stream is held
//! - `facecap_session_error` - 1 after a failed start
//! - `facecap_subject_detected` - 1 while a subject is detected
//! - `facecap_countdown_seconds` - Seconds left in the running countdown
//!
//! ## Counters
//! - `facecap_start_attempts_total`
//! - `facecap_device_errors_total`
//! - `facecap_detections_total`
//! - `facecap_captures_total`
//! - `facecap_failed_captures_total`
//! - `facecap_countdowns_cancelled_total`
//! - `facecap_stream_releases_total`
//!
//! # Example
//!
//! ```no_run
//! use facecap::metrics::{MetricsRegistry, MetricsSnapshot};
//!
//! let registry = MetricsRegistry::new().expect("Failed to create registry");
//!
//! let snapshot = MetricsSnapshot {
//!     is_active: true,
//!     captures: 1,
//!     ..Default::default()
//! };
//!
//! registry.update(&snapshot);
//! ```

mod collector;
#[cfg(feature = "metrics")]
mod server;

pub use collector::{MetricsError, MetricsRegistry, MetricsSnapshot};
#[cfg(feature = "metrics")]
pub use server::{MetricsServer, MetricsServerConfig, MetricsState, ServerError};
