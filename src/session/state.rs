//! Observable session state.

use serde::Serialize;

/// Where a session is in its acquire/release cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// No stream held.
    #[default]
    Idle,
    /// Device access has been requested.
    Starting,
    /// A live stream is held.
    Active,
    /// The last start attempt failed; no stream is held.
    Error,
}

/// Whether a subject has been detected in the live stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionState {
    /// No subject seen yet in this start cycle.
    #[default]
    NotDetected,
    /// A subject was seen; captures are allowed.
    Detected,
}

/// Running counters over the lifetime of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// Calls to start that requested device access.
    pub start_attempts: u64,
    /// Start attempts that failed with a device access error.
    pub device_errors: u64,
    /// Start cycles in which a subject was detected.
    pub detections: u64,
    /// Images handed to the capture callback.
    pub captures: u64,
    /// Captures that passed their precondition but failed to read or encode.
    pub failed_captures: u64,
    /// Countdowns discarded by stop before reaching zero.
    pub countdowns_cancelled: u64,
    /// Streams released.
    pub stream_releases: u64,
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Detection state for the current start cycle.
    pub detection: DetectionState,
    /// Seconds left in a running countdown.
    pub countdown: Option<u32>,
    /// True for a short while after each capture.
    pub pulse: bool,
    /// User-facing message while in [`SessionStatus::Error`].
    pub error_message: Option<String>,
    /// Native dimensions of the held stream.
    pub stream_dimensions: Option<(u32, u32)>,
    /// Counters so far.
    pub stats: SessionStats,
}

impl SessionSnapshot {
    /// True when a capture request would be honored.
    pub fn can_capture(&self) -> bool {
        self.status == SessionStatus::Active && self.detection == DetectionState::Detected
    }
}
