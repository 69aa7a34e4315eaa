//! Subject detection.
//!
//! The capture session only needs a yes/no answer (plus an optional
//! confidence) for a frame. Anything implementing [`Detector`] can supply
//! it, so a real face model slots in without touching session lifecycle.

mod simulated;

pub use simulated::SimulatedDetector;

use crate::capture::Frame;

/// Result of running detection on one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    /// Whether a subject is present.
    pub detected: bool,
    /// Detector confidence in `[0, 1]`, when the detector reports one.
    pub confidence: Option<f32>,
}

impl Detection {
    /// A positive result without a confidence value.
    pub fn present() -> Self {
        Self {
            detected: true,
            confidence: None,
        }
    }

    /// A negative result.
    pub fn absent() -> Self {
        Self {
            detected: false,
            confidence: None,
        }
    }

    /// Attaches a confidence, clamped to `[0, 1]`.
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence.clamp(0.0, 1.0));
        self
    }
}

/// Decides whether a frame contains a subject.
pub trait Detector {
    /// Runs detection on a single frame.
    fn detect(&mut self, frame: &Frame) -> Detection;
}

impl<F> Detector for F
where
    F: FnMut(&Frame) -> Detection,
{
    fn detect(&mut self, frame: &Frame) -> Detection {
        self(frame)
    }
}
