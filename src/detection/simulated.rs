//! Placeholder detector.

use super::{Detection, Detector};
use crate::capture::Frame;

/// Reports a subject on every frame it is shown.
///
/// Paired with the session's detection delay this reproduces a fixed
/// "face found after N ms" simulation. It does not inspect pixels.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedDetector;

impl SimulatedDetector {
    pub fn new() -> Self {
        Self
    }
}

impl Detector for SimulatedDetector {
    fn detect(&mut self, frame: &Frame) -> Detection {
        tracing::trace!(sequence = frame.sequence(), "Simulated detection");
        Detection::present()
    }
}
