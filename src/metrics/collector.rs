//! Metrics collection and registry.

use crate::session::{DetectionState, SessionSnapshot, SessionStatus};
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// A snapshot of session state for metrics update.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    /// Whether a stream is currently live.
    pub is_active: bool,
    /// Whether the last start attempt failed.
    pub is_error: bool,
    /// Whether a subject is currently detected.
    pub is_detected: bool,
    /// Seconds left in a running countdown (0 when none).
    pub countdown: u32,
    /// Total start attempts.
    pub start_attempts: u64,
    /// Total device access errors.
    pub device_errors: u64,
    /// Total detections.
    pub detections: u64,
    /// Total images delivered.
    pub captures: u64,
    /// Total captures that failed to read or encode.
    pub failed_captures: u64,
    /// Total countdowns cancelled by stop.
    pub countdowns_cancelled: u64,
    /// Total streams released.
    pub stream_releases: u64,
}

/// Prometheus metrics registry for capture sessions.
pub struct MetricsRegistry {
    registry: Registry,

    // State gauges
    active: IntGauge,
    error: IntGauge,
    detected: IntGauge,
    countdown_seconds: IntGauge,

    // Lifetime counters
    start_attempts_total: IntCounter,
    device_errors_total: IntCounter,
    detections_total: IntCounter,
    captures_total: IntCounter,
    failed_captures_total: IntCounter,
    countdowns_cancelled_total: IntCounter,
    stream_releases_total: IntCounter,
}

impl MetricsRegistry {
    /// Creates a new metrics registry with all session metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let active = IntGauge::new(
            "facecap_session_active",
            "Whether a camera stream is held (1=active, 0=not)",
        )?;
        let error = IntGauge::new(
            "facecap_session_error",
            "Whether the last start attempt failed (1=error, 0=ok)",
        )?;
        let detected = IntGauge::new(
            "facecap_subject_detected",
            "Whether a subject is currently detected",
        )?;
        let countdown_seconds = IntGauge::new(
            "facecap_countdown_seconds",
            "Seconds remaining in the running countdown",
        )?;

        let start_attempts_total = IntCounter::new(
            "facecap_start_attempts_total",
            "Total number of camera access requests",
        )?;
        let device_errors_total = IntCounter::new(
            "facecap_device_errors_total",
            "Total number of failed camera access requests",
        )?;
        let detections_total = IntCounter::new(
            "facecap_detections_total",
            "Total number of start cycles with a detected subject",
        )?;
        let captures_total = IntCounter::new(
            "facecap_captures_total",
            "Total number of captured stills delivered",
        )?;
        let failed_captures_total = IntCounter::new(
            "facecap_failed_captures_total",
            "Total number of captures that failed to read or encode",
        )?;
        let countdowns_cancelled_total = IntCounter::new(
            "facecap_countdowns_cancelled_total",
            "Total number of countdowns cancelled before capture",
        )?;
        let stream_releases_total = IntCounter::new(
            "facecap_stream_releases_total",
            "Total number of camera streams released",
        )?;

        registry.register(Box::new(active.clone()))?;
        registry.register(Box::new(error.clone()))?;
        registry.register(Box::new(detected.clone()))?;
        registry.register(Box::new(countdown_seconds.clone()))?;
        registry.register(Box::new(start_attempts_total.clone()))?;
        registry.register(Box::new(device_errors_total.clone()))?;
        registry.register(Box::new(detections_total.clone()))?;
        registry.register(Box::new(captures_total.clone()))?;
        registry.register(Box::new(failed_captures_total.clone()))?;
        registry.register(Box::new(countdowns_cancelled_total.clone()))?;
        registry.register(Box::new(stream_releases_total.clone()))?;

        Ok(Self {
            registry,
            active,
            error,
            detected,
            countdown_seconds,
            start_attempts_total,
            device_errors_total,
            detections_total,
            captures_total,
            failed_captures_total,
            countdowns_cancelled_total,
            stream_releases_total,
        })
    }

    /// Updates all metrics from a snapshot of session state.
    pub fn update(&self, snapshot: &MetricsSnapshot) {
        self.active.set(i64::from(snapshot.is_active));
        self.error.set(i64::from(snapshot.is_error));
        self.detected.set(i64::from(snapshot.is_detected));
        self.countdown_seconds.set(i64::from(snapshot.countdown));

        // Counters only move forward by the difference
        advance(&self.start_attempts_total, snapshot.start_attempts);
        advance(&self.device_errors_total, snapshot.device_errors);
        advance(&self.detections_total, snapshot.detections);
        advance(&self.captures_total, snapshot.captures);
        advance(&self.failed_captures_total, snapshot.failed_captures);
        advance(&self.countdowns_cancelled_total, snapshot.countdowns_cancelled);
        advance(&self.stream_releases_total, snapshot.stream_releases);
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

fn advance(counter: &IntCounter, total: u64) {
    let current = counter.get();
    if total > current {
        counter.inc_by(total - current);
    }
}

impl MetricsSnapshot {
    /// Creates a metrics snapshot from a session snapshot.
    pub fn from_session(session: &SessionSnapshot) -> Self {
        let stats = &session.stats;
        Self {
            is_active: session.status == SessionStatus::Active,
            is_error: session.status == SessionStatus::Error,
            is_detected: session.detection == DetectionState::Detected,
            countdown: session.countdown.unwrap_or(0),
            start_attempts: stats.start_attempts,
            device_errors: stats.device_errors,
            detections: stats.detections,
            captures: stats.captures,
            failed_captures: stats.failed_captures,
            countdowns_cancelled: stats.countdowns_cancelled,
            stream_releases: stats.stream_releases,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionStats;

    #[test]
    fn test_registry_creation() {
        let registry = MetricsRegistry::new();
        assert!(registry.is_ok());
    }

    #[test]
    fn test_metrics_update() {
        let registry = MetricsRegistry::new().unwrap();

        let snapshot = MetricsSnapshot {
            is_active: true,
            is_detected: true,
            countdown: 2,
            start_attempts: 3,
            device_errors: 1,
            captures: 2,
            ..Default::default()
        };

        registry.update(&snapshot);

        let output = registry.encode().unwrap();
        assert!(output.contains("facecap_session_active 1"));
        assert!(output.contains("facecap_countdown_seconds 2"));
        assert!(output.contains("facecap_start_attempts_total 3"));
        assert!(output.contains("facecap_captures_total 2"));
    }

    #[test]
    fn test_counters_never_move_backwards() {
        let registry = MetricsRegistry::new().unwrap();

        registry.update(&MetricsSnapshot {
            captures: 5,
            ..Default::default()
        });
        registry.update(&MetricsSnapshot {
            captures: 3,
            ..Default::default()
        });

        let output = registry.encode().unwrap();
        assert!(output.contains("facecap_captures_total 5"));
    }

    #[test]
    fn test_snapshot_from_session() {
        let session = SessionSnapshot {
            status: SessionStatus::Error,
            detection: DetectionState::NotDetected,
            countdown: None,
            pulse: false,
            error_message: Some("camera".into()),
            stream_dimensions: None,
            stats: SessionStats {
                start_attempts: 1,
                device_errors: 1,
                ..Default::default()
            },
        };

        let snapshot = MetricsSnapshot::from_session(&session);
        assert!(snapshot.is_error);
        assert!(!snapshot.is_active);
        assert_eq!(snapshot.countdown, 0);
        assert_eq!(snapshot.device_errors, 1);
    }
}
