//! The capture session state machine.

use super::state::{DetectionState, SessionSnapshot, SessionStats, SessionStatus};
use super::timers::{TimerKind, Timers, COUNTDOWN_TICK};
use crate::capture::{DeviceAccessError, MediaStream, SessionConfig, VideoSource};
use crate::detection::{Detection, Detector, SimulatedDetector};
use crate::encoding::{CapturedImage, EncodingFormat, StillEncoder};

type CaptureCallback = Box<dyn FnMut(CapturedImage)>;

/// One camera acquisition-to-release cycle, repeatable.
///
/// The session exclusively owns the stream it acquires and every timer it
/// arms. [`stop`](Self::stop) releases the stream and drops the timers, so
/// no detection, countdown or capture can happen after it returns.
///
/// Operations outside their precondition are no-ops rather than errors.
/// Device access failures are reported through [`SessionStatus::Error`]
/// and [`error_message`](Self::error_message).
///
/// Starting a session arms Tokio timers, so it must run inside a Tokio
/// runtime with the time driver enabled.
pub struct CaptureSession<S: VideoSource> {
    source: S,
    config: SessionConfig,
    detector: Box<dyn Detector>,
    encoder: StillEncoder,
    on_capture: Option<CaptureCallback>,
    stream: Option<S::Stream>,
    status: SessionStatus,
    detection: DetectionState,
    countdown: Option<u32>,
    pulse: bool,
    error: Option<DeviceAccessError>,
    timers: Timers,
    stats: SessionStats,
}

impl<S: VideoSource> CaptureSession<S> {
    /// Creates an idle session using the simulated detector.
    pub fn new(source: S, config: SessionConfig) -> Self {
        let encoder = StillEncoder::new(EncodingFormat::from_setting(
            config.format,
            config.jpeg_quality,
        ));
        Self {
            source,
            config,
            detector: Box::new(SimulatedDetector::new()),
            encoder,
            on_capture: None,
            stream: None,
            status: SessionStatus::Idle,
            detection: DetectionState::NotDetected,
            countdown: None,
            pulse: false,
            error: None,
            timers: Timers::default(),
            stats: SessionStats::default(),
        }
    }

    /// Replaces the detector.
    pub fn with_detector(mut self, detector: impl Detector + 'static) -> Self {
        self.detector = Box::new(detector);
        self
    }

    /// Registers the callback that receives captured images.
    pub fn on_capture(mut self, callback: impl FnMut(CapturedImage) + 'static) -> Self {
        self.set_capture_callback(callback);
        self
    }

    /// Replaces the capture callback.
    pub fn set_capture_callback(&mut self, callback: impl FnMut(CapturedImage) + 'static) {
        self.on_capture = Some(Box::new(callback));
    }

    /// Requests a stream from the device.
    ///
    /// No-op while a stream is held. On success the session becomes
    /// [`SessionStatus::Active`] and arms the detection delay; on failure it
    /// becomes [`SessionStatus::Error`] and waits for another call.
    pub fn start(&mut self) {
        if self.stream.is_some() {
            tracing::debug!(status = ?self.status, "Start ignored, stream already held");
            return;
        }

        self.stats.start_attempts += 1;
        self.status = SessionStatus::Starting;
        let constraints = self.config.constraints();
        tracing::info!(
            width = constraints.ideal_width,
            height = constraints.ideal_height,
            facing = ?constraints.facing,
            "Requesting camera access"
        );

        match self.source.acquire(&constraints) {
            Ok(stream) => {
                let (width, height) = stream.dimensions();
                self.stream = Some(stream);
                self.status = SessionStatus::Active;
                self.detection = DetectionState::NotDetected;
                self.error = None;
                self.timers
                    .arm(TimerKind::Detection, self.config.detection_delay());
                tracing::info!(width, height, "Capture session active");
            }
            Err(error) => {
                self.stats.device_errors += 1;
                tracing::warn!(%error, "Could not access camera");
                self.status = SessionStatus::Error;
                self.error = Some(error);
            }
        }
    }

    /// Halts every track, releases the stream and cancels pending timers.
    ///
    /// No-op when no stream is held, including after a failed start (the
    /// error stays visible until the next start).
    pub fn stop(&mut self) {
        let Some(mut stream) = self.stream.take() else {
            tracing::trace!(status = ?self.status, "Stop ignored, no stream held");
            return;
        };

        self.timers.cancel_all();
        if let Some(remaining) = self.countdown.take() {
            self.stats.countdowns_cancelled += 1;
            tracing::info!(remaining, "Countdown cancelled");
        }

        stream.stop();
        drop(stream);
        self.stats.stream_releases += 1;

        self.status = SessionStatus::Idle;
        self.detection = DetectionState::NotDetected;
        self.pulse = false;
        tracing::info!("Capture session stopped");
    }

    /// Starts a countdown of `seconds` that captures when it reaches zero.
    ///
    /// Restarts a running countdown. Zero captures immediately. Ignored
    /// unless the session is active.
    pub fn begin_countdown(&mut self, seconds: u32) {
        if self.status != SessionStatus::Active {
            tracing::debug!(status = ?self.status, "Countdown ignored, session not active");
            return;
        }

        if seconds == 0 {
            self.countdown = None;
            self.timers.cancel(TimerKind::CountdownTick);
            self.capture();
            return;
        }

        if let Some(previous) = self.countdown.replace(seconds) {
            tracing::debug!(previous, seconds, "Countdown restarted");
        } else {
            tracing::info!(seconds, "Countdown started");
        }
        self.timers.arm(TimerKind::CountdownTick, COUNTDOWN_TICK);
    }

    /// Advances a running countdown by one second.
    ///
    /// Captures and clears the countdown when it reaches zero. Called by the
    /// countdown timer; does nothing when no countdown is running.
    pub fn tick_countdown(&mut self) {
        let Some(remaining) = self.countdown else {
            return;
        };

        let remaining = remaining.saturating_sub(1);
        if remaining == 0 {
            self.countdown = None;
            self.timers.cancel(TimerKind::CountdownTick);
            tracing::info!("Countdown complete, capturing");
            self.capture();
        } else {
            self.countdown = Some(remaining);
            self.timers.arm(TimerKind::CountdownTick, COUNTDOWN_TICK);
            tracing::debug!(remaining, "Countdown tick");
        }
    }

    /// Reads the current frame, encodes it and hands it to the callback.
    ///
    /// Requires an active session with a detected subject; otherwise does
    /// nothing.
    pub fn capture(&mut self) {
        if self.status != SessionStatus::Active || self.detection != DetectionState::Detected {
            tracing::debug!(
                status = ?self.status,
                detection = ?self.detection,
                "Capture ignored"
            );
            return;
        }
        let Some(stream) = self.stream.as_mut() else {
            return;
        };

        let frame = match stream.read_frame() {
            Ok(frame) => frame,
            Err(error) => {
                self.stats.failed_captures += 1;
                tracing::warn!(%error, "Capture failed, could not read frame");
                return;
            }
        };

        let image = match self.encoder.encode(&frame) {
            Ok(image) => image,
            Err(error) => {
                self.stats.failed_captures += 1;
                tracing::warn!(%error, "Capture failed, could not encode frame");
                return;
            }
        };

        self.stats.captures += 1;
        self.pulse = true;
        self.timers
            .arm(TimerKind::Pulse, self.config.pulse_duration());
        tracing::info!(
            width = image.width(),
            height = image.height(),
            bytes = image.bytes().len(),
            "Captured still"
        );

        match self.on_capture.as_mut() {
            Some(callback) => callback(image),
            None => tracing::debug!("No capture callback registered, image dropped"),
        }
    }

    /// Waits for the next armed timer to expire.
    ///
    /// Pends forever when no timer is armed. Cancel-safe: dropping the
    /// future leaves the timers untouched.
    pub async fn next_timer(&mut self) -> TimerKind {
        self.timers.expired().await
    }

    /// Applies the effect of an expired timer.
    pub fn handle_timer(&mut self, kind: TimerKind) {
        match kind {
            TimerKind::Detection => self.check_detection(),
            TimerKind::CountdownTick => self.tick_countdown(),
            TimerKind::Pulse => {
                self.pulse = false;
                tracing::trace!("Capture pulse cleared");
            }
        }
    }

    /// Waits for the next timer and applies it.
    pub async fn process_next_timer(&mut self) -> TimerKind {
        let kind = self.next_timer().await;
        self.handle_timer(kind);
        kind
    }

    fn check_detection(&mut self) {
        if self.status != SessionStatus::Active || self.detection == DetectionState::Detected {
            return;
        }
        let Some(stream) = self.stream.as_mut() else {
            return;
        };

        let result = match stream.read_frame() {
            Ok(frame) => self.detector.detect(&frame),
            Err(error) => {
                tracing::warn!(%error, "Detection skipped, could not read frame");
                Detection::absent()
            }
        };

        if !result.detected {
            tracing::debug!("No subject detected, checking again");
            self.timers
                .arm(TimerKind::Detection, self.config.detection_delay());
            return;
        }

        self.detection = DetectionState::Detected;
        self.stats.detections += 1;
        tracing::info!(confidence = ?result.confidence, "Subject detected");

        if self.config.auto_capture {
            self.begin_countdown(self.config.countdown_secs);
        }
    }

    /// Current lifecycle status.
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Detection state for the current start cycle.
    pub fn detection(&self) -> DetectionState {
        self.detection
    }

    /// Seconds left in a running countdown.
    pub fn countdown(&self) -> Option<u32> {
        self.countdown
    }

    /// True for a short while after each capture.
    pub fn pulse(&self) -> bool {
        self.pulse
    }

    /// User-facing message while the session is in the error state.
    pub fn error_message(&self) -> Option<&'static str> {
        match self.status {
            SessionStatus::Error => self.error.as_ref().map(DeviceAccessError::user_message),
            _ => None,
        }
    }

    /// The error from the last failed start, if the session is in error.
    pub fn last_error(&self) -> Option<&DeviceAccessError> {
        self.error.as_ref()
    }

    /// True while a stream is held.
    pub fn is_streaming(&self) -> bool {
        self.stream.is_some()
    }

    /// True while any timer is armed.
    pub fn has_pending_timers(&self) -> bool {
        self.timers.any_armed()
    }

    /// Configuration this session was built with.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Counters accumulated since construction.
    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Point-in-time view of the session.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            status: self.status,
            detection: self.detection,
            countdown: self.countdown,
            pulse: self.pulse,
            error_message: self.error_message().map(str::to_string),
            stream_dimensions: self.stream.as_ref().map(|stream| stream.dimensions()),
            stats: self.stats,
        }
    }
}

impl<S: VideoSource> Drop for CaptureSession<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<S: VideoSource> std::fmt::Debug for CaptureSession<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSession")
            .field("status", &self.status)
            .field("detection", &self.detection)
            .field("countdown", &self.countdown)
            .field("pulse", &self.pulse)
            .field("streaming", &self.stream.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{Frame, MockProbe, MockSource, CAMERA_ACCESS_MESSAGE};
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;
    use tokio::time::{timeout, Instant};

    type Captured = Rc<RefCell<Vec<CapturedImage>>>;

    fn session_with(
        source: MockSource,
        config: SessionConfig,
    ) -> (CaptureSession<MockSource>, MockProbe, Captured) {
        let probe = source.probe();
        let captured: Captured = Rc::default();
        let sink = Rc::clone(&captured);
        let session = CaptureSession::new(source, config)
            .on_capture(move |image| sink.borrow_mut().push(image));
        (session, probe, captured)
    }

    fn small_config() -> SessionConfig {
        SessionConfig::with_dimensions(32, 24)
    }

    fn auto_config(countdown_secs: u32) -> SessionConfig {
        SessionConfig {
            auto_capture: true,
            countdown_secs,
            ..small_config()
        }
    }

    fn assert_elapsed(start: Instant, expected_ms: u64) {
        let elapsed = start.elapsed();
        let expected = Duration::from_millis(expected_ms);
        assert!(
            elapsed >= expected && elapsed < expected + Duration::from_millis(20),
            "elapsed {:?}, expected {:?}",
            elapsed,
            expected
        );
    }

    async fn nothing_fires(session: &mut CaptureSession<MockSource>) -> bool {
        timeout(Duration::from_secs(30), session.next_timer())
            .await
            .is_err()
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_on_idle_is_noop() {
        let (mut session, probe, _) = session_with(MockSource::new(), small_config());

        session.stop();
        session.stop();

        assert_eq!(session.status(), SessionStatus::Idle);
        assert_eq!(session.stats().stream_releases, 0);
        assert_eq!(probe.releases(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_then_detect_after_delay() {
        let (mut session, probe, _) = session_with(MockSource::new(), small_config());
        let start = Instant::now();

        session.start();
        assert_eq!(session.status(), SessionStatus::Active);
        assert_eq!(session.detection(), DetectionState::NotDetected);
        assert_eq!(probe.live_streams(), 1);

        assert_eq!(session.process_next_timer().await, TimerKind::Detection);
        assert_elapsed(start, 1500);
        assert_eq!(session.detection(), DetectionState::Detected);
        assert_eq!(session.stats().detections, 1);

        // Detection happens once per cycle and nothing else is scheduled
        assert!(!session.has_pending_timers());
        assert!(nothing_fires(&mut session).await);
        assert_eq!(session.stats().detections, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_while_active_is_noop() {
        let (mut session, probe, _) = session_with(MockSource::new(), small_config());

        session.start();
        session.start();

        assert_eq!(probe.acquisitions(), 1);
        assert_eq!(session.stats().start_attempts, 1);
        assert_eq!(session.status(), SessionStatus::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_before_detection_is_ignored() {
        let (mut session, _, captured) = session_with(MockSource::new(), small_config());

        session.capture();
        session.start();
        session.capture();

        assert!(captured.borrow().is_empty());
        assert_eq!(session.stats().captures, 0);
        assert!(!session.pulse());
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_delivers_png_and_pulses() {
        let (mut session, _, captured) = session_with(MockSource::new(), small_config());

        session.start();
        session.process_next_timer().await;
        assert!(session.snapshot().can_capture());

        session.capture();
        {
            let images = captured.borrow();
            assert_eq!(images.len(), 1);
            assert_eq!(images[0].mime_type(), "image/png");
            assert_eq!((images[0].width(), images[0].height()), (32, 24));
        }
        assert!(session.pulse());

        let pulse_start = Instant::now();
        assert_eq!(session.process_next_timer().await, TimerKind::Pulse);
        assert_elapsed(pulse_start, 500);
        assert!(!session.pulse());
        assert_eq!(session.status(), SessionStatus::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_captures_once_at_zero() {
        let (mut session, _, captured) = session_with(MockSource::new(), auto_config(3));
        let start = Instant::now();

        session.start();
        session.process_next_timer().await;
        assert_eq!(session.countdown(), Some(3));

        for expected in [2, 1] {
            assert_eq!(session.process_next_timer().await, TimerKind::CountdownTick);
            assert_eq!(session.countdown(), Some(expected));
            assert!(captured.borrow().is_empty());
        }

        assert_eq!(session.process_next_timer().await, TimerKind::CountdownTick);
        assert_elapsed(start, 4500);
        assert_eq!(session.countdown(), None);
        assert_eq!(captured.borrow().len(), 1);

        // Only the pulse remains
        assert_eq!(session.process_next_timer().await, TimerKind::Pulse);
        assert!(nothing_fires(&mut session).await);
        assert_eq!(captured.borrow().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_mid_countdown_prevents_capture() {
        let (mut session, probe, captured) = session_with(MockSource::new(), auto_config(3));

        session.start();
        session.process_next_timer().await;
        session.process_next_timer().await;
        assert_eq!(session.countdown(), Some(2));

        session.stop();
        assert_eq!(session.status(), SessionStatus::Idle);
        assert_eq!(session.detection(), DetectionState::NotDetected);
        assert_eq!(session.countdown(), None);
        assert!(!session.has_pending_timers());

        assert!(nothing_fires(&mut session).await);
        assert!(captured.borrow().is_empty());
        assert_eq!(session.stats().countdowns_cancelled, 1);
        assert_eq!(probe.releases(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_before_detection_cancels_it() {
        let (mut session, _, _) = session_with(MockSource::new(), small_config());

        session.start();
        session.stop();

        assert!(nothing_fires(&mut session).await);
        assert_eq!(session.detection(), DetectionState::NotDetected);
        assert_eq!(session.stats().detections, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permission_denied_then_retry() {
        let source = MockSource::new().fail_next(DeviceAccessError::PermissionDenied);
        let (mut session, probe, _) = session_with(source, small_config());

        session.start();
        assert_eq!(session.status(), SessionStatus::Error);
        assert_eq!(session.error_message(), Some(CAMERA_ACCESS_MESSAGE));
        assert_eq!(
            session.error_message(),
            Some("Could not access camera. Please ensure you have granted permission.")
        );
        assert!(!session.has_pending_timers());

        // Stop does not clear the error
        session.stop();
        assert_eq!(session.status(), SessionStatus::Error);

        session.start();
        assert_eq!(session.status(), SessionStatus::Active);
        assert_eq!(session.error_message(), None);
        assert!(session.last_error().is_none());
        assert_eq!(probe.acquisitions(), 1);

        let stats = session.stats();
        assert_eq!(stats.start_attempts, 2);
        assert_eq!(stats.device_errors, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_device_reports_error() {
        let (mut session, _, _) = session_with(MockSource::new().without_device(), small_config());

        session.start();

        assert_eq!(session.last_error(), Some(&DeviceAccessError::NotFound));
        let snapshot = session.snapshot();
        assert_eq!(snapshot.status, SessionStatus::Error);
        assert_eq!(snapshot.error_message.as_deref(), Some(CAMERA_ACCESS_MESSAGE));
        assert_eq!(snapshot.stream_dimensions, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_cycle_detects_once_and_releases_once() {
        let (mut session, probe, _) = session_with(MockSource::new(), small_config());

        for cycle in 1..=3u64 {
            session.start();
            assert_eq!(session.detection(), DetectionState::NotDetected);
            session.process_next_timer().await;
            assert_eq!(session.stats().detections, cycle);
            session.stop();
            assert_eq!(probe.releases(), cycle);
            assert_eq!(probe.live_streams(), 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_releases_stream() {
        let (mut session, probe, _) = session_with(MockSource::new(), auto_config(3));

        session.start();
        session.process_next_timer().await;
        assert_eq!(probe.live_streams(), 1);

        drop(session);
        assert_eq!(probe.releases(), 1);
        assert_eq!(probe.live_streams(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detector_retries_until_subject_found() {
        let mut checks = 0;
        let detector = move |_: &Frame| {
            checks += 1;
            if checks >= 3 {
                Detection::present().with_confidence(0.8)
            } else {
                Detection::absent()
            }
        };
        let (session, _, _) = session_with(MockSource::new(), small_config());
        let mut session = session.with_detector(detector);
        let start = Instant::now();

        session.start();
        for _ in 0..2 {
            assert_eq!(session.process_next_timer().await, TimerKind::Detection);
            assert_eq!(session.detection(), DetectionState::NotDetected);
        }
        assert_eq!(session.process_next_timer().await, TimerKind::Detection);
        assert_elapsed(start, 4500);
        assert_eq!(session.detection(), DetectionState::Detected);
        assert_eq!(session.stats().detections, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_countdown_captures_immediately() {
        let (mut session, _, captured) = session_with(MockSource::new(), small_config());

        session.start();
        session.process_next_timer().await;
        session.begin_countdown(0);

        assert_eq!(captured.borrow().len(), 1);
        assert_eq!(session.countdown(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_requires_active_session() {
        let (mut session, _, _) = session_with(MockSource::new(), small_config());

        session.begin_countdown(3);
        assert_eq!(session.countdown(), None);
        assert!(!session.has_pending_timers());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restarted_countdown_counts_from_new_value() {
        let (mut session, _, captured) = session_with(MockSource::new(), small_config());

        session.start();
        session.process_next_timer().await;
        session.begin_countdown(3);
        session.process_next_timer().await;
        assert_eq!(session.countdown(), Some(2));

        session.begin_countdown(3);
        assert_eq!(session.countdown(), Some(3));
        for _ in 0..3 {
            session.process_next_timer().await;
        }
        assert_eq!(captured.borrow().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_before_detection_does_not_capture() {
        let config = SessionConfig {
            detection_delay_ms: 10_000,
            ..small_config()
        };
        let (mut session, _, captured) = session_with(MockSource::new(), config);

        session.start();
        session.begin_countdown(1);
        assert_eq!(session.process_next_timer().await, TimerKind::CountdownTick);

        assert_eq!(session.countdown(), None);
        assert!(captured.borrow().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_resolution_hint_does_not_panic() {
        let config = SessionConfig::with_dimensions(40_000, 40_000);
        let (mut session, _, captured) = session_with(MockSource::new(), config);

        session.start();
        assert_eq!(session.process_next_timer().await, TimerKind::Detection);
        assert_eq!(
            session.snapshot().stream_dimensions,
            Some(crate::capture::MOCK_MAX_RESOLUTION)
        );

        session.capture();
        assert_eq!(captured.borrow().len(), 1);
        assert_eq!(session.stats().failed_captures, 0);
    }
}
