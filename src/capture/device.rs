//! Video device abstraction.
//!
//! A [`VideoSource`] hands out exclusively owned [`MediaStream`] handles.
//! Streams carry one or more [`Track`]s that can each be stopped; a stream
//! whose tracks are all stopped is released and yields no more frames.

use super::{Frame, PixelFormat, StreamConstraints};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Message shown to the user whenever the camera cannot be acquired.
pub const CAMERA_ACCESS_MESSAGE: &str =
    "Could not access camera. Please ensure you have granted permission.";

/// Failure to acquire a video stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceAccessError {
    /// The host refused access to the camera.
    #[error("camera permission denied")]
    PermissionDenied,
    /// No video input device is present.
    #[error("no camera device found")]
    NotFound,
    /// A device exists but could not be opened.
    #[error("camera unavailable: {0}")]
    Unavailable(String),
}

impl DeviceAccessError {
    /// Human-readable message suitable for display next to the preview.
    pub fn user_message(&self) -> &'static str {
        CAMERA_ACCESS_MESSAGE
    }
}

/// Errors reading from an acquired stream.
#[derive(Debug, Error)]
pub enum CameraError {
    /// The device returned no usable frame.
    #[error("failed to read frame: {0}")]
    ReadFailed(String),
    /// The stream was stopped.
    #[error("stream has ended")]
    Ended,
}

/// Kind of media carried by a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Video,
    Audio,
}

/// A single track of a media stream with its own stop control.
#[derive(Debug, Clone)]
pub struct Track {
    kind: TrackKind,
    label: String,
    live: bool,
}

impl Track {
    /// Creates a live video track.
    pub fn video(label: impl Into<String>) -> Self {
        Self {
            kind: TrackKind::Video,
            label: label.into(),
            live: true,
        }
    }

    /// Returns the track kind.
    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    /// Returns the device label of the track.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns true until the track is stopped.
    pub fn is_live(&self) -> bool {
        self.live
    }

    /// Stops the track. Stopping twice has no further effect.
    pub fn stop(&mut self) {
        if self.live {
            self.live = false;
            tracing::debug!(label = %self.label, kind = ?self.kind, "Track stopped");
        }
    }
}

/// A live, revocable media stream.
pub trait MediaStream {
    /// Tracks carried by this stream.
    fn tracks(&self) -> &[Track];

    /// Mutable access to the tracks, used to stop them.
    fn tracks_mut(&mut self) -> &mut [Track];

    /// Native frame dimensions of the video track.
    fn dimensions(&self) -> (u32, u32);

    /// Reads the current frame.
    fn read_frame(&mut self) -> Result<Frame, CameraError>;

    /// Halts every track on the stream.
    fn stop(&mut self) {
        for track in self.tracks_mut() {
            track.stop();
        }
    }

    /// Returns true while any track is live.
    fn is_live(&self) -> bool {
        self.tracks().iter().any(Track::is_live)
    }
}

/// Something that can grant access to a video input device.
pub trait VideoSource {
    /// Stream type handed out on success.
    type Stream: MediaStream;

    /// Requests a live stream matching the constraints as closely as the
    /// device allows.
    fn acquire(&mut self, constraints: &StreamConstraints)
        -> Result<Self::Stream, DeviceAccessError>;
}

#[derive(Debug, Default)]
struct ProbeCounters {
    acquisitions: AtomicU64,
    releases: AtomicU64,
}

/// Shared view of how many mock streams were acquired and released.
#[derive(Debug, Clone, Default)]
pub struct MockProbe {
    counters: Arc<ProbeCounters>,
}

impl MockProbe {
    /// Total streams handed out.
    pub fn acquisitions(&self) -> u64 {
        self.counters.acquisitions.load(Ordering::SeqCst)
    }

    /// Total streams released via [`MediaStream::stop`].
    pub fn releases(&self) -> u64 {
        self.counters.releases.load(Ordering::SeqCst)
    }

    /// Streams acquired but not yet released.
    pub fn live_streams(&self) -> u64 {
        self.acquisitions().saturating_sub(self.releases())
    }
}

/// Largest stream [`MockSource`] will open when following a resolution hint.
pub const MOCK_MAX_RESOLUTION: (u32, u32) = (1920, 1080);

/// Mock video source producing synthetic RGB frames.
///
/// Honors the resolution hint of the constraints, capped at
/// [`MOCK_MAX_RESOLUTION`], unless a fixed native resolution is set. Can be
/// told to refuse access.
#[derive(Debug, Default)]
pub struct MockSource {
    native_resolution: Option<(u32, u32)>,
    pending_failures: VecDeque<DeviceAccessError>,
    persistent_failure: Option<DeviceAccessError>,
    probe: MockProbe,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forces the stream to a fixed resolution regardless of the hint.
    pub fn with_native_resolution(mut self, width: u32, height: u32) -> Self {
        self.native_resolution = Some((width, height));
        self
    }

    /// Refuses every acquisition with a permission error.
    pub fn deny_permission(mut self) -> Self {
        self.persistent_failure = Some(DeviceAccessError::PermissionDenied);
        self
    }

    /// Behaves as if no camera were attached.
    pub fn without_device(mut self) -> Self {
        self.persistent_failure = Some(DeviceAccessError::NotFound);
        self
    }

    /// Fails the next acquisition with `error`. Queued failures are consumed
    /// in order before normal behavior resumes.
    pub fn fail_next(mut self, error: DeviceAccessError) -> Self {
        self.pending_failures.push_back(error);
        self
    }

    /// Returns a probe that observes acquisitions and releases.
    pub fn probe(&self) -> MockProbe {
        self.probe.clone()
    }
}

impl VideoSource for MockSource {
    type Stream = MockStream;

    fn acquire(&mut self, constraints: &StreamConstraints) -> Result<MockStream, DeviceAccessError> {
        if let Some(error) = self.pending_failures.pop_front() {
            tracing::info!(%error, "MockSource refusing access");
            return Err(error);
        }
        if let Some(error) = &self.persistent_failure {
            tracing::info!(%error, "MockSource refusing access");
            return Err(error.clone());
        }

        let (width, height) = self.native_resolution.unwrap_or((
            constraints.ideal_width.min(MOCK_MAX_RESOLUTION.0),
            constraints.ideal_height.min(MOCK_MAX_RESOLUTION.1),
        ));
        if width == 0 || height == 0 {
            return Err(DeviceAccessError::Unavailable(
                "requested zero-sized stream".to_string(),
            ));
        }

        self.probe.counters.acquisitions.fetch_add(1, Ordering::SeqCst);
        tracing::info!(width, height, facing = ?constraints.facing, "MockSource stream opened");

        Ok(MockStream {
            tracks: vec![Track::video("Mock camera")],
            width,
            height,
            sequence: 0,
            released: false,
            probe: self.probe.clone(),
        })
    }
}

/// Stream handed out by [`MockSource`].
#[derive(Debug)]
pub struct MockStream {
    tracks: Vec<Track>,
    width: u32,
    height: u32,
    sequence: u64,
    released: bool,
    probe: MockProbe,
}

impl MediaStream for MockStream {
    fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    fn tracks_mut(&mut self) -> &mut [Track] {
        &mut self.tracks
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn read_frame(&mut self) -> Result<Frame, CameraError> {
        if !self.is_live() {
            return Err(CameraError::Ended);
        }

        // Diagonal gradient that shifts with every frame
        let shift = self.sequence as usize;
        let len = (self.width as usize)
            .saturating_mul(self.height as usize)
            .saturating_mul(3);
        let mut pixels = Vec::with_capacity(len);
        for y in 0..self.height as usize {
            for x in 0..self.width as usize {
                pixels.push(((x + shift) % 256) as u8);
                pixels.push(((y + shift) % 256) as u8);
                pixels.push(((x + y) % 256) as u8);
            }
        }

        self.sequence += 1;
        Ok(Frame::new(
            pixels,
            self.width,
            self.height,
            PixelFormat::Rgb8,
            self.sequence,
        ))
    }

    fn stop(&mut self) {
        for track in &mut self.tracks {
            track.stop();
        }
        if !self.released {
            self.released = true;
            self.probe.counters.releases.fetch_add(1, Ordering::SeqCst);
            tracing::info!("MockSource stream released");
        }
    }
}
