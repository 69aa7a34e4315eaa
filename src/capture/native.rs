//! Native camera access through `nokhwa`.

use super::{
    CameraError, DeviceAccessError, Frame, MediaStream, PixelFormat, StreamConstraints, Track,
    VideoSource,
};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
};
use nokhwa::Camera as NokhwaCamera;

/// Video source backed by the platform camera API.
///
/// Facing mode is not exposed by desktop backends; the device index in the
/// constraints selects the camera instead.
#[derive(Debug, Default)]
pub struct NativeSource;

impl NativeSource {
    pub fn new() -> Self {
        Self
    }
}

impl VideoSource for NativeSource {
    type Stream = NativeStream;

    fn acquire(
        &mut self,
        constraints: &StreamConstraints,
    ) -> Result<NativeStream, DeviceAccessError> {
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
            CameraFormat::new(
                Resolution::new(constraints.ideal_width, constraints.ideal_height),
                FrameFormat::MJPEG,
                constraints.fps,
            ),
        ));

        let mut camera =
            NokhwaCamera::new(CameraIndex::Index(constraints.device_id), requested)
                .map_err(|e| classify(e.to_string()))?;
        camera
            .open_stream()
            .map_err(|e| classify(e.to_string()))?;

        let resolution = camera.resolution();
        let label = camera.info().human_name();
        tracing::info!(
            device = %label,
            width = resolution.width(),
            height = resolution.height(),
            "Native camera stream opened"
        );

        Ok(NativeStream {
            camera,
            tracks: vec![Track::video(label)],
            width: resolution.width(),
            height: resolution.height(),
            sequence: 0,
        })
    }
}

fn classify(message: String) -> DeviceAccessError {
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") {
        DeviceAccessError::PermissionDenied
    } else if lower.contains("not found") || lower.contains("no device") {
        DeviceAccessError::NotFound
    } else {
        DeviceAccessError::Unavailable(message)
    }
}

/// Stream handed out by [`NativeSource`].
pub struct NativeStream {
    camera: NokhwaCamera,
    tracks: Vec<Track>,
    width: u32,
    height: u32,
    sequence: u64,
}

impl MediaStream for NativeStream {
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

        let buffer = self
            .camera
            .frame()
            .map_err(|e| CameraError::ReadFailed(e.to_string()))?;
        let decoded = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| CameraError::ReadFailed(e.to_string()))?;

        let (width, height) = (decoded.width(), decoded.height());
        self.sequence += 1;
        Ok(Frame::new(
            decoded.into_raw(),
            width,
            height,
            PixelFormat::Rgb8,
            self.sequence,
        ))
    }

    fn stop(&mut self) {
        for track in &mut self.tracks {
            track.stop();
        }
        if let Err(e) = self.camera.stop_stream() {
            tracing::warn!(error = %e, "Failed to stop native camera stream");
        }
    }
}
