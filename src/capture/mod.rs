//! Camera access and frame handling.
//!
//! This module provides the device abstraction a capture session acquires
//! streams from, the frame type read from those streams, and the session
//! configuration.

mod config;
mod device;
mod frame;
#[cfg(feature = "camera")]
mod native;

pub use config::{
    ConfigError, FacingMode, FileConfig, MAX_DIMENSION, OutputConfig, SessionConfig, StillFormat,
    StreamConstraints,
};
pub use device::{
    CameraError, DeviceAccessError, MediaStream, MockProbe, MockSource, MockStream, Track,
    TrackKind, VideoSource, CAMERA_ACCESS_MESSAGE, MOCK_MAX_RESOLUTION,
};
pub use frame::{Frame, PixelFormat};
#[cfg(feature = "camera")]
pub use native::{NativeSource, NativeStream};
