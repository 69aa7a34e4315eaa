//! Still-frame encoding.
//!
//! Turns a raw [`crate::capture::Frame`] into an owned, encoded
//! [`CapturedImage`] that is handed to capture collaborators.

mod encoder;

pub use encoder::{EncodeError, EncodingFormat, StillEncoder};

use chrono::{DateTime, Utc};

/// An encoded still frame.
///
/// Owned outright by whoever receives it; the capture session keeps no
/// reference after handing it over.
#[derive(Clone, PartialEq, Eq)]
pub struct CapturedImage {
    data: Vec<u8>,
    format: EncodingFormat,
    width: u32,
    height: u32,
    captured_at: DateTime<Utc>,
}

impl CapturedImage {
    /// Wraps already-encoded bytes.
    pub fn new(data: Vec<u8>, format: EncodingFormat, width: u32, height: u32) -> Self {
        Self {
            data,
            format,
            width,
            height,
            captured_at: Utc::now(),
        }
    }

    /// Encoded bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the image and returns the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn format(&self) -> EncodingFormat {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// When the frame was captured.
    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// MIME type of the encoded bytes.
    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }

    /// Suggested file name built from the capture time.
    pub fn file_name(&self, prefix: &str) -> String {
        format!(
            "{}_{}.{}",
            prefix,
            self.captured_at.format("%Y%m%d_%H%M%S%.3f"),
            self.format.extension()
        )
    }
}

impl std::fmt::Debug for CapturedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturedImage")
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .field("captured_at", &self.captured_at)
            .finish()
    }
}
