//! PNG and JPEG encoding of raw frames.

use super::CapturedImage;
use crate::capture::{Frame, PixelFormat, StillFormat};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder as _};
use thiserror::Error;

/// Errors that can occur while encoding a still.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("frame buffer does not match its dimensions ({width}x{height}, {bytes} bytes)")]
    InvalidFrame { width: u32, height: u32, bytes: usize },
    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),
}

/// Supported still formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncodingFormat {
    /// Lossless.
    #[default]
    Png,
    /// Lossy, with quality 1-100.
    Jpeg { quality: u8 },
}

impl EncodingFormat {
    /// File extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            EncodingFormat::Png => "png",
            EncodingFormat::Jpeg { .. } => "jpg",
        }
    }

    /// MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            EncodingFormat::Png => "image/png",
            EncodingFormat::Jpeg { .. } => "image/jpeg",
        }
    }

    /// Builds the encoding format from the configured still format.
    pub fn from_setting(format: StillFormat, jpeg_quality: u8) -> Self {
        match format {
            StillFormat::Png => EncodingFormat::Png,
            StillFormat::Jpeg => EncodingFormat::Jpeg {
                quality: jpeg_quality.clamp(1, 100),
            },
        }
    }
}

/// Encodes frames at their native dimensions.
#[derive(Debug, Clone, Copy, Default)]
pub struct StillEncoder {
    format: EncodingFormat,
}

impl StillEncoder {
    /// Creates an encoder for the given format.
    pub fn new(format: EncodingFormat) -> Self {
        Self { format }
    }

    /// Output format of this encoder.
    pub fn format(&self) -> EncodingFormat {
        self.format
    }

    /// Encodes a frame into a captured image.
    pub fn encode(&self, frame: &Frame) -> Result<CapturedImage, EncodeError> {
        if !frame.is_valid() {
            return Err(EncodeError::InvalidFrame {
                width: frame.width(),
                height: frame.height(),
                bytes: frame.pixels().len(),
            });
        }

        let color = match frame.format() {
            PixelFormat::Gray8 => ExtendedColorType::L8,
            PixelFormat::Rgb8 => ExtendedColorType::Rgb8,
        };

        let mut buffer = Vec::new();
        match self.format {
            EncodingFormat::Png => {
                PngEncoder::new(&mut buffer).write_image(
                    frame.pixels(),
                    frame.width(),
                    frame.height(),
                    color,
                )?;
            }
            EncodingFormat::Jpeg { quality } => {
                JpegEncoder::new_with_quality(&mut buffer, quality).write_image(
                    frame.pixels(),
                    frame.width(),
                    frame.height(),
                    color,
                )?;
            }
        }

        tracing::debug!(
            format = self.format.extension(),
            width = frame.width(),
            height = frame.height(),
            bytes = buffer.len(),
            "Encoded still frame"
        );

        Ok(CapturedImage::new(
            buffer,
            self.format,
            frame.width(),
            frame.height(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    fn rgb_frame(width: u32, height: u32) -> Frame {
        let pixels = (0..width * height * 3).map(|i| (i % 251) as u8).collect();
        Frame::new(pixels, width, height, PixelFormat::Rgb8, 1)
    }

    #[test]
    fn test_png_keeps_frame_dimensions() {
        let image = StillEncoder::default().encode(&rgb_frame(32, 24)).unwrap();

        assert_eq!(image.format(), EncodingFormat::Png);
        assert_eq!(image.mime_type(), "image/png");
        assert_eq!((image.width(), image.height()), (32, 24));
        assert_eq!(&image.bytes()[..8], &PNG_SIGNATURE);

        let decoded = image::load_from_memory(image.bytes()).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 24));
    }

    #[test]
    fn test_grayscale_png() {
        let frame = Frame::new(vec![128u8; 16 * 16], 16, 16, PixelFormat::Gray8, 1);
        let image = StillEncoder::default().encode(&frame).unwrap();
        assert_eq!(&image.bytes()[..8], &PNG_SIGNATURE);
    }

    #[test]
    fn test_jpeg_encoding() {
        let encoder = StillEncoder::new(EncodingFormat::Jpeg { quality: 80 });
        let image = encoder.encode(&rgb_frame(16, 16)).unwrap();

        // JPEG start-of-image marker
        assert_eq!(&image.bytes()[..2], &[0xFF, 0xD8]);
        assert!(image.file_name("capture").ends_with(".jpg"));
    }

    #[test]
    fn test_mismatched_buffer_rejected() {
        let frame = Frame::new(vec![0u8; 10], 16, 16, PixelFormat::Rgb8, 1);
        assert!(matches!(
            StillEncoder::default().encode(&frame),
            Err(EncodeError::InvalidFrame { bytes: 10, .. })
        ));
    }

    #[test]
    fn test_format_from_setting() {
        assert_eq!(
            EncodingFormat::from_setting(StillFormat::Png, 50),
            EncodingFormat::Png
        );
        assert_eq!(
            EncodingFormat::from_setting(StillFormat::Jpeg, 0),
            EncodingFormat::Jpeg { quality: 1 }
        );
    }
}
