//! Capture session configuration.
//!
//! Resolution and facing mode are hints passed to the device; the stream
//! may come back at a different native size.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Largest accepted width or height hint.
pub const MAX_DIMENSION: u32 = 8192;

/// Which camera the user prefers on devices with more than one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Front camera, facing the user.
    #[default]
    User,
    /// Rear camera.
    Environment,
}

/// Output format for captured stills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StillFormat {
    #[default]
    Png,
    Jpeg,
}

/// Constraints sent with a stream request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConstraints {
    /// Device index, used by sources that expose several cameras.
    pub device_id: u32,
    /// Ideal frame width in pixels.
    pub ideal_width: u32,
    /// Ideal frame height in pixels.
    pub ideal_height: u32,
    /// Facing preference.
    pub facing: FacingMode,
    /// Ideal frames per second.
    pub fps: u32,
}

impl Default for StreamConstraints {
    fn default() -> Self {
        SessionConfig::default().constraints()
    }
}

/// Configuration for one capture session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Camera device index.
    pub device_id: u32,
    /// Ideal frame width in pixels.
    pub width: u32,
    /// Ideal frame height in pixels.
    pub height: u32,
    /// Facing preference.
    pub facing: FacingMode,
    /// Ideal frames per second.
    pub fps: u32,
    /// Delay between the stream going active and the detection check.
    pub detection_delay_ms: u64,
    /// Countdown length for hands-free capture, in seconds.
    pub countdown_secs: u32,
    /// Start the countdown automatically once a subject is detected.
    pub auto_capture: bool,
    /// Duration of the capture pulse.
    pub pulse_ms: u64,
    /// Encoding of captured stills.
    pub format: StillFormat,
    /// JPEG quality (1-100), ignored for PNG.
    pub jpeg_quality: u8,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            device_id: 0,
            width: 640,
            height: 480,
            facing: FacingMode::User,
            fps: 30,
            detection_delay_ms: 1500,
            countdown_secs: 3,
            auto_capture: false,
            pulse_ms: 500,
            format: StillFormat::Png,
            jpeg_quality: 92,
        }
    }
}

impl SessionConfig {
    /// Creates a configuration with the specified resolution hint.
    pub fn with_dimensions(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    /// Stream constraints derived from this configuration.
    pub fn constraints(&self) -> StreamConstraints {
        StreamConstraints {
            device_id: self.device_id,
            ideal_width: self.width,
            ideal_height: self.height,
            facing: self.facing,
            fps: self.fps,
        }
    }

    /// Detection delay as a [`Duration`].
    pub fn detection_delay(&self) -> Duration {
        Duration::from_millis(self.detection_delay_ms)
    }

    /// Pulse duration as a [`Duration`].
    pub fn pulse_duration(&self) -> Duration {
        Duration::from_millis(self.pulse_ms)
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0
            || self.height == 0
            || self.width > MAX_DIMENSION
            || self.height > MAX_DIMENSION
        {
            return Err(ConfigError::InvalidDimensions);
        }
        if self.fps == 0 || self.fps > 120 {
            return Err(ConfigError::InvalidFrameRate);
        }
        if self.detection_delay_ms == 0 {
            return Err(ConfigError::InvalidDetectionDelay);
        }
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(ConfigError::InvalidQuality(self.jpeg_quality));
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid frame dimensions (must be 1-8192 pixels)")]
    InvalidDimensions,
    #[error("invalid frame rate (must be 1-120 fps)")]
    InvalidFrameRate,
    #[error("detection delay must be non-zero")]
    InvalidDetectionDelay,
    #[error("invalid jpeg quality {0} (must be 1-100)")]
    InvalidQuality(u8),
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory captured stills are written to.
    pub directory: PathBuf,
    /// Metrics server port (0 to disable).
    pub metrics_port: u16,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            metrics_port: 0,
        }
    }
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.session.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.detection_delay(), Duration::from_millis(1500));
        assert_eq!(config.pulse_duration(), Duration::from_millis(500));
    }

    #[test]
    fn test_zero_dimensions_invalid() {
        let mut config = SessionConfig::default();
        config.width = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDimensions)
        ));
    }

    #[test]
    fn test_oversized_dimensions_invalid() {
        let config = SessionConfig::with_dimensions(40_000, 40_000);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDimensions)
        ));
        assert!(SessionConfig::with_dimensions(MAX_DIMENSION, MAX_DIMENSION)
            .validate()
            .is_ok());
        assert!(FileConfig::from_toml("[session]\nwidth = 9000\n").is_err());
    }

    #[test]
    fn test_zero_detection_delay_invalid() {
        let config = SessionConfig {
            detection_delay_ms: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDetectionDelay)
        ));
    }

    #[test]
    fn test_constraints_carry_hints() {
        let config = SessionConfig {
            facing: FacingMode::Environment,
            ..SessionConfig::with_dimensions(1280, 720)
        };
        let constraints = config.constraints();
        assert_eq!(constraints.ideal_width, 1280);
        assert_eq!(constraints.ideal_height, 720);
        assert_eq!(constraints.facing, FacingMode::Environment);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = FileConfig::from_toml(
            r#"
            [session]
            auto_capture = true
            countdown_secs = 5
            facing = "environment"
            "#,
        )
        .unwrap();

        assert!(config.session.auto_capture);
        assert_eq!(config.session.countdown_secs, 5);
        assert_eq!(config.session.facing, FacingMode::Environment);
        assert_eq!(config.session.width, 640);
        assert_eq!(config.output.metrics_port, 0);
    }

    #[test]
    fn test_invalid_toml_values_rejected() {
        let result = FileConfig::from_toml(
            r#"
            [session]
            fps = 500
            "#,
        );
        assert!(matches!(result, Err(ConfigError::InvalidFrameRate)));

        let result = FileConfig::from_toml("session = 3");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }
}
