//! Capture state and configuration

use super::encoder::{Container, EncoderSettings};
use crate::capture::Resolution;
use crate::compositor::clock::DEFAULT_REFRESH_HZ;
use serde::{Deserialize, Serialize};

/// User-facing state of the capture pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureState {
    /// Nothing running
    Idle,
    /// Overlay is being drawn, nothing recorded
    Compositing,
    /// A recording session is active
    Recording,
}

/// State of a single recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    Idle,
    Active,
}

impl Default for RecordingState {
    fn default() -> Self {
        Self::Idle
    }
}

/// Configuration for capture and recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureConfig {
    /// Record the composite surface (overlay burned in) instead of the raw camera
    pub burn_overlay_into_recording: bool,

    /// Keep the overlay running for on-screen preview when recording the raw camera
    pub preview_overlay: bool,

    /// Camera device ID (None = first camera)
    pub device_id: Option<String>,

    /// Surface and requested camera width
    pub width: u32,

    /// Surface and requested camera height
    pub height: u32,

    /// Recording frame rate
    pub fps: u32,

    /// Display refresh rate driving the overlay
    pub refresh_hz: u32,

    /// Output container
    pub container: Container,

    /// Suggested download name, without extension
    pub file_stem: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            burn_overlay_into_recording: true,
            preview_overlay: true,
            device_id: None,
            width: 640,
            height: 480,
            fps: 30,
            refresh_hz: DEFAULT_REFRESH_HZ,
            container: Container::default(),
            file_stem: "webcam-stream-capture".to_string(),
        }
    }
}

impl CaptureConfig {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// Suggested file name for artifacts, e.g. `webcam-stream-capture.webm`
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.file_stem, self.container.extension())
    }

    pub fn encoder_settings(&self) -> EncoderSettings {
        EncoderSettings {
            resolution: self.resolution(),
            fps: self.fps,
            container: self.container,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_from_partial_json() {
        let config: CaptureConfig =
            serde_json::from_str(r#"{"burnOverlayIntoRecording": false, "container": "mp4"}"#)
                .unwrap();

        assert!(!config.burn_overlay_into_recording);
        assert_eq!(config.container, Container::Mp4);
        assert_eq!(config.resolution(), Resolution::new(640, 480));
        assert_eq!(config.file_name(), "webcam-stream-capture.mp4");
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&CaptureState::Recording).unwrap();
        assert_eq!(json, "\"recording\"");
    }
}
