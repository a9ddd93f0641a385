use std::{str::FromStr, time::Duration};

use log::warn;

use crate::camera::{
    FrameFormat, DEFAULT_PREVIEW_HEIGHT, DEFAULT_PREVIEW_MODE, DEFAULT_PREVIEW_WIDTH,
};

/// Runtime knobs for the preview session and the splash screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraConfig {
    pub preview_width: u32,
    pub preview_height: u32,
    /// Format requested first when a device connects.
    pub preferred_format: FrameFormat,
    /// Format tried once when the preferred one is rejected.
    pub fallback_format: FrameFormat,
    pub splash_delay: Duration,
    /// Local capture device used by the desktop build.
    pub camera_index: usize,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            preview_width: DEFAULT_PREVIEW_WIDTH,
            preview_height: DEFAULT_PREVIEW_HEIGHT,
            preferred_format: FrameFormat::Mjpeg,
            fallback_format: DEFAULT_PREVIEW_MODE,
            splash_delay: Duration::from_millis(3000),
            camera_index: 0,
        }
    }
}

impl CameraConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the defaults and applies every override `lookup` knows about.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        override_with(&lookup, "UVC_PREVIEW_WIDTH", &mut config.preview_width);
        override_with(&lookup, "UVC_PREVIEW_HEIGHT", &mut config.preview_height);
        override_with(&lookup, "UVC_CAMERA_INDEX", &mut config.camera_index);
        let mut splash_ms = config.splash_delay.as_millis() as u64;
        override_with(&lookup, "UVC_SPLASH_MS", &mut splash_ms);
        config.splash_delay = Duration::from_millis(splash_ms);
        config
    }
}

fn override_with<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, target: &mut T) {
    if let Some(raw) = lookup(key) {
        match raw.trim().parse() {
            Ok(value) => *target = value,
            Err(_) => warn!("ignoring {key}={raw:?}: not a valid value"),
        }
    }
}
