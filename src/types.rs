// src/types.rs

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_device")]
    pub device: i32,
    #[serde(default = "default_width")]
    pub width: i32,
    #[serde(default = "default_height")]
    pub height: i32,
    /// Fractions of the full capture frame to cut away, each in [0, 1).
    /// Always relative to the configured resolution, not the cropped frame.
    #[serde(default)]
    pub crop_top: f64,
    #[serde(default)]
    pub crop_bottom: f64,
    #[serde(default)]
    pub crop_left: f64,
    #[serde(default)]
    pub crop_right: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Minimum contour area (px) for a foreground blob to count as motion.
    #[serde(default = "default_min_area")]
    pub min_area: f64,
    /// Consecutive motion frames needed before an episode is considered real.
    #[serde(default = "default_min_moving_frames")]
    pub min_moving_frames: u32,
    /// Consecutive silent frames tolerated before an episode is closed.
    #[serde(default = "default_max_silent_frames")]
    pub max_silent_frames: u32,
    /// Weight of the current frame in the running background average.
    #[serde(default = "default_decay")]
    pub decay: f64,
    /// Playback-speed correction applied to the effective fps at episode close.
    #[serde(default = "default_fps_calibration")]
    pub fps_calibration: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Working directory; backgrounds/ and media/ live underneath it.
    #[serde(default = "default_root")]
    pub root: String,
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_device() -> i32 {
    0
}

fn default_width() -> i32 {
    640
}

fn default_height() -> i32 {
    480
}

fn default_min_area() -> f64 {
    5000.0
}

fn default_min_moving_frames() -> u32 {
    5
}

fn default_max_silent_frames() -> u32 {
    20
}

fn default_decay() -> f64 {
    0.5
}

fn default_fps_calibration() -> f64 {
    0.6
}

fn default_root() -> String {
    ".".to_string()
}

fn default_file_prefix() -> String {
    "cat".to_string()
}

fn default_log_level() -> String {
    "debug".to_string()
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            width: default_width(),
            height: default_height(),
            crop_top: 0.0,
            crop_bottom: 0.0,
            crop_left: 0.0,
            crop_right: 0.0,
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_area: default_min_area(),
            min_moving_frames: default_min_moving_frames(),
            max_silent_frames: default_max_silent_frames(),
            decay: default_decay(),
            fps_calibration: default_fps_calibration(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            file_prefix: default_file_prefix(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Overall travel direction of one movement episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    Outbound,
    Inbound,
    Ambiguous,
}

impl Direction {
    /// Single-digit code used in artifact filenames.
    pub fn code(self) -> u8 {
        match self {
            Direction::Outbound => 0,
            Direction::Inbound => 1,
            Direction::Ambiguous => 2,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Direction::Outbound => "went out",
            Direction::Inbound => "came in",
            Direction::Ambiguous => "is being a quantum boy",
        }
    }
}
