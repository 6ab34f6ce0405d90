// src/camera.rs

use crate::capture::FrameSource;
use crate::types::CaptureConfig;
use anyhow::Result;
use opencv::{
    core::Mat,
    prelude::*,
    videoio::{self, VideoCapture},
};
use tracing::info;

/// Live camera device behind the capture loop's `FrameSource` seam.
pub struct Camera {
    cap: VideoCapture,
}

impl Camera {
    /// Open the configured device at the configured resolution. An
    /// unavailable device is the one fatal startup error in this system.
    pub fn open(config: &CaptureConfig) -> Result<Self> {
        let mut cap = VideoCapture::new(config.device, videoio::CAP_ANY)?;
        if !cap.is_opened()? {
            anyhow::bail!("failed to open camera device {}", config.device);
        }
        cap.set(videoio::CAP_PROP_FRAME_WIDTH, config.width as f64)?;
        cap.set(videoio::CAP_PROP_FRAME_HEIGHT, config.height as f64)?;
        info!(
            "camera {} opened at {}x{}",
            config.device, config.width, config.height
        );
        Ok(Self { cap })
    }
}

impl FrameSource for Camera {
    fn read_frame(&mut self) -> Result<Option<Mat>> {
        let mut mat = Mat::default();
        if !self.cap.read(&mut mat)? || mat.empty() {
            return Ok(None);
        }
        Ok(Some(mat))
    }
}
