// src/main.rs

mod background;
mod camera;
mod capture;
mod classifier;
mod config;
mod direction;
mod media;
mod tracker;
mod types;

use anyhow::Result;
use camera::Camera;
use capture::MotionDetector;
use media::VideoFileSink;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};
use types::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());
    let config = Config::load(Path::new(&config_path))?;

    tracing_subscriber::fmt()
        .with_env_filter(format!("flapwatch={}", config.logging.level))
        .init();

    info!("🐱 flapwatch starting");
    info!(
        "capture {}x{} | min_area={} min_moving_frames={} max_silent_frames={}",
        config.capture.width,
        config.capture.height,
        config.detection.min_area,
        config.detection.min_moving_frames,
        config.detection.max_silent_frames
    );

    let camera = Camera::open(&config.capture)?;
    let sink = VideoFileSink::new(&config.storage)?;
    let mut detector = MotionDetector::new(camera, sink, &config)?;
    detector.start()?;
    info!("✓ Motion detection running");

    // periodic heartbeat; the motion flag tells the controller when it is
    // safe to schedule housekeeping away from an active capture
    let mut heartbeat = tokio::time::interval(Duration::from_secs(300));
    heartbeat.tick().await; // first tick is immediate
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = heartbeat.tick() => {
                debug!("motion currently detected: {}", detector.motion_detected());
            }
        }
    }

    info!("quitting nicely");
    detector.stop()?;

    Ok(())
}
