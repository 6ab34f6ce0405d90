// src/media.rs
//
// Output stage for finished episodes: encode the frame buffer to a video
// file named by timestamp and direction code. Upload/notify connectors and
// container transcoding hang off the produced artifact and live outside
// this crate.

use crate::direction;
use crate::tracker::EventSink;
use crate::types::{Direction, StorageConfig};
use anyhow::{ensure, Context, Result};
use opencv::{
    core::{Mat, Size},
    prelude::*,
    videoio::VideoWriter,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

pub struct VideoFileSink {
    dir: PathBuf,
    prefix: String,
}

impl VideoFileSink {
    pub fn new(storage: &StorageConfig) -> Result<Self> {
        let dir = storage.media_dir();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create media dir {}", dir.display()))?;
        Ok(Self {
            dir,
            prefix: storage.file_prefix.clone(),
        })
    }

    fn encode(&self, path: &Path, frames: &[Mat], fps: f64) -> Result<()> {
        let first = frames.first().context("episode contains no frames")?;
        let size = Size::new(first.cols(), first.rows());
        let fourcc = VideoWriter::fourcc('m', 'p', '4', 'v')?;
        let mut writer = VideoWriter::new(
            path.to_str().context("non-utf8 media path")?,
            fourcc,
            fps,
            size,
            true,
        )?;
        ensure!(writer.is_opened()?, "failed to open video writer");
        for frame in frames {
            writer.write(frame)?;
        }
        writer.release()?;
        Ok(())
    }
}

impl EventSink for VideoFileSink {
    fn fire(&mut self, frames: &[Mat], fps: f64, centroids: &[f64]) -> Result<()> {
        ensure!(!frames.is_empty(), "episode contains no frames");
        ensure!(fps > 0.0, "non-positive frame rate {fps}");

        let direction = direction::estimate(centroids);
        debug!("the cat {}", direction.message());

        // encode to a temp name first so a crash never leaves a half-written
        // file under a final name
        let temp = self.dir.join("temp.mp4");
        self.encode(&temp, frames, fps)?;

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .context("system clock before epoch")?;
        let name = artifact_name(&self.prefix, now.as_secs(), now.subsec_micros(), direction);
        let path = self.dir.join(name);
        fs::rename(&temp, &path)
            .with_context(|| format!("failed to rename {} to {}", temp.display(), path.display()))?;

        info!("captured {}", path.display());
        Ok(())
    }
}

/// `<prefix>_<secs>_<micros>-<direction code>.mp4`, e.g. `cat_1756450000_123456-1.mp4`.
fn artifact_name(prefix: &str, secs: u64, micros: u32, direction: Direction) -> String {
    format!("{prefix}_{secs}_{micros:06}-{}.mp4", direction.code())
}
