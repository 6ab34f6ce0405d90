// src/background.rs
//
// Exponentially-weighted running average of the camera's view, used as the
// baseline that foreground detection diffs against. Snapshots are persisted
// as append-only numbered slots so a restart picks up where the last session
// left off instead of re-learning the scene.

use anyhow::{ensure, Context, Result};
use opencv::{
    core::{self, Mat},
    imgproc,
    prelude::*,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

pub struct BackgroundModel {
    model: Option<Mat>,
    slot: PathBuf,
    decay: f64,
}

impl BackgroundModel {
    /// Load the most recently modified snapshot from `dir`, if any, and
    /// allocate a fresh slot for this session. Old snapshots are retained
    /// history and never overwritten.
    ///
    /// Selection is by filesystem mtime rather than by slot number, so slots
    /// written out of order still resolve to the newest model. That leans on
    /// mtime granularity; see DESIGN.md.
    pub fn restore(dir: &Path, decay: f64) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create background dir {}", dir.display()))?;

        let mut latest: Option<(SystemTime, PathBuf)> = None;
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let modified = entry.metadata()?.modified()?;
            if latest.as_ref().map_or(true, |(t, _)| modified > *t) {
                latest = Some((modified, entry.path()));
            }
        }

        let model = match &latest {
            Some((_, path)) => {
                let model = read_snapshot(path)
                    .with_context(|| format!("failed to load background {}", path.display()))?;
                debug!("loaded background from {}", path.display());
                Some(model)
            }
            None => None,
        };

        let slot = next_slot(dir, latest.as_ref().map(|(_, p)| p.as_path()));
        let background = Self { model, slot, decay };
        if background.model.is_some() {
            background.persist()?;
        }
        Ok(background)
    }

    pub fn is_initialized(&self) -> bool {
        self.model.is_some()
    }

    /// Seed the model from the first frame seen when nothing was restored.
    /// Persists immediately so even a crash mid-session leaves a baseline.
    pub fn initialize(&mut self, grey: &Mat) -> Result<()> {
        let mut model = Mat::default();
        grey.convert_to(&mut model, core::CV_32F, 1.0, 0.0)?;
        self.model = Some(model);
        self.persist()?;
        debug!("initialised background");
        Ok(())
    }

    /// Fold the current frame into the running average:
    /// `model = decay * frame + (1 - decay) * model`.
    pub fn update(&mut self, grey: &Mat) -> Result<()> {
        let model = self
            .model
            .as_mut()
            .context("background model not initialised")?;
        imgproc::accumulate_weighted(grey, model, self.decay, &core::no_array())?;
        Ok(())
    }

    /// 8-bit rendering of the model for diffing against incoming frames.
    pub fn render(&self) -> Result<Mat> {
        let model = self
            .model
            .as_ref()
            .context("background model not initialised")?;
        let mut rendered = Mat::default();
        core::convert_scale_abs(model, &mut rendered, 1.0, 0.0)?;
        Ok(rendered)
    }

    /// Write the current model to this session's slot. A no-op until the
    /// model has been initialised.
    pub fn persist(&self) -> Result<()> {
        let Some(model) = &self.model else {
            return Ok(());
        };
        write_snapshot(&self.slot, model)
            .with_context(|| format!("failed to persist background {}", self.slot.display()))
    }

    #[cfg(test)]
    fn slot(&self) -> &Path {
        &self.slot
    }

    #[cfg(test)]
    fn model(&self) -> Option<&Mat> {
        self.model.as_ref()
    }
}

/// Pick the next unused `bg<N>.bin` slot, counting up from the slot that was
/// just loaded. Skips over any numbers already on disk.
fn next_slot(dir: &Path, latest: Option<&Path>) -> PathBuf {
    let mut ix = latest
        .and_then(|p| p.file_stem())
        .and_then(|s| s.to_str())
        .and_then(|s| s.strip_prefix("bg"))
        .and_then(|s| s.parse::<u64>().ok())
        .map_or(1, |n| n + 1);
    loop {
        let candidate = dir.join(format!("bg{ix}.bin"));
        if !candidate.exists() {
            return candidate;
        }
        ix += 1;
    }
}

// Snapshot blob: rows u32 LE, cols u32 LE, then rows*cols f32 LE values.

fn write_snapshot(path: &Path, model: &Mat) -> Result<()> {
    let rows = model.rows();
    let cols = model.cols();
    let values = model.data_typed::<f32>()?;
    let mut buf = Vec::with_capacity(8 + values.len() * 4);
    buf.extend_from_slice(&(rows as u32).to_le_bytes());
    buf.extend_from_slice(&(cols as u32).to_le_bytes());
    for v in values {
        buf.extend_from_slice(&v.to_le_bytes());
    }
    fs::write(path, buf)?;
    Ok(())
}

fn read_snapshot(path: &Path) -> Result<Mat> {
    let raw = fs::read(path)?;
    ensure!(raw.len() >= 8, "background snapshot too short");
    let rows = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize;
    let cols = u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]) as usize;
    ensure!(
        raw.len() == 8 + rows * cols * 4,
        "background snapshot truncated: expected {}x{} values",
        rows,
        cols
    );
    let values: Vec<f32> = raw[8..]
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    let flat = Mat::from_slice(&values)?;
    Ok(flat.reshape(1, rows as i32)?.try_clone()?)
}
