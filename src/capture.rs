// src/capture.rs
//
// The driving loop: pull frames from the camera on a dedicated worker
// thread, run them through background model, classifier and episode
// tracker, and keep the effective frame rate current. The controller only
// ever touches two atomic flags; everything else is owned by the worker.

use crate::background::BackgroundModel;
use crate::classifier::FrameClassifier;
use crate::tracker::{EpisodeTracker, EventSink, FrameOutcome, TrackerConfig};
use crate::types::Config;
use anyhow::{Context, Result};
use opencv::core::Mat;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, trace, warn};

/// Anything the capture loop can pull frames from. The live camera is one
/// implementation; tests script their own.
pub trait FrameSource: Send {
    /// Next frame, `Ok(None)` for a missed frame. Blocking is expected; a
    /// stalled source stalls the loop (operator restarts the process).
    fn read_frame(&mut self) -> Result<Option<Mat>>;
}

#[derive(Default)]
struct SharedState {
    stop: AtomicBool,
    motion: AtomicBool,
}

pub struct MotionDetector {
    shared: Arc<SharedState>,
    worker: Option<Worker>,
    handle: Option<JoinHandle<Worker>>,
}

impl MotionDetector {
    pub fn new(
        source: impl FrameSource + 'static,
        sink: impl EventSink + 'static,
        config: &Config,
    ) -> Result<Self> {
        let shared = Arc::new(SharedState::default());
        let background = BackgroundModel::restore(
            &config.storage.backgrounds_dir(),
            config.detection.decay,
        )?;
        let classifier = FrameClassifier::new(&config.capture, config.detection.min_area);
        let tracker = EpisodeTracker::new(TrackerConfig {
            min_moving_frames: config.detection.min_moving_frames,
            max_silent_frames: config.detection.max_silent_frames,
            fps_calibration: config.detection.fps_calibration,
        });
        Ok(Self {
            shared: shared.clone(),
            worker: Some(Worker {
                source: Box::new(source),
                sink: Box::new(sink),
                classifier,
                background,
                tracker,
                fps: FpsCounter::start(),
                shared,
            }),
            handle: None,
        })
    }

    /// Spawn the capture worker. A no-op while one is already running.
    pub fn start(&mut self) -> Result<()> {
        if self.handle.is_some() {
            debug!("capture loop already running");
            return Ok(());
        }
        let worker = self
            .worker
            .take()
            .context("capture worker lost after a failed stop")?;
        self.shared.stop.store(false, Ordering::Relaxed);
        self.handle = Some(thread::spawn(move || worker.run()));
        Ok(())
    }

    /// Ask the worker to finish its current frame and exit, then wait for
    /// it. The worker persists the background model and drops any
    /// unfinished episode on the way out. Safe to call when not running.
    pub fn stop(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        self.shared.stop.store(true, Ordering::Relaxed);
        match handle.join() {
            Ok(worker) => {
                self.worker = Some(worker);
                Ok(())
            }
            Err(_) => anyhow::bail!("capture worker panicked"),
        }
    }

    /// Whether a confirmed movement episode is in progress right now.
    /// Written only by the worker; the controller uses it to schedule
    /// maintenance away from active captures.
    pub fn motion_detected(&self) -> bool {
        self.shared.motion.load(Ordering::Relaxed)
    }
}

struct Worker {
    source: Box<dyn FrameSource>,
    sink: Box<dyn EventSink>,
    classifier: FrameClassifier,
    background: BackgroundModel,
    tracker: EpisodeTracker,
    fps: FpsCounter,
    shared: Arc<SharedState>,
}

impl Worker {
    /// Blocking pull-loop. Returns `self` so the controller can restart the
    /// pipeline with its state (background model included) intact.
    fn run(mut self) -> Self {
        self.fps = FpsCounter::start();
        loop {
            if self.shared.stop.load(Ordering::Relaxed) {
                break;
            }
            let frame = match self.source.read_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    debug!("missed a frame");
                    continue;
                }
                Err(e) => {
                    warn!("frame acquisition failed: {e:#}");
                    continue;
                }
            };
            // one bad frame must never kill the loop or strand an episode
            if let Err(e) = self.step(frame) {
                warn!("frame dropped: {e:#}");
            }
        }

        self.tracker.discard();
        self.shared.motion.store(false, Ordering::Relaxed);
        if let Err(e) = self.background.persist() {
            warn!("failed to persist background on stop: {e:#}");
        }
        debug!("capture worker stopped");
        self
    }

    fn step(&mut self, frame: Mat) -> Result<()> {
        let prepared = self.classifier.prepare(&frame)?;

        if !self.background.is_initialized() {
            // first frame of a fresh install seeds the model, nothing else
            self.background.initialize(&prepared)?;
            return Ok(());
        }
        self.background.update(&prepared)?;

        let classification = self
            .classifier
            .classify(&prepared, &self.background.render()?)?;
        if !classification.contours.is_empty() {
            trace!("{} qualifying contours", classification.contours.len());
        }

        let fps = self.fps.tick();
        let outcome =
            self.tracker
                .observe(frame, &classification.centroids, fps, self.sink.as_mut());
        if let FrameOutcome::Closed { .. } = outcome {
            if let Err(e) = self.background.persist() {
                warn!("failed to persist background: {e:#}");
            }
        }
        self.shared
            .motion
            .store(self.tracker.motion_detected(), Ordering::Relaxed);
        Ok(())
    }
}

/// Effective frame rate: frames processed over wall time since loop start.
struct FpsCounter {
    started: Instant,
    frames: u64,
}

impl FpsCounter {
    fn start() -> Self {
        Self::start_at(Instant::now())
    }

    fn start_at(started: Instant) -> Self {
        Self { started, frames: 0 }
    }

    fn tick(&mut self) -> f64 {
        self.tick_at(Instant::now())
    }

    fn tick_at(&mut self, now: Instant) -> f64 {
        self.frames += 1;
        let elapsed = now.duration_since(self.started).as_secs_f64();
        if elapsed > 0.0 {
            self.frames as f64 / elapsed
        } else {
            0.0
        }
    }
}
