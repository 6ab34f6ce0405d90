// src/tracker.rs
//
// Frame-by-frame state machine deciding whether a movement episode is in
// progress, has just ended, or never amounted to anything. Frames are
// buffered from the very first qualifying contour; the min_moving_frames
// threshold only gates whether the finished buffer is worth emitting.

use anyhow::Result;
use opencv::core::Mat;
use tracing::{debug, warn};

/// Everything the tracker asks of the output stage. One finished episode is
/// handed over at most once; failures are the sink's problem to report and
/// never come back to bite the capture loop.
pub trait EventSink: Send {
    fn fire(&mut self, frames: &[Mat], fps: f64, centroids: &[f64]) -> Result<()>;
}

/// What happened to the tracker on this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// No episode active and nothing started.
    Idle,
    /// An episode is accumulating frames (motion, or within the grace period).
    Accumulating,
    /// The episode just closed. `emitted` is false for a false alarm.
    Closed { emitted: bool },
}

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub min_moving_frames: u32,
    pub max_silent_frames: u32,
    pub fps_calibration: f64,
}

pub struct EpisodeTracker {
    config: TrackerConfig,
    moving_frames: u32,
    silent_frames: u32,
    frames: Vec<Mat>,
    centroids: Vec<f64>,
    motion: bool,
}

impl EpisodeTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            moving_frames: 0,
            silent_frames: 0,
            frames: Vec::new(),
            centroids: Vec::new(),
            motion: false,
        }
    }

    /// Feed one classified frame through the state machine. `frame` is the
    /// raw capture (ownership moves into the episode buffer while one is
    /// active); `frame_centroids` are the qualifying-contour centroids from
    /// the classifier; `fps` is the effective frame rate as of this frame.
    pub fn observe(
        &mut self,
        frame: Mat,
        frame_centroids: &[f64],
        fps: f64,
        sink: &mut dyn EventSink,
    ) -> FrameOutcome {
        if frame_centroids.is_empty() {
            if self.moving_frames == 0 {
                return FrameOutcome::Idle;
            }

            self.silent_frames += 1;

            // grace period: keep buffering, carry the last centroid forward
            if let Some(&last) = self.centroids.last() {
                self.centroids.push(last);
                self.frames.push(frame);
            }

            if self.silent_frames == self.config.max_silent_frames {
                let emitted = self.close(fps, sink);
                return FrameOutcome::Closed { emitted };
            }
            FrameOutcome::Accumulating
        } else {
            self.moving_frames += 1;
            self.silent_frames = 0;
            self.frames.push(frame);
            let mean =
                frame_centroids.iter().sum::<f64>() / frame_centroids.len() as f64;
            self.centroids.push(mean);

            if self.moving_frames == 1 {
                debug!("what was that??");
            }
            if self.moving_frames == self.config.min_moving_frames {
                self.motion = true;
                debug!("movement detected");
            }
            FrameOutcome::Accumulating
        }
    }

    /// True once the current episode has been confirmed as real movement;
    /// flips back to false when the episode closes.
    pub fn motion_detected(&self) -> bool {
        self.motion
    }

    /// True while any episode (confirmed or not) is accumulating.
    pub fn is_active(&self) -> bool {
        self.moving_frames > 0
    }

    /// Throw away the in-progress episode without emitting anything.
    /// Used when the capture loop is stopped mid-episode.
    pub fn discard(&mut self) {
        if self.is_active() {
            debug!(
                "discarding unfinished episode ({} buffered frames)",
                self.frames.len()
            );
        }
        self.reset();
    }

    fn close(&mut self, fps: f64, sink: &mut dyn EventSink) -> bool {
        let emitted = self.moving_frames >= self.config.min_moving_frames;
        if emitted {
            debug!("movement ended");
            let playback_fps = fps * self.config.fps_calibration;
            if let Err(e) = sink.fire(&self.frames, playback_fps, &self.centroids) {
                warn!("failed to hand off episode: {e:#}");
            }
        } else {
            debug!("false alarm, sorry");
        }
        self.reset();
        emitted
    }

    fn reset(&mut self) {
        self.motion = false;
        self.moving_frames = 0;
        self.silent_frames = 0;
        self.frames.clear();
        self.centroids.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;

    #[derive(Default)]
    struct RecordingSink {
        episodes: Vec<(usize, f64, Vec<f64>)>,
    }

    impl EventSink for RecordingSink {
        fn fire(&mut self, frames: &[Mat], fps: f64, centroids: &[f64]) -> Result<()> {
            self.episodes.push((frames.len(), fps, centroids.to_vec()));
            Ok(())
        }
    }

    struct FailingSink;

    impl EventSink for FailingSink {
        fn fire(&mut self, _: &[Mat], _: f64, _: &[f64]) -> Result<()> {
            bail!("encoder exploded")
        }
    }

    fn tracker(min_moving: u32, max_silent: u32) -> EpisodeTracker {
        EpisodeTracker::new(TrackerConfig {
            min_moving_frames: min_moving,
            max_silent_frames: max_silent,
            fps_calibration: 0.6,
        })
    }

    fn motion_frame(tracker: &mut EpisodeTracker, sink: &mut dyn EventSink, cx: f64) -> FrameOutcome {
        tracker.observe(Mat::default(), &[cx], 10.0, sink)
    }

    fn silent_frame(tracker: &mut EpisodeTracker, sink: &mut dyn EventSink) -> FrameOutcome {
        tracker.observe(Mat::default(), &[], 10.0, sink)
    }

    #[test]
    fn test_all_silent_input_stays_idle() {
        let mut tracker = tracker(5, 20);
        let mut sink = RecordingSink::default();
        for _ in 0..100 {
            assert_eq!(silent_frame(&mut tracker, &mut sink), FrameOutcome::Idle);
        }
        assert!(sink.episodes.is_empty());
        assert!(!tracker.motion_detected());
        assert!(!tracker.is_active());
    }

    #[test]
    fn test_confirmed_episode_emits_once_with_grace_frames_buffered() {
        let mut tracker = tracker(5, 20);
        let mut sink = RecordingSink::default();

        for i in 0..5 {
            assert_eq!(
                motion_frame(&mut tracker, &mut sink, 100.0 - i as f64),
                FrameOutcome::Accumulating
            );
        }
        assert!(tracker.motion_detected());

        for i in 0..20 {
            let outcome = silent_frame(&mut tracker, &mut sink);
            if i < 19 {
                assert_eq!(outcome, FrameOutcome::Accumulating);
            } else {
                assert_eq!(outcome, FrameOutcome::Closed { emitted: true });
            }
        }

        assert_eq!(sink.episodes.len(), 1);
        let (frame_count, _, centroids) = &sink.episodes[0];
        // 5 motion frames plus all 20 grace frames, closing frame included
        assert_eq!(*frame_count, 25);
        assert_eq!(centroids.len(), 25);
        // grace frames carry the last motion centroid forward
        assert!(centroids[5..].iter().all(|&c| c == 96.0));
        assert!(!tracker.motion_detected());
        assert!(!tracker.is_active());
    }

    #[test]
    fn test_short_burst_is_a_false_alarm() {
        let mut tracker = tracker(5, 3);
        let mut sink = RecordingSink::default();

        for _ in 0..4 {
            motion_frame(&mut tracker, &mut sink, 50.0);
        }
        assert!(!tracker.motion_detected()); // never confirmed

        for i in 0..3 {
            let outcome = silent_frame(&mut tracker, &mut sink);
            if i == 2 {
                assert_eq!(outcome, FrameOutcome::Closed { emitted: false });
            }
        }

        assert!(sink.episodes.is_empty());
        assert!(!tracker.is_active());
        // fully reset: a following silent frame is a no-op again
        assert_eq!(silent_frame(&mut tracker, &mut sink), FrameOutcome::Idle);
    }

    #[test]
    fn test_motion_resets_silent_counter() {
        let mut tracker = tracker(2, 3);
        let mut sink = RecordingSink::default();

        motion_frame(&mut tracker, &mut sink, 10.0);
        motion_frame(&mut tracker, &mut sink, 20.0);
        silent_frame(&mut tracker, &mut sink);
        silent_frame(&mut tracker, &mut sink);
        // motion returns before the grace period runs out
        motion_frame(&mut tracker, &mut sink, 30.0);
        assert!(sink.episodes.is_empty());

        for _ in 0..3 {
            silent_frame(&mut tracker, &mut sink);
        }
        assert_eq!(sink.episodes.len(), 1);
        // 3 motion + 2 grace from the first lull + 3 grace up to the close
        assert_eq!(sink.episodes[0].0, 8);
    }

    #[test]
    fn test_emitted_fps_is_scaled_by_calibration_factor() {
        let mut tracker = tracker(1, 2);
        let mut sink = RecordingSink::default();

        tracker.observe(Mat::default(), &[50.0], 7.0, &mut sink);
        tracker.observe(Mat::default(), &[], 9.0, &mut sink);
        // fps at the moment of closure is what gets attached
        tracker.observe(Mat::default(), &[], 10.0, &mut sink);

        assert_eq!(sink.episodes.len(), 1);
        assert!((sink.episodes[0].1 - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_mean_centroid_per_frame() {
        let mut tracker = tracker(1, 1);
        let mut sink = RecordingSink::default();

        tracker.observe(Mat::default(), &[10.0, 30.0, 50.0], 10.0, &mut sink);
        tracker.observe(Mat::default(), &[], 10.0, &mut sink);

        // one motion frame plus the closing grace frame carrying it forward
        assert_eq!(sink.episodes[0].2, vec![30.0, 30.0]);
    }

    #[test]
    fn test_handoff_failure_still_resets_cleanly() {
        let mut tracker = tracker(1, 1);
        let mut failing = FailingSink;

        motion_frame(&mut tracker, &mut failing, 42.0);
        let outcome = silent_frame(&mut tracker, &mut failing);
        // episode counted as closed despite the sink error
        assert_eq!(outcome, FrameOutcome::Closed { emitted: true });
        assert!(!tracker.is_active());
        assert!(!tracker.motion_detected());

        // next episode starts from scratch and carries no stale frames
        let mut sink = RecordingSink::default();
        motion_frame(&mut tracker, &mut sink, 5.0);
        silent_frame(&mut tracker, &mut sink);
        assert_eq!(sink.episodes.len(), 1);
        assert_eq!(sink.episodes[0].0, 2);
        assert_eq!(sink.episodes[0].2, vec![5.0, 5.0]);
    }

    #[test]
    fn test_discard_drops_buffer_without_emitting() {
        let mut tracker = tracker(2, 20);
        let mut sink = RecordingSink::default();

        for _ in 0..4 {
            motion_frame(&mut tracker, &mut sink, 60.0);
        }
        assert!(tracker.is_active());
        tracker.discard();
        assert!(!tracker.is_active());
        assert!(!tracker.motion_detected());
        assert!(sink.episodes.is_empty());

        // discarded frames must not leak into the next emission
        motion_frame(&mut tracker, &mut sink, 1.0);
        motion_frame(&mut tracker, &mut sink, 2.0);
        for _ in 0..20 {
            silent_frame(&mut tracker, &mut sink);
        }
        assert_eq!(sink.episodes.len(), 1);
        assert_eq!(sink.episodes[0].0, 2 + 20);
    }

    #[test]
    fn test_grace_guard_with_empty_centroid_history() {
        // silent frames can only follow motion frames, which always leave a
        // centroid behind; the carry-forward guard still has to hold if that
        // assumption is ever broken
        let mut tracker = tracker(5, 10);
        let mut sink = RecordingSink::default();
        tracker.moving_frames = 1; // episode "active" with empty buffers

        let outcome = silent_frame(&mut tracker, &mut sink);
        assert_eq!(outcome, FrameOutcome::Accumulating);
        assert!(tracker.centroids.is_empty());
        assert!(tracker.frames.is_empty());
    }
}
