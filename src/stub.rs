//! Stub collaborators.
//!
//! Synthetic stand-ins for the camera and the three inference capabilities,
//! so the binaries run end to end without model files and the tests can
//! script exact per-frame results.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::config::CameraSettings;
use crate::frame::Frame;
use crate::pipeline::{Detection, PersonDetector, PoseClassifier, PoseEstimator, Skeleton};
use crate::source::FrameSource;

/// 17 keypoints x (x, y, score), the usual single-pose layout.
const SKELETON_VALUES: usize = 17 * 3;

/// Synthetic frame source: a moving gradient, paced to the target fps.
///
/// The first bytes of each frame carry a monotonically increasing tag so
/// ordering is observable downstream.
pub struct StubSource {
    width: u32,
    height: u32,
    frame_interval: Duration,
    last_frame_at: Option<Instant>,
    counter: u64,
}

impl StubSource {
    pub fn new(settings: &CameraSettings) -> Self {
        let frame_interval = if settings.target_fps == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis((1000 / settings.target_fps).max(1) as u64)
        };
        Self {
            width: settings.width,
            height: settings.height,
            frame_interval,
            last_frame_at: None,
            counter: 0,
        }
    }
}

impl FrameSource for StubSource {
    fn next_frame(&mut self) -> Result<Frame> {
        if let Some(last) = self.last_frame_at {
            let elapsed = last.elapsed();
            if elapsed < self.frame_interval {
                std::thread::sleep(self.frame_interval - elapsed);
            }
        }
        self.last_frame_at = Some(Instant::now());

        let mut frame = Frame::blank(self.width, self.height);
        let shade = (self.counter % 256) as u8;
        for (i, byte) in frame.data_mut().iter_mut().enumerate() {
            *byte = shade.wrapping_add((i % 7) as u8);
        }
        frame.data_mut()[..8].copy_from_slice(&self.counter.to_be_bytes());
        self.counter += 1;
        Ok(frame)
    }
}

enum DetectorMode {
    Absent,
    Centered,
    Scripted(VecDeque<Vec<Detection>>),
}

/// Scriptable person detector.
pub struct StubDetector {
    mode: DetectorMode,
}

impl StubDetector {
    /// Never detects anyone.
    pub fn absent() -> Self {
        Self {
            mode: DetectorMode::Absent,
        }
    }

    /// Always reports one centered subject covering half the frame.
    pub fn always_centered() -> Self {
        Self {
            mode: DetectorMode::Centered,
        }
    }

    /// Plays back the given per-frame detection lists, then reports nobody.
    pub fn scripted(script: Vec<Vec<Detection>>) -> Self {
        Self {
            mode: DetectorMode::Scripted(script.into()),
        }
    }
}

impl PersonDetector for StubDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        match &mut self.mode {
            DetectorMode::Absent => Ok(Vec::new()),
            DetectorMode::Centered => Ok(vec![Detection::from_normalized(
                0.25,
                0.25,
                0.75,
                0.75,
                0.9,
                1,
                frame.width(),
                frame.height(),
            )]),
            DetectorMode::Scripted(script) => Ok(script.pop_front().unwrap_or_default()),
        }
    }
}

/// Pose estimator producing a fixed-size zero skeleton.
#[derive(Default)]
pub struct StubEstimator;

impl StubEstimator {
    pub fn new() -> Self {
        Self
    }
}

impl PoseEstimator for StubEstimator {
    fn estimate(&mut self, _roi: &Frame) -> Result<Skeleton> {
        Ok(Skeleton::new(vec![0.0; SKELETON_VALUES]))
    }
}

enum ClassifierMode {
    Constant(usize, f32),
    Scripted(VecDeque<(usize, f32)>, (usize, f32)),
}

/// Scriptable pose classifier.
pub struct StubClassifier {
    mode: ClassifierMode,
}

impl StubClassifier {
    /// Always returns the same `(index, confidence)`.
    pub fn constant(index: usize, confidence: f32) -> Self {
        Self {
            mode: ClassifierMode::Constant(index, confidence),
        }
    }

    /// Plays back the given results, then repeats the last one.
    pub fn scripted(script: Vec<(usize, f32)>) -> Self {
        let last = script.last().copied().unwrap_or((2, 0.0));
        Self {
            mode: ClassifierMode::Scripted(script.into(), last),
        }
    }
}

impl PoseClassifier for StubClassifier {
    fn classify(&mut self, _skeleton: &Skeleton) -> Result<(usize, f32)> {
        match &mut self.mode {
            ClassifierMode::Constant(index, confidence) => Ok((*index, *confidence)),
            ClassifierMode::Scripted(script, last) => Ok(script.pop_front().unwrap_or(*last)),
        }
    }
}
