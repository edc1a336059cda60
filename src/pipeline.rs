//! Per-frame classification pipeline.
//!
//! Four stages, each behind a collaborator trait the core depends on but does
//! not implement: person localization, region-of-interest extraction, pose
//! estimation, and pose classification. The pipeline emits the raw
//! `(class, confidence)` result (or "no subject") once per frame; all
//! smoothing belongs to the temporal state machine.
//!
//! Collaborator implementations must treat their inputs as read-only and
//! side-effect free as seen from the core.

use anyhow::Result;

use crate::frame::Frame;
use crate::monitor::{MotionClass, Observation};

/// Pixels added on each side of a detection box before pose estimation.
pub const ROI_PADDING: u32 = 10;

/// One detected subject in source-image pixel coordinates.
///
/// Coordinates are clamped to `[0, width] x [0, height]`.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub score: f32,
    pub label: u32,
}

impl Detection {
    /// Scale a normalized `[0, 1]` model box into pixel coordinates, clamped
    /// to the frame bounds.
    pub fn from_normalized(
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        score: f32,
        label: u32,
        frame_width: u32,
        frame_height: u32,
    ) -> Self {
        let w = frame_width as f32;
        let h = frame_height as f32;
        Self {
            x1: (x1 * w).clamp(0.0, w),
            y1: (y1 * h).clamp(0.0, h),
            x2: (x2 * w).clamp(0.0, w),
            y2: (y2 * h).clamp(0.0, h),
            score,
            label,
        }
    }
}

/// Opaque fixed-size intermediate representation produced by pose estimation.
/// The core never inspects its content.
#[derive(Clone, Debug)]
pub struct Skeleton(Vec<f32>);

impl Skeleton {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[f32] {
        &self.0
    }
}

/// Person localization capability.
pub trait PersonDetector: Send {
    /// Zero or more boxes in pixel coordinates. One or more means "subject
    /// present"; the pipeline always uses box index 0.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;
}

/// Pose estimation capability: ROI image to skeleton representation.
pub trait PoseEstimator: Send {
    fn estimate(&mut self, roi: &Frame) -> Result<Skeleton>;
}

/// Pose classification capability: skeleton to `(class index, confidence)`.
pub trait PoseClassifier: Send {
    fn classify(&mut self, skeleton: &Skeleton) -> Result<(usize, f32)>;
}

/// Crop `frame` to `detection` expanded by `padding` pixels per side, clamped
/// to the frame bounds.
pub fn extract_roi(frame: &Frame, detection: &Detection, padding: u32) -> Frame {
    let pad = padding as f32;
    let x1 = (detection.x1 - pad).max(0.0) as u32;
    let y1 = (detection.y1 - pad).max(0.0) as u32;
    let x2 = (detection.x2 + pad).min(frame.width() as f32) as u32;
    let y2 = (detection.y2 + pad).min(frame.height() as f32) as u32;
    frame.crop(x1, y1, x2, y2)
}

/// The assembled pipeline. Single-threaded: invoked once per dequeued frame
/// by the consumer loop, never concurrently.
pub struct PosePipeline {
    detector: Box<dyn PersonDetector>,
    estimator: Box<dyn PoseEstimator>,
    classifier: Box<dyn PoseClassifier>,
    roi_padding: u32,
}

impl PosePipeline {
    pub fn new(
        detector: Box<dyn PersonDetector>,
        estimator: Box<dyn PoseEstimator>,
        classifier: Box<dyn PoseClassifier>,
    ) -> Self {
        Self {
            detector,
            estimator,
            classifier,
            roi_padding: ROI_PADDING,
        }
    }

    /// Run all stages on one frame.
    ///
    /// A collaborator failure is fatal to this frame only; the caller is
    /// expected to log it, skip the frame, and keep the session alive.
    pub fn process(&mut self, frame: &Frame) -> Result<Observation> {
        let detections = self.detector.detect(frame)?;
        let Some(primary) = detections.first() else {
            return Ok(Observation::NoSubject);
        };

        let roi = extract_roi(frame, primary, self.roi_padding);
        let skeleton = self.estimator.estimate(&roi)?;
        let (index, confidence) = self.classifier.classify(&skeleton)?;

        Ok(Observation::Subject {
            class: MotionClass::from_index(index),
            confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::{StubClassifier, StubDetector, StubEstimator};

    #[test]
    fn normalized_boxes_are_scaled_and_clamped() {
        let det = Detection::from_normalized(-0.1, 0.25, 1.2, 0.75, 0.9, 1, 640, 480);
        assert_eq!(det.x1, 0.0);
        assert_eq!(det.y1, 120.0);
        assert_eq!(det.x2, 640.0);
        assert_eq!(det.y2, 360.0);
    }

    #[test]
    fn roi_padding_clamps_at_frame_edges() {
        let frame = Frame::blank(100, 100);
        let det = Detection {
            x1: 5.0,
            y1: 5.0,
            x2: 95.0,
            y2: 95.0,
            score: 0.9,
            label: 1,
        };
        let roi = extract_roi(&frame, &det, 10);
        assert_eq!(roi.width(), 100);
        assert_eq!(roi.height(), 100);
    }

    #[test]
    fn no_detections_yields_no_subject() {
        let mut pipeline = PosePipeline::new(
            Box::new(StubDetector::absent()),
            Box::new(StubEstimator::new()),
            Box::new(StubClassifier::constant(0, 0.9)),
        );
        let frame = Frame::blank(64, 48);
        assert_eq!(
            pipeline.process(&frame).unwrap(),
            Observation::NoSubject
        );
    }

    #[test]
    fn scripted_collaborators_replay_per_frame_results() {
        let det = Detection::from_normalized(0.25, 0.25, 0.75, 0.75, 0.9, 1, 64, 48);
        let mut pipeline = PosePipeline::new(
            Box::new(StubDetector::scripted(vec![vec![det], Vec::new()])),
            Box::new(StubEstimator::new()),
            Box::new(StubClassifier::scripted(vec![(0, 0.9), (1, 0.8)])),
        );
        let frame = Frame::blank(64, 48);

        match pipeline.process(&frame).unwrap() {
            Observation::Subject { class, confidence } => {
                assert_eq!(class, MotionClass::Pull);
                assert!((confidence - 0.9).abs() < f32::EPSILON);
            }
            other => panic!("expected subject, got {other:?}"),
        }
        // Second frame is a scripted absence; after the script runs out the
        // detector keeps reporting nobody.
        assert_eq!(pipeline.process(&frame).unwrap(), Observation::NoSubject);
        assert_eq!(pipeline.process(&frame).unwrap(), Observation::NoSubject);
    }

    #[test]
    fn scripted_classifier_repeats_last_result_when_exhausted() {
        let mut pipeline = PosePipeline::new(
            Box::new(StubDetector::always_centered()),
            Box::new(StubEstimator::new()),
            Box::new(StubClassifier::scripted(vec![(0, 0.9), (1, 0.6)])),
        );
        let frame = Frame::blank(64, 48);

        let mut classes = Vec::new();
        for _ in 0..3 {
            match pipeline.process(&frame).unwrap() {
                Observation::Subject { class, .. } => classes.push(class),
                other => panic!("expected subject, got {other:?}"),
            }
        }
        assert_eq!(
            classes,
            vec![MotionClass::Pull, MotionClass::Push, MotionClass::Push]
        );
    }

    #[test]
    fn first_detection_wins_and_classification_passes_through() {
        let mut pipeline = PosePipeline::new(
            Box::new(StubDetector::always_centered()),
            Box::new(StubEstimator::new()),
            Box::new(StubClassifier::constant(0, 0.92)),
        );
        let frame = Frame::blank(64, 48);
        match pipeline.process(&frame).unwrap() {
            Observation::Subject { class, confidence } => {
                assert_eq!(class, MotionClass::Pull);
                assert!((confidence - 0.92).abs() < f32::EPSILON);
            }
            other => panic!("expected subject, got {other:?}"),
        }
    }
}
