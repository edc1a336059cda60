//! Temporal state machine over the per-frame classification stream.
//!
//! The pipeline's raw `(class, confidence)` results are noisy. This module
//! converts them into a debounced, hysteresis-protected alert signal:
//!
//! - a warm-up window debounces transient false-positive detections
//! - a fixed-capacity history with an integer-median filter suppresses
//!   single-frame misclassification
//! - a consecutive-low-confidence counter forces the class back to unknown
//! - a persistence timer fires the alert only after the pull motion has been
//!   sustained for the configured duration
//!
//! Alerts are edge-triggered through a constructor-injected [`AlertSink`]:
//! `alert_started` fires exactly once per rising transition, `alert_stopped`
//! once when the subject disappears while a warning is active.

use std::collections::VecDeque;
use std::time::Instant;

use crate::config::InferenceSettings;

/// Consecutive low-confidence frames that force the class back to unknown.
const LOW_CONFIDENCE_LIMIT: u32 = 5;

/// Discrete motion-phase label produced by the pose classifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MotionClass {
    /// The monitored target motion.
    Pull,
    /// Any other recognized motion.
    Push,
    /// No stable classification.
    Unknown,
}

impl MotionClass {
    /// Map a raw classifier index. Indices beyond the known classes collapse
    /// to `Unknown`.
    pub fn from_index(index: usize) -> Self {
        match index {
            0 => MotionClass::Pull,
            1 => MotionClass::Push,
            _ => MotionClass::Unknown,
        }
    }

    pub fn index(self) -> usize {
        match self {
            MotionClass::Pull => 0,
            MotionClass::Push => 1,
            MotionClass::Unknown => 2,
        }
    }
}

/// One frame's worth of pipeline output, as seen by the state machine.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Observation {
    /// No subject in the frame.
    NoSubject,
    /// Subject present, with the raw classification for this frame.
    Subject { class: MotionClass, confidence: f32 },
}

/// Outbound alert events. Injected at construction; the state machine never
/// learns what is on the other side (buzzer command, test recorder, ...).
pub trait AlertSink {
    fn alert_started(&mut self);
    fn alert_stopped(&mut self);
}

/// Mutable per-session inference state, owned by the consumer thread.
#[derive(Debug)]
pub struct InferenceState {
    selected: MotionClass,
    result_history: VecDeque<u8>,
    conf_history: VecDeque<f32>,
    target_start: Option<Instant>,
    warning_active: bool,
    person_detected_frames: u32,
    low_confidence_streak: u32,
    person_detected: bool,
    history_capacity: usize,
}

impl InferenceState {
    fn new(history_capacity: usize) -> Self {
        Self {
            selected: MotionClass::Unknown,
            result_history: VecDeque::with_capacity(history_capacity),
            conf_history: VecDeque::with_capacity(history_capacity),
            target_start: None,
            warning_active: false,
            person_detected_frames: 0,
            low_confidence_streak: 0,
            person_detected: false,
            history_capacity,
        }
    }

    /// Full reset on subject loss. One empty frame clears all accumulated
    /// history; this is not a decay.
    fn reset(&mut self) {
        self.warning_active = false;
        self.person_detected_frames = 0;
        self.target_start = None;
        self.result_history.clear();
        self.conf_history.clear();
        self.selected = MotionClass::Unknown;
    }

    pub fn selected(&self) -> MotionClass {
        self.selected
    }

    pub fn warning_active(&self) -> bool {
        self.warning_active
    }

    pub fn person_detected(&self) -> bool {
        self.person_detected
    }

    pub fn person_detected_frames(&self) -> u32 {
        self.person_detected_frames
    }

    pub fn history_len(&self) -> usize {
        self.result_history.len()
    }

    pub fn result_history(&self) -> impl Iterator<Item = usize> + '_ {
        self.result_history.iter().map(|&index| index as usize)
    }
}

/// The per-session temporal state machine.
pub struct MotionMonitor<S: AlertSink> {
    settings: InferenceSettings,
    state: InferenceState,
    sink: S,
}

impl<S: AlertSink> MotionMonitor<S> {
    pub fn new(settings: InferenceSettings, sink: S) -> Self {
        let state = InferenceState::new(settings.history_length);
        Self {
            settings,
            state,
            sink,
        }
    }

    pub fn state(&self) -> &InferenceState {
        &self.state
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Fold one frame's observation into the state.
    ///
    /// The caller supplies the clock so tests can drive the persistence timer
    /// with synthetic instants.
    pub fn update(&mut self, observation: Observation, now: Instant) {
        match observation {
            Observation::NoSubject => {
                self.state.person_detected = false;
                if self.state.warning_active {
                    self.sink.alert_stopped();
                }
                self.state.reset();
            }
            Observation::Subject { class, confidence } => {
                self.state.person_detected = true;
                self.state.person_detected_frames =
                    self.state.person_detected_frames.saturating_add(1);
                // Warm-up window: classification results are ignored until the
                // detection has settled, though the counter keeps running.
                if self.state.person_detected_frames > self.settings.detection_frame_threshold {
                    self.handle_classification(class, confidence, now);
                }
            }
        }
    }

    fn handle_classification(&mut self, class: MotionClass, confidence: f32, now: Instant) {
        if confidence > self.settings.pose_threshold {
            push_bounded(
                &mut self.state.result_history,
                class.index() as u8,
                self.state.history_capacity,
            );
            push_bounded(
                &mut self.state.conf_history,
                confidence,
                self.state.history_capacity,
            );

            // The median filter only engages once the history is full, so a
            // short burst after a reset cannot flip the selected class.
            if self.state.result_history.len() == self.state.history_capacity {
                let median = integer_median(&self.state.result_history);
                self.state.selected = MotionClass::from_index(median);
            }

            if self.state.selected == MotionClass::Pull {
                self.handle_pull_state(now);
            } else {
                // Leaving the motion cancels any in-progress persistence run.
                self.state.target_start = None;
            }

            self.state.low_confidence_streak = 0;
        } else {
            self.state.low_confidence_streak += 1;
            if self.state.low_confidence_streak >= LOW_CONFIDENCE_LIMIT {
                self.state.selected = MotionClass::Unknown;
                self.state.low_confidence_streak = 0;
            }
        }
    }

    /// Persistence timing for the pull motion.
    ///
    /// When the timer fires the onset timestamp is cleared, so while the
    /// motion stays sustained the timer restarts and the alert re-fires once
    /// per `pull_state_duration` window. This mirrors the reference behavior
    /// and is kept deliberately.
    fn handle_pull_state(&mut self, now: Instant) {
        let start = *self.state.target_start.get_or_insert(now);
        if now.duration_since(start) > self.settings.pull_state_duration {
            if !self.state.warning_active {
                self.sink.alert_started();
            }
            self.state.warning_active = true;
            self.state.target_start = None;
        }
    }
}

fn push_bounded<T>(buffer: &mut VecDeque<T>, value: T, capacity: usize) {
    if buffer.len() == capacity {
        buffer.pop_front();
    }
    buffer.push_back(value);
}

/// Truncated integer median of the class indices.
///
/// For an even count this is the mean of the two middle values truncated
/// toward zero, matching the reference smoothing exactly. With three class
/// values this approximates a majority vote, though it can land on the
/// unknown class when that is the statistical median.
fn integer_median(values: &VecDeque<u8>) -> usize {
    debug_assert!(!values.is_empty());
    let mut sorted: Vec<u8> = values.iter().copied().collect();
    sorted.sort_unstable();
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2] as usize
    } else {
        (sorted[n / 2 - 1] as usize + sorted[n / 2] as usize) / 2
    }
}
