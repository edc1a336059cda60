//! Liftwatch - gym-safety motion monitor.
//!
//! A camera client streams JPEG frames over a persistent TCP connection to a
//! central server. The server runs a person-detection -> ROI -> pose-estimation
//! -> pose-classification pipeline on each frame, smooths the noisy per-frame
//! class stream with a temporal state machine, and raises a buzzer alert back
//! to the client over a parallel text command channel when the "pull" motion
//! persists beyond a configured duration.
//!
//! # Module Structure
//!
//! - `wire`: length-prefixed binary frame records over a byte stream
//! - `frame`: owned RGB frame buffer and the JPEG codec boundary
//! - `transport`: frame sender/receiver threads and the SPSC frame queue
//! - `pipeline`: collaborator traits and the per-frame classification pipeline
//! - `monitor`: the temporal state machine producing edge-triggered alerts
//! - `control`: unframed text command channel (buzzer on/off, exit)
//! - `session`: cancellation token and server-side session wiring
//! - `config`: startup configuration (file + environment overrides)
//!
//! Model inference itself is an external collaborator: the crate consumes the
//! `PersonDetector` / `PoseEstimator` / `PoseClassifier` capabilities and never
//! inspects what is behind them.

pub mod actuator;
pub mod config;
pub mod control;
pub mod frame;
pub mod monitor;
pub mod pipeline;
pub mod session;
pub mod source;
pub mod stub;
pub mod transport;
pub mod wire;

pub use actuator::{Actuator, LogActuator};
pub use config::{CameraSettings, InferenceSettings, MonitorConfig, TransportSettings};
pub use control::{CommandReceiver, CommandSender, CMD_BUZZER_OFF, CMD_BUZZER_ON, CMD_EXIT};
pub use frame::Frame;
pub use monitor::{AlertSink, InferenceState, MotionClass, MotionMonitor, Observation};
pub use pipeline::{
    Detection, PersonDetector, PoseClassifier, PoseEstimator, PosePipeline, Skeleton,
};
pub use session::{CancelToken, Session};
pub use source::FrameSource;
pub use transport::{FrameQueue, FrameReceiver, FrameSender, TransportError};
