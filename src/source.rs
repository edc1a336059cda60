//! Frame acquisition seam for the capture side.
//!
//! Real camera capture (V4L2, libcamera, ...) lives behind this trait as an
//! external collaborator; the crate ships only the synthetic
//! [`crate::stub::StubSource`] used by the demo binaries and tests.

use anyhow::Result;

use crate::frame::Frame;

/// A source of frames for the sender loop.
pub trait FrameSource: Send {
    /// Acquire the next frame.
    ///
    /// An error means acquisition has failed for good; the sender stops and
    /// surfaces it rather than retrying indefinitely.
    fn next_frame(&mut self) -> Result<Frame>;
}
