//! Frame transport between the camera client and the server.
//!
//! One thread of control per network direction: the sender loop runs on the
//! capture side, the receiver on its own server-side thread. The two meet the
//! consumer through [`FrameQueue`], the only structure shared between the
//! receiver thread and the classification loop.

mod queue;
mod receiver;
mod sender;

pub use crate::wire::TransportError;
pub use queue::FrameQueue;
pub use receiver::{FrameReceiver, ReceiverHandle};
pub use sender::{FrameSender, SenderHandle};
