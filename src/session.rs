//! Session context and server-side wiring.
//!
//! A [`Session`] owns one monitored client: the frame receiver thread, the
//! message receive thread, the classification + state machine consumer loop,
//! and the outbound command sender. Cancellation is explicit: a single
//! [`CancelToken`] is passed to every component at construction, replacing
//! any notion of a process-global running flag.

use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::{Context, Result};

use crate::config::MonitorConfig;
use crate::control::{CommandReceiver, CommandSender, CMD_BUZZER_OFF, CMD_BUZZER_ON, CMD_EXIT};
use crate::monitor::{AlertSink, MotionMonitor};
use crate::pipeline::PosePipeline;
use crate::transport::{FrameQueue, FrameReceiver};

/// Cooperative cancellation handle shared by a session's threads.
///
/// Checked once per loop iteration everywhere; a cancel does not interrupt
/// blocking I/O already in progress (socket read timeouts bound that latency).
///
/// Tokens form a one-way hierarchy through [`CancelToken::child`]: cancelling
/// a parent cancels every child, while cancelling a child leaves the parent
/// untouched. The daemon owns the root token; each session runs on a child,
/// so ordinary session teardown cannot stop the accept loop.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    parent: Option<Box<CancelToken>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive a token that also observes this one.
    pub fn child(&self) -> Self {
        Self {
            flag: Arc::default(),
            parent: Some(Box::new(self.clone())),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || self.parent.as_ref().map_or(false, |parent| parent.is_cancelled())
    }
}

/// Bridges state machine alerts onto the message channel.
struct CommandAlertSink {
    sender: Arc<Mutex<CommandSender>>,
}

impl AlertSink for CommandAlertSink {
    fn alert_started(&mut self) {
        log::warn!("pull motion sustained past threshold, raising alert");
        let mut sender = self.sender.lock().expect("command sender poisoned");
        if let Err(err) = sender.send(CMD_BUZZER_ON) {
            log::warn!("failed to send buzzer-on command: {err:#}");
        }
    }

    fn alert_stopped(&mut self) {
        log::info!("subject left, clearing alert");
        let mut sender = self.sender.lock().expect("command sender poisoned");
        if let Err(err) = sender.send(CMD_BUZZER_OFF) {
            log::warn!("failed to send buzzer-off command: {err:#}");
        }
    }
}

/// One monitored client connection pair.
pub struct Session {
    config: MonitorConfig,
    cancel: CancelToken,
}

impl Session {
    pub fn new(config: MonitorConfig, cancel: CancelToken) -> Self {
        Self { config, cancel }
    }

    /// Run the session to completion.
    ///
    /// Returns when the client disconnects, the transport fails, or the
    /// cancellation token fires. Frames are consumed in strict arrival order;
    /// `InferenceState` is touched only by this thread.
    ///
    /// The session's own threads run on a child of the injected token, so
    /// stopping them at teardown never cancels the owner's token.
    pub fn run(
        &self,
        image_stream: TcpStream,
        message_stream: TcpStream,
        mut pipeline: PosePipeline,
    ) -> Result<()> {
        let session_cancel = self.cancel.child();
        let queue = Arc::new(FrameQueue::with_capacity(
            self.config.transport.queue_capacity,
        ));
        let receiver = FrameReceiver::spawn(
            image_stream,
            queue.clone(),
            session_cancel.clone(),
            self.config.transport.read_timeout,
        )?;

        message_stream
            .set_read_timeout(Some(self.config.transport.read_timeout))
            .context("set message socket read timeout")?;
        let message_receiver = CommandReceiver::new(
            message_stream
                .try_clone()
                .context("clone message socket for receive direction")?,
        )
        .spawn(session_cancel.clone())?;

        let sender = Arc::new(Mutex::new(CommandSender::new(message_stream)));
        let mut monitor = MotionMonitor::new(
            self.config.inference.clone(),
            CommandAlertSink {
                sender: sender.clone(),
            },
        );

        let ignore = self.config.inference.initial_frame_ignore as u64;
        let mut frames_seen: u64 = 0;
        while let Some(frame) = queue.pop(&session_cancel) {
            frames_seen += 1;
            match pipeline.process(&frame) {
                Ok(observation) => {
                    monitor.update(observation, Instant::now());
                    if frames_seen > ignore {
                        log::trace!(
                            "frame {}: {:?} selected={:?} warning={}",
                            frames_seen,
                            observation,
                            monitor.state().selected(),
                            monitor.state().warning_active(),
                        );
                    }
                }
                // A bad frame must not kill a long-running monitoring session.
                Err(err) => log::warn!("frame {frames_seen} skipped: {err:#}"),
            }
        }
        log::info!(
            "session consumer finished after {} frames ({} dropped by queue)",
            frames_seen,
            queue.dropped()
        );

        // Server-initiated shutdown: ask the client to exit, best effort.
        if self.cancel.is_cancelled() {
            let _ = sender
                .lock()
                .expect("command sender poisoned")
                .send(CMD_EXIT);
        }

        receiver.stop();
        if let Err(err) = receiver.join() {
            log::warn!("image transport ended with failure: {err:#}");
        }
        message_receiver.stop();
        message_receiver.join()?;
        Ok(())
    }
}
