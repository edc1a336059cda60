//! Server-side frame receiver.
//!
//! Runs on its own thread: reads framed records off the socket, decodes the
//! JPEG payload, and appends the frame to the shared queue. The push is
//! best-effort; the network read is never blocked on a slow consumer.
//!
//! On end of stream, decode failure, or disconnection the loop stops, the
//! queue is closed so the consumer drains and exits, and the outcome is
//! surfaced through the join handle. There is no automatic reconnect.

use std::net::TcpStream;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::frame;
use crate::session::CancelToken;
use crate::transport::FrameQueue;
use crate::wire::{self, TransportError};

pub struct FrameReceiver;

pub struct ReceiverHandle {
    cancel: CancelToken,
    join: Option<JoinHandle<Result<(), TransportError>>>,
}

impl FrameReceiver {
    /// Spawn the receive loop on its own thread.
    ///
    /// The socket read timeout bounds shutdown latency: `stop()` cannot
    /// interrupt a blocking read, so the loop notices cancellation at the
    /// latest one `read_timeout` after the request.
    pub fn spawn(
        stream: TcpStream,
        queue: Arc<FrameQueue>,
        cancel: CancelToken,
        read_timeout: Duration,
    ) -> Result<ReceiverHandle> {
        stream
            .set_read_timeout(Some(read_timeout))
            .context("set image socket read timeout")?;
        let cancel_thread = cancel.clone();
        let join = std::thread::Builder::new()
            .name("frame-receiver".into())
            .spawn(move || {
                let result = run_receiver(stream, &queue, &cancel_thread);
                // Always close so the consumer drains the remainder and stops.
                queue.close();
                match &result {
                    Ok(()) => log::info!("image stream ended"),
                    Err(err) if !cancel_thread.is_cancelled() => {
                        log::warn!("frame receiver stopped: {err}");
                    }
                    Err(_) => {}
                }
                result
            })
            .context("spawn frame receiver thread")?;
        Ok(ReceiverHandle {
            cancel,
            join: Some(join),
        })
    }
}

impl ReceiverHandle {
    /// Request a cooperative stop. Checked once per loop iteration; pending
    /// blocking I/O finishes (or times out) first.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Wait for the receive loop to finish and surface its outcome.
    pub fn join(mut self) -> Result<()> {
        match self.join.take() {
            Some(join) => {
                let result = join
                    .join()
                    .map_err(|_| anyhow!("frame receiver thread panicked"))?;
                Ok(result?)
            }
            None => Ok(()),
        }
    }
}

fn run_receiver(
    mut stream: TcpStream,
    queue: &FrameQueue,
    cancel: &CancelToken,
) -> Result<(), TransportError> {
    loop {
        if cancel.is_cancelled() {
            return Ok(());
        }
        let payload = match wire::read_record(&mut stream) {
            Ok(Some(payload)) => payload,
            // Peer closed (cleanly or mid-record): normal session end.
            Ok(None) => return Ok(()),
            Err(err) if err.is_timeout() => {
                if cancel.is_cancelled() {
                    return Ok(());
                }
                // No stop was requested, so the stream has genuinely stalled
                // past the timeout; a camera feed should never be this quiet.
                return Err(err);
            }
            Err(err) => return Err(err),
        };
        let frame = frame::decode_jpeg(&payload)?;
        queue.push(frame);
    }
}
