//! Capture-side frame sender.
//!
//! Acquires frames from a [`FrameSource`], JPEG-encodes them, and writes
//! framed records to the server. Acquisition failure stops the loop and is
//! surfaced to the owner through the join handle; there is no indefinite
//! retry.

use std::io::Write;
use std::net::TcpStream;
use std::thread::JoinHandle;

use anyhow::{anyhow, Context, Result};

use crate::frame;
use crate::session::CancelToken;
use crate::source::FrameSource;
use crate::wire;

pub struct FrameSender;

pub struct SenderHandle {
    cancel: CancelToken,
    join: Option<JoinHandle<Result<()>>>,
}

impl FrameSender {
    /// Spawn the send loop on its own thread.
    ///
    /// `cancel` is cooperative: it is checked once per loop iteration, so an
    /// in-flight write is never interrupted.
    pub fn spawn(
        stream: TcpStream,
        source: Box<dyn FrameSource>,
        cancel: CancelToken,
    ) -> Result<SenderHandle> {
        let cancel_thread = cancel.clone();
        let join = std::thread::Builder::new()
            .name("frame-sender".into())
            .spawn(move || {
                let result = run_sender(stream, source, &cancel_thread);
                if let Err(err) = &result {
                    if !cancel_thread.is_cancelled() {
                        log::warn!("frame sender stopped: {err:#}");
                    }
                }
                result
            })
            .context("spawn frame sender thread")?;
        Ok(SenderHandle {
            cancel,
            join: Some(join),
        })
    }
}

impl SenderHandle {
    /// Request a cooperative stop. The next loop check exits.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Whether the send loop has exited.
    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the send loop to finish and surface its outcome.
    pub fn join(mut self) -> Result<()> {
        match self.join.take() {
            Some(join) => join
                .join()
                .map_err(|_| anyhow!("frame sender thread panicked"))?,
            None => Ok(()),
        }
    }
}

fn run_sender(
    mut stream: TcpStream,
    mut source: Box<dyn FrameSource>,
    cancel: &CancelToken,
) -> Result<()> {
    while !cancel.is_cancelled() {
        let frame = source.next_frame().context("acquire frame from source")?;
        let payload = frame::encode_jpeg(&frame).context("encode frame to jpeg")?;
        wire::write_record(&mut stream, &payload).context("write frame record")?;
    }
    // Tell the receiver this is a clean end rather than a dropped connection.
    let _ = wire::write_end_of_stream(&mut stream);
    let _ = stream.flush();
    Ok(())
}
