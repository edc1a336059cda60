//! Control-message channel.
//!
//! A lightweight text channel, independent of the image channel, carrying
//! named commands between the inference side and the actuation side. Messages
//! are raw UTF-8 with no framing; the receiver reads up to a buffer size per
//! call and treats an empty read as disconnection. Connection loss ends the
//! receiver loop; there is no retry.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::thread::JoinHandle;

use anyhow::{anyhow, Context, Result};

use crate::session::CancelToken;

/// Commands the server sends to a client.
pub const CMD_BUZZER_ON: &str = "buzzer on";
pub const CMD_BUZZER_OFF: &str = "buzzer off";
pub const CMD_EXIT: &str = "exit";

const READ_BUFFER_BYTES: usize = 1024;

type CommandCallback = Box<dyn FnMut() + Send>;

/// Sends text commands over the message socket.
///
/// `send` is an atomic best-effort write; the socket's own write atomicity is
/// the only lock this direction needs.
pub struct CommandSender {
    stream: TcpStream,
}

impl CommandSender {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    pub fn send(&mut self, message: &str) -> Result<()> {
        self.stream
            .write_all(message.as_bytes())
            .with_context(|| format!("send command {message:?}"))?;
        self.stream.flush().context("flush message socket")?;
        Ok(())
    }
}

/// Receives text commands on its own thread and dispatches them to named
/// callbacks.
///
/// Callbacks are registered before `spawn`; there is no late mutation of the
/// dispatch table. Text that matches no registered name goes to a default
/// callback that logs it.
pub struct CommandReceiver {
    stream: TcpStream,
    callbacks: HashMap<String, CommandCallback>,
}

pub struct CommandReceiverHandle {
    cancel: CancelToken,
    join: Option<JoinHandle<()>>,
}

impl CommandReceiver {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            callbacks: HashMap::new(),
        }
    }

    /// Register a callback for an exact command string.
    pub fn on_command(mut self, name: &str, callback: impl FnMut() + Send + 'static) -> Self {
        self.callbacks.insert(name.to_string(), Box::new(callback));
        self
    }

    /// Spawn the receive loop. It ends on disconnection, read failure, or
    /// cancellation.
    pub fn spawn(self, cancel: CancelToken) -> Result<CommandReceiverHandle> {
        let cancel_thread = cancel.clone();
        let join = std::thread::Builder::new()
            .name("command-receiver".into())
            .spawn(move || run_receiver(self.stream, self.callbacks, &cancel_thread))
            .context("spawn command receiver thread")?;
        Ok(CommandReceiverHandle {
            cancel,
            join: Some(join),
        })
    }
}

impl CommandReceiverHandle {
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn join(mut self) -> Result<()> {
        match self.join.take() {
            Some(join) => join
                .join()
                .map_err(|_| anyhow!("command receiver thread panicked")),
            None => Ok(()),
        }
    }
}

fn run_receiver(
    mut stream: TcpStream,
    mut callbacks: HashMap<String, CommandCallback>,
    cancel: &CancelToken,
) {
    let mut buffer = [0u8; READ_BUFFER_BYTES];
    while !cancel.is_cancelled() {
        let read = match stream.read(&mut buffer) {
            // Empty read: the peer closed the connection.
            Ok(0) => break,
            Ok(n) => n,
            // A quiet channel is normal; the timeout only exists so the
            // loop can notice cancellation.
            Err(err)
                if matches!(
                    err.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                continue;
            }
            Err(err) => {
                if !cancel.is_cancelled() {
                    log::warn!("message channel read failed: {err}");
                }
                break;
            }
        };
        let text = String::from_utf8_lossy(&buffer[..read]);
        let trimmed = text.trim();
        match callbacks.get_mut(trimmed) {
            Some(callback) => {
                log::debug!("command received: {trimmed:?}");
                callback();
            }
            None => log::info!("message from peer: {trimmed}"),
        }
    }
    log::info!("message channel closed");
}
