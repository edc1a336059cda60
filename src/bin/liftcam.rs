//! liftcam - camera client
//!
//! Connects to the monitoring server on both channels, streams synthetic
//! camera frames over the image channel, and reacts to buzzer commands on the
//! message channel. The actuator here is the logging stand-in; hardware
//! integrations implement [`liftwatch::Actuator`] instead.

use std::net::TcpStream;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use liftwatch::actuator::{Actuator, LogActuator};
use liftwatch::control::{CommandReceiver, CommandSender, CMD_BUZZER_OFF, CMD_BUZZER_ON, CMD_EXIT};
use liftwatch::session::CancelToken;
use liftwatch::stub::StubSource;
use liftwatch::transport::FrameSender;
use liftwatch::MonitorConfig;

const BUZZER_INTERVAL_SECS: f32 = 1.0;
const WARNING_ACK: &str = "Warning on Bench Press Zone!";
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(name = "liftcam", version, about = "Gym-safety motion monitor camera client")]
struct Args {
    /// Path to a TOML config file (overrides LIFTWATCH_CONFIG).
    #[arg(long, env = "LIFTWATCH_CONFIG")]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = MonitorConfig::load(args.config.as_deref())?;

    let cancel = CancelToken::new();
    let ctrlc_cancel = cancel.clone();
    ctrlc::set_handler(move || {
        log::info!("shutdown requested");
        ctrlc_cancel.cancel();
    })
    .context("install signal handler")?;

    let image_addr = format!("{}:{}", config.net.server_ip, config.net.image_port);
    let message_addr = format!("{}:{}", config.net.server_ip, config.net.message_port);
    let image_stream = TcpStream::connect(&image_addr)
        .with_context(|| format!("connect image channel to {image_addr}"))?;
    let message_stream = TcpStream::connect(&message_addr)
        .with_context(|| format!("connect message channel to {message_addr}"))?;
    message_stream
        .set_read_timeout(Some(config.transport.read_timeout))
        .context("set message socket read timeout")?;
    log::info!("connected to {image_addr} (images) and {message_addr} (messages)");

    let source = StubSource::new(&config.camera);
    let sender = FrameSender::spawn(image_stream, Box::new(source), cancel.clone())?;
    log::info!(
        "streaming {}x{} synthetic frames at {} fps",
        config.camera.width,
        config.camera.height,
        config.camera.target_fps
    );

    let ack_sender = Arc::new(Mutex::new(CommandSender::new(
        message_stream
            .try_clone()
            .context("clone message socket for send direction")?,
    )));
    let actuator = Arc::new(Mutex::new(LogActuator::new()));

    let on_actuator = actuator.clone();
    let on_ack = ack_sender.clone();
    let off_actuator = actuator.clone();
    let exit_cancel = cancel.clone();
    let receiver = CommandReceiver::new(message_stream)
        .on_command(CMD_BUZZER_ON, move || {
            on_actuator
                .lock()
                .expect("actuator poisoned")
                .buzzer_on(BUZZER_INTERVAL_SECS);
            if let Err(err) = on_ack
                .lock()
                .expect("ack sender poisoned")
                .send(WARNING_ACK)
            {
                log::warn!("failed to acknowledge warning: {err:#}");
            }
        })
        .on_command(CMD_BUZZER_OFF, move || {
            off_actuator
                .lock()
                .expect("actuator poisoned")
                .buzzer_off();
        })
        .on_command(CMD_EXIT, move || {
            log::info!("server requested exit");
            exit_cancel.cancel();
        })
        .spawn(cancel.clone())?;

    while !cancel.is_cancelled() && !sender.is_finished() {
        std::thread::sleep(POLL_INTERVAL);
    }
    cancel.cancel();

    sender.stop();
    if let Err(err) = sender.join() {
        log::warn!("frame stream ended with failure: {err:#}");
    }
    receiver.stop();
    receiver.join()?;

    actuator.lock().expect("actuator poisoned").buzzer_off();
    log::info!("liftcam stopped");
    Ok(())
}
