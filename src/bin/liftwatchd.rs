//! liftwatchd - monitoring server daemon
//!
//! Listens for a camera client on two TCP ports (image stream + message
//! channel), runs the classification pipeline and temporal state machine on
//! every received frame, and pushes buzzer commands back over the message
//! channel. Serves one client at a time; when a session ends it goes back to
//! accepting.

use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use liftwatch::pipeline::PosePipeline;
use liftwatch::session::{CancelToken, Session};
use liftwatch::stub::{StubClassifier, StubDetector, StubEstimator};
use liftwatch::MonitorConfig;

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Parser, Debug)]
#[command(name = "liftwatchd", version, about = "Gym-safety motion monitor server")]
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

    let image_addr = format!("{}:{}", config.net.bind_ip, config.net.image_port);
    let message_addr = format!("{}:{}", config.net.bind_ip, config.net.message_port);
    let image_listener = TcpListener::bind(&image_addr)
        .with_context(|| format!("bind image listener on {image_addr}"))?;
    let message_listener = TcpListener::bind(&message_addr)
        .with_context(|| format!("bind message listener on {message_addr}"))?;
    image_listener
        .set_nonblocking(true)
        .context("set image listener non-blocking")?;
    message_listener
        .set_nonblocking(true)
        .context("set message listener non-blocking")?;

    log::info!("liftwatchd {} running", env!("CARGO_PKG_VERSION"));
    log::info!("image channel listening on {image_addr}");
    log::info!("message channel listening on {message_addr}");
    log::info!(
        "pose_threshold={} pull_state_duration={:?} history_length={}",
        config.inference.pose_threshold,
        config.inference.pull_state_duration,
        config.inference.history_length
    );

    while !cancel.is_cancelled() {
        let Some(image_stream) = accept_with_cancel(&image_listener, &cancel)? else {
            break;
        };
        log::info!(
            "image channel connected from {}",
            peer_label(&image_stream)
        );
        let Some(message_stream) = accept_with_cancel(&message_listener, &cancel)? else {
            break;
        };
        log::info!(
            "message channel connected from {}",
            peer_label(&message_stream)
        );

        let pipeline = PosePipeline::new(
            Box::new(StubDetector::always_centered()),
            Box::new(StubEstimator::new()),
            Box::new(StubClassifier::constant(0, 0.9)),
        );
        let session = Session::new(config.clone(), cancel.clone());
        match session.run(image_stream, message_stream, pipeline) {
            Ok(()) => log::info!("session ended"),
            Err(err) => log::warn!("session ended with failure: {err:#}"),
        }
    }

    log::info!("liftwatchd stopped");
    Ok(())
}

/// Accept on a non-blocking listener, polling the cancellation token.
/// Returns `None` once cancelled.
fn accept_with_cancel(listener: &TcpListener, cancel: &CancelToken) -> Result<Option<TcpStream>> {
    loop {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        match listener.accept() {
            Ok((stream, _)) => {
                stream
                    .set_nonblocking(false)
                    .context("restore blocking mode on accepted socket")?;
                return Ok(Some(stream));
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(err) => return Err(err).context("accept client connection"),
        }
    }
}

fn peer_label(stream: &TcpStream) -> String {
    stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "unknown peer".into())
}
