//! Full-session test: a scripted camera client streams frames into a server
//! session, which must push exactly one buzzer-on command back over the
//! message channel while the pull motion persists.

use std::io::Read;
use std::net::{TcpListener, TcpStream};
use std::time::{Duration, Instant};

use anyhow::Result;

use liftwatch::frame::Frame;
use liftwatch::pipeline::PosePipeline;
use liftwatch::session::{CancelToken, Session};
use liftwatch::source::FrameSource;
use liftwatch::stub::{StubClassifier, StubDetector, StubEstimator};
use liftwatch::transport::FrameSender;
use liftwatch::{wire, MonitorConfig, CMD_BUZZER_ON};

const FRAME_INTERVAL: Duration = Duration::from_millis(30);
const ALERT_DEADLINE: Duration = Duration::from_secs(5);

fn tcp_pair(listener: &TcpListener) -> (TcpStream, TcpStream) {
    let addr = listener.local_addr().expect("local addr");
    let client = TcpStream::connect(addr).expect("connect loopback");
    let (server, _) = listener.accept().expect("accept loopback");
    (client, server)
}

/// Paced synthetic camera that stops after a frame budget.
struct PacedSource {
    remaining: u32,
    cancel: CancelToken,
}

impl FrameSource for PacedSource {
    fn next_frame(&mut self) -> Result<Frame> {
        std::thread::sleep(FRAME_INTERVAL);
        self.remaining -= 1;
        if self.remaining == 0 {
            self.cancel.cancel();
        }
        Ok(Frame::blank(64, 48))
    }
}

fn test_config() -> MonitorConfig {
    let mut config = MonitorConfig::default();
    config.inference.pose_threshold = 0.5;
    config.inference.pull_state_duration = Duration::from_millis(300);
    config.inference.detection_frame_threshold = 2;
    config.inference.initial_frame_ignore = 0;
    config.inference.history_length = 4;
    config.transport.read_timeout = Duration::from_millis(200);
    config.transport.queue_capacity = 16;
    config
}

#[test]
fn sustained_pull_motion_raises_one_buzzer_command() {
    let image_listener = TcpListener::bind("127.0.0.1:0").expect("bind image");
    let message_listener = TcpListener::bind("127.0.0.1:0").expect("bind message");
    let (image_client, image_server) = tcp_pair(&image_listener);
    let (mut message_client, message_server) = tcp_pair(&message_listener);

    let session_cancel = CancelToken::new();
    let config = test_config();
    let server = std::thread::spawn({
        let cancel = session_cancel.clone();
        move || {
            let pipeline = PosePipeline::new(
                Box::new(StubDetector::always_centered()),
                Box::new(StubEstimator::new()),
                Box::new(StubClassifier::constant(0, 0.9)),
            );
            Session::new(config, cancel).run(image_server, message_server, pipeline)
        }
    });

    // Roughly four seconds of footage against a 300ms persistence window.
    let client_cancel = CancelToken::new();
    let source = PacedSource {
        remaining: 130,
        cancel: client_cancel.clone(),
    };
    let sender =
        FrameSender::spawn(image_client, Box::new(source), client_cancel).expect("spawn sender");

    message_client
        .set_read_timeout(Some(Duration::from_millis(200)))
        .expect("set read timeout");
    let mut received = String::new();
    let mut buffer = [0u8; 256];
    let deadline = Instant::now() + ALERT_DEADLINE;
    while Instant::now() < deadline {
        match message_client.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => received.push_str(&String::from_utf8_lossy(&buffer[..n])),
            Err(err)
                if matches!(
                    err.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) => {}
            Err(err) => panic!("message channel read failed: {err}"),
        }
    }

    sender.join().expect("sender finished cleanly");
    drop(message_client);
    server
        .join()
        .expect("session thread completed")
        .expect("session ran cleanly");

    // The alert is edge triggered: one command for the whole sustained motion,
    // not one per elapsed persistence window.
    assert_eq!(
        received.matches(CMD_BUZZER_ON).count(),
        1,
        "expected exactly one buzzer-on command, got channel text {received:?}"
    );
}

#[test]
fn session_teardown_leaves_daemon_token_uncancelled() {
    let image_listener = TcpListener::bind("127.0.0.1:0").expect("bind image");
    let message_listener = TcpListener::bind("127.0.0.1:0").expect("bind message");
    let (mut image_client, image_server) = tcp_pair(&image_listener);
    let (message_client, message_server) = tcp_pair(&message_listener);

    let daemon_cancel = CancelToken::new();
    let config = test_config();
    let server = std::thread::spawn({
        let cancel = daemon_cancel.clone();
        move || {
            let pipeline = PosePipeline::new(
                Box::new(StubDetector::absent()),
                Box::new(StubEstimator::new()),
                Box::new(StubClassifier::constant(0, 0.9)),
            );
            Session::new(config, cancel).run(image_server, message_server, pipeline)
        }
    });

    // Client ends the stream cleanly and goes away.
    wire::write_end_of_stream(&mut image_client).expect("write end of stream");
    drop(image_client);
    drop(message_client);

    server
        .join()
        .expect("session thread completed")
        .expect("session ran cleanly");

    // The daemon must be able to accept the next client after an ordinary
    // session end.
    assert!(!daemon_cancel.is_cancelled());
}
