//! Sender-to-receiver tests over real loopback sockets.

use std::io::Write;
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use liftwatch::frame::Frame;
use liftwatch::session::CancelToken;
use liftwatch::source::FrameSource;
use liftwatch::transport::{FrameQueue, FrameReceiver, FrameSender};
use liftwatch::wire;

const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// JPEG is lossy; uniform frames survive within a few intensity levels.
const SHADE_TOLERANCE: i32 = 8;

fn tcp_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
    let addr = listener.local_addr().expect("local addr");
    let client = TcpStream::connect(addr).expect("connect loopback");
    let (server, _) = listener.accept().expect("accept loopback");
    (client, server)
}

/// Yields one uniformly shaded frame per entry, then cancels its own sender.
struct ShadeSource {
    shades: Vec<u8>,
    next: usize,
    cancel: CancelToken,
}

impl ShadeSource {
    fn new(shades: Vec<u8>, cancel: CancelToken) -> Self {
        Self {
            shades,
            next: 0,
            cancel,
        }
    }
}

impl FrameSource for ShadeSource {
    fn next_frame(&mut self) -> Result<Frame> {
        let shade = self.shades[self.next];
        if self.next + 1 == self.shades.len() {
            // Last frame: the send loop writes it, then sees the cancel and
            // finishes with a clean end-of-stream marker.
            self.cancel.cancel();
        } else {
            self.next += 1;
        }
        let mut frame = Frame::blank(16, 16);
        frame.data_mut().fill(shade);
        Ok(frame)
    }
}

#[test]
fn frames_arrive_in_order_across_sockets() {
    let shades = vec![10u8, 60, 110, 160, 210];
    let (client, server) = tcp_pair();

    let sender_cancel = CancelToken::new();
    let source = ShadeSource::new(shades.clone(), sender_cancel.clone());
    let sender =
        FrameSender::spawn(client, Box::new(source), sender_cancel).expect("spawn sender");

    let receiver_cancel = CancelToken::new();
    let queue = Arc::new(FrameQueue::with_capacity(16));
    let receiver = FrameReceiver::spawn(server, queue.clone(), receiver_cancel.clone(), READ_TIMEOUT)
        .expect("spawn receiver");

    let mut seen = Vec::new();
    while let Some(frame) = queue.pop(&receiver_cancel) {
        seen.push(frame.data()[0]);
    }

    sender.join().expect("sender finished cleanly");
    receiver.join().expect("receiver finished cleanly");

    assert_eq!(seen.len(), shades.len());
    for (received, expected) in seen.iter().zip(&shades) {
        assert!(
            (*received as i32 - *expected as i32).abs() <= SHADE_TOLERANCE,
            "received shade {received} too far from sent {expected}"
        );
    }
}

#[test]
fn peer_closing_mid_payload_ends_receiver_cleanly() {
    let (mut client, server) = tcp_pair();

    let cancel = CancelToken::new();
    let queue = Arc::new(FrameQueue::with_capacity(4));
    let receiver = FrameReceiver::spawn(server, queue.clone(), cancel.clone(), READ_TIMEOUT)
        .expect("spawn receiver");

    // A length prefix promising 1000 bytes, then only 10 of them.
    client.write_all(&1000u32.to_be_bytes()).unwrap();
    client.write_all(&[0u8; 10]).unwrap();
    drop(client);

    assert!(queue.pop(&cancel).is_none());
    receiver.join().expect("mid-payload close is a clean end");
}

#[test]
fn end_of_stream_marker_closes_queue_after_draining() {
    let (mut client, server) = tcp_pair();

    let cancel = CancelToken::new();
    let queue = Arc::new(FrameQueue::with_capacity(4));
    let receiver = FrameReceiver::spawn(server, queue.clone(), cancel.clone(), READ_TIMEOUT)
        .expect("spawn receiver");

    let mut frame = Frame::blank(16, 16);
    frame.data_mut().fill(120);
    let payload = liftwatch::frame::encode_jpeg(&frame).expect("encode");
    wire::write_record(&mut client, &payload).expect("write record");
    wire::write_end_of_stream(&mut client).expect("write end of stream");

    let received = queue.pop(&cancel).expect("one frame before end of stream");
    assert_eq!(received.width(), 16);
    assert_eq!(received.height(), 16);
    assert!(queue.pop(&cancel).is_none());
    receiver.join().expect("receiver finished cleanly");
}
