//! Single-producer/single-consumer frame queue.
//!
//! The receiver thread pushes decoded frames; the classification loop pops
//! them in strict arrival order. Pushes never block: when the queue is full
//! the oldest frame is dropped, since losing a stale frame is preferable to
//! stalling the network read. Pops block on a condition variable with the
//! session's cancellation token merged in, so the consumer neither spins nor
//! outlives a stop request.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::frame::Frame;
use crate::session::CancelToken;

/// How often a blocked pop re-checks the cancellation token.
const POP_WAKE_INTERVAL: Duration = Duration::from_millis(100);

struct QueueState {
    frames: VecDeque<Frame>,
    closed: bool,
    dropped: u64,
}

pub struct FrameQueue {
    state: Mutex<QueueState>,
    available: Condvar,
    capacity: usize,
}

impl FrameQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                frames: VecDeque::with_capacity(capacity.max(1)),
                closed: false,
                dropped: 0,
            }),
            available: Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    /// Best-effort append. Never blocks; evicts the oldest frame on overflow.
    pub fn push(&self, frame: Frame) {
        let mut state = self.state.lock().expect("frame queue poisoned");
        if state.closed {
            return;
        }
        if state.frames.len() == self.capacity {
            state.frames.pop_front();
            state.dropped += 1;
            if state.dropped.is_power_of_two() {
                log::debug!("frame queue full, {} frames dropped so far", state.dropped);
            }
        }
        state.frames.push_back(frame);
        drop(state);
        self.available.notify_one();
    }

    /// Blocking pop in strict FIFO order.
    ///
    /// Returns `None` once the queue is closed and drained, or when the
    /// cancellation token fires. A cancelled pop abandons any frames still
    /// queued.
    pub fn pop(&self, cancel: &CancelToken) -> Option<Frame> {
        let mut state = self.state.lock().expect("frame queue poisoned");
        loop {
            if cancel.is_cancelled() {
                return None;
            }
            if let Some(frame) = state.frames.pop_front() {
                return Some(frame);
            }
            if state.closed {
                return None;
            }
            let (next, _timeout) = self
                .available
                .wait_timeout(state, POP_WAKE_INTERVAL)
                .expect("frame queue poisoned");
            state = next;
        }
    }

    /// Mark the producer side finished and wake the consumer so it can drain
    /// the remainder and stop.
    pub fn close(&self) {
        let mut state = self.state.lock().expect("frame queue poisoned");
        state.closed = true;
        drop(state);
        self.available.notify_all();
    }

    pub fn len(&self) -> usize {
        self.state.lock().expect("frame queue poisoned").frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Frames evicted by overflow since creation.
    pub fn dropped(&self) -> u64 {
        self.state.lock().expect("frame queue poisoned").dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tagged(tag: u8) -> Frame {
        let mut frame = Frame::blank(2, 2);
        frame.data_mut()[0] = tag;
        frame
    }

    #[test]
    fn pops_in_push_order() {
        let queue = FrameQueue::with_capacity(8);
        let cancel = CancelToken::new();
        for tag in 0..5 {
            queue.push(tagged(tag));
        }
        queue.close();
        let mut seen = Vec::new();
        while let Some(frame) = queue.pop(&cancel) {
            seen.push(frame.data()[0]);
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn overflow_drops_oldest_first() {
        let queue = FrameQueue::with_capacity(3);
        let cancel = CancelToken::new();
        for tag in 0..5 {
            queue.push(tagged(tag));
        }
        queue.close();
        let mut seen = Vec::new();
        while let Some(frame) = queue.pop(&cancel) {
            seen.push(frame.data()[0]);
        }
        assert_eq!(seen, vec![2, 3, 4]);
        assert_eq!(queue.dropped(), 2);
    }

    #[test]
    fn cancelled_pop_returns_none() {
        let queue = FrameQueue::with_capacity(4);
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(queue.pop(&cancel).is_none());
    }

    #[test]
    fn close_wakes_blocked_consumer() {
        use std::sync::Arc;

        let queue = Arc::new(FrameQueue::with_capacity(4));
        let consumer_queue = queue.clone();
        let consumer = std::thread::spawn(move || {
            let cancel = CancelToken::new();
            consumer_queue.pop(&cancel)
        });
        // Give the consumer a moment to block, then close.
        std::thread::sleep(Duration::from_millis(50));
        queue.close();
        assert!(consumer.join().unwrap().is_none());
    }
}
