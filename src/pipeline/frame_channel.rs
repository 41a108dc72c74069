//! Hand-off between a capture thread and the session loop.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::Duration,
};

use anyhow::{Result, anyhow};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};

use super::FrameSource;
use crate::types::Frame;

/// Longest the session waits for a frame before treating the device as stalled.
pub const FRAME_TIMEOUT: Duration = Duration::from_secs(5);
/// Read errors in a row after which the capture thread gives up.
pub const MAX_CONSECUTIVE_READ_FAILURES: u32 = 30;

const RETRY_INTERVAL: Duration = Duration::from_millis(10);

pub type FrameSender = Sender<Result<Frame>>;

/// Single-slot channel: a busy consumer makes the producer drop frames.
pub fn frame_channel(timeout: Duration) -> (FrameSender, ChannelSource) {
    let (tx, rx) = bounded(1);
    (tx, ChannelSource { rx, timeout })
}

/// Receiving end of [`frame_channel`]. Errors sent by the producer surface
/// as `Err`, a closed channel as end of stream and a silent producer as a
/// timeout error.
#[derive(Debug)]
pub struct ChannelSource {
    rx: Receiver<Result<Frame>>,
    timeout: Duration,
}

impl FrameSource for ChannelSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match self.rx.recv_timeout(self.timeout) {
            Ok(Ok(frame)) => Ok(Some(frame)),
            Ok(Err(err)) => Err(err),
            Err(RecvTimeoutError::Timeout) => Err(anyhow!(
                "no frame received within {:.1}s",
                self.timeout.as_secs_f32()
            )),
            Err(RecvTimeoutError::Disconnected) => Ok(None),
        }
    }
}

/// Offers a frame; returns `false` once the consumer is gone.
pub fn offer_frame(tx: &FrameSender, frame: Frame) -> bool {
    !matches!(tx.try_send(Ok(frame)), Err(TrySendError::Disconnected(_)))
}

/// Delivers a terminal error, waiting for the slot to free up unless `stop`
/// is raised or the consumer is gone.
pub fn deliver_error(tx: &FrameSender, err: anyhow::Error, stop: &AtomicBool) {
    let mut message = Err(err);
    loop {
        match tx.try_send(message) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => return,
            Err(TrySendError::Full(pending)) => {
                if stop.load(Ordering::Relaxed) {
                    return;
                }
                message = pending;
                thread::sleep(RETRY_INTERVAL);
            }
        }
    }
}

/// Counts consecutive read failures; any success resets the count.
#[derive(Clone, Copy, Debug)]
pub struct ReadFailures {
    consecutive: u32,
    limit: u32,
}

impl ReadFailures {
    pub fn new(limit: u32) -> Self {
        Self {
            consecutive: 0,
            limit: limit.max(1),
        }
    }

    pub fn succeeded(&mut self) {
        self.consecutive = 0;
    }

    /// Records a failure; `true` means the limit is reached.
    pub fn failed(&mut self) -> bool {
        self.consecutive += 1;
        self.consecutive >= self.limit
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_then_end_of_stream() {
        let (tx, mut source) = frame_channel(Duration::from_secs(1));
        assert!(offer_frame(&tx, Frame::blank(2, 2)));
        // slot is full, the second frame is dropped
        assert!(offer_frame(&tx, Frame::blank(4, 4)));

        let frame = source.next_frame().unwrap().unwrap();
        assert_eq!((frame.width, frame.height), (2, 2));
        drop(tx);
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn producer_errors_reach_the_consumer() {
        let (tx, mut source) = frame_channel(Duration::from_secs(1));
        let stop = AtomicBool::new(false);
        deliver_error(&tx, anyhow!("device unplugged"), &stop);
        drop(tx);

        let err = source.next_frame().unwrap_err();
        assert!(err.to_string().contains("device unplugged"));
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn error_waits_behind_a_pending_frame() {
        let (tx, mut source) = frame_channel(Duration::from_secs(1));
        assert!(offer_frame(&tx, Frame::blank(2, 2)));

        let producer = thread::spawn(move || {
            let stop = AtomicBool::new(false);
            deliver_error(&tx, anyhow!("read failed"), &stop);
        });

        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().is_err());
        producer.join().unwrap();
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn stalled_producer_times_out() {
        let (_tx, mut source) = frame_channel(Duration::from_millis(20));
        let err = source.next_frame().unwrap_err();
        assert!(err.to_string().contains("no frame received"));
    }

    #[test]
    fn stop_abandons_a_blocked_error() {
        let (tx, _source) = frame_channel(Duration::from_secs(1));
        assert!(offer_frame(&tx, Frame::blank(2, 2)));
        let stop = AtomicBool::new(true);
        deliver_error(&tx, anyhow!("never read"), &stop);
    }

    #[test]
    fn offer_reports_a_closed_channel() {
        let (tx, source) = frame_channel(Duration::from_secs(1));
        drop(source);
        assert!(!offer_frame(&tx, Frame::blank(2, 2)));
    }

    #[test]
    fn failures_must_be_consecutive() {
        let mut failures = ReadFailures::new(3);
        assert!(!failures.failed());
        assert!(!failures.failed());
        failures.succeeded();
        assert_eq!(failures.consecutive(), 0);
        assert!(!failures.failed());
        assert!(!failures.failed());
        assert!(failures.failed());
    }
}
