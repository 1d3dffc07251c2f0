use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::can::error::CanError;
use crate::can::frame::{FrameKind, TimestampedFrame};
use crate::zcan::codec;
use crate::zcan::device::ChannelController;
use crate::zcan::types::*;
use crate::zcan::ZCanDriver;

/// Flag shared with other threads to abort a blocked [`receive`]
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Re-arm the token after a cancellation was handled
    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }

    /// Consume a pending cancellation, re-arming the token
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

/// Most frames drained by one read; the rest stay queued for the next call
pub const MAX_RECEIVE_BATCH: usize = 1024;

/// How long [`receive`] waits for frames and how often it polls the pending count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceivePolicy {
    /// `None` waits until frames arrive or the token is cancelled
    pub timeout: Option<Duration>,
    pub min_interval: Duration,
    pub max_interval: Duration,
}

impl Default for ReceivePolicy {
    fn default() -> Self {
        Self {
            timeout: None,
            min_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(10),
        }
    }
}

impl ReceivePolicy {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Default::default()
        }
    }
}

/// Doubling poll interval, capped at the policy maximum
struct Backoff {
    current: Duration,
    max: Duration,
}

impl Backoff {
    fn new(policy: &ReceivePolicy) -> Self {
        Self {
            current: policy.min_interval.min(policy.max_interval),
            max: policy.max_interval,
        }
    }

    fn next(&mut self) -> Duration {
        let interval = self.current;
        self.current = (self.current * 2).min(self.max);
        interval
    }
}

/// Wait for frames of `kind` on a started channel and drain them in one read.
///
/// Returns an empty batch only when the deadline passes or `cancel` fires before any
/// frame is pending. A cancellation is consumed by the receive that reports it. Otherwise the batch holds exactly as many frames as the driver
/// returned for the pending count it reported. A failed read or an undecodable frame
/// yields [`CanError::Receive`] and no frames.
pub fn receive<D: ZCanDriver>(
    channel: &ChannelController<D>,
    kind: FrameKind,
    policy: &ReceivePolicy,
    cancel: &CancelToken,
) -> Result<Vec<TimestampedFrame>, CanError> {
    channel.ensure_started().map_err(CanError::Receive)?;

    let pending = match wait_pending(channel, kind, policy, cancel) {
        Some(n) => n,
        None => return Ok(Vec::new()),
    };

    match kind {
        FrameKind::Classic => read_classic(channel, pending),
        FrameKind::Fd => read_fd(channel, pending),
    }
}

/// Poll the pending count with backoff, capped at [`MAX_RECEIVE_BATCH`]. None on
/// deadline or cancellation.
fn wait_pending<D: ZCanDriver>(
    channel: &ChannelController<D>,
    kind: FrameKind,
    policy: &ReceivePolicy,
    cancel: &CancelToken,
) -> Option<usize> {
    let frame_type = match kind {
        FrameKind::Classic => TYPE_CAN,
        FrameKind::Fd => TYPE_CANFD,
    };
    // A timeout too large to represent is an unbounded wait
    let deadline = policy.timeout.and_then(|t| Instant::now().checked_add(t));
    let mut backoff = Backoff::new(policy);

    loop {
        let pending = channel.driver().get_receive_num(channel.handle(), frame_type);
        if pending > 0 {
            return Some((pending as usize).min(MAX_RECEIVE_BATCH));
        }
        if cancel.take() {
            log::debug!("CAN{} receive cancelled", channel.index());
            return None;
        }
        let mut sleep = backoff.next();
        if let Some(deadline) = deadline {
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            sleep = sleep.min(deadline - now);
        }
        thread::sleep(sleep);
    }
}

fn read_classic<D: ZCanDriver>(
    channel: &ChannelController<D>,
    pending: usize,
) -> Result<Vec<TimestampedFrame>, CanError> {
    let mut buf = vec![ZCanReceiveData::default(); pending];
    let received = channel
        .driver()
        .receive(channel.handle(), &mut buf, WAIT_FOREVER) as usize;
    check_count(channel, received, pending)?;
    buf.truncate(received);
    buf.iter()
        .map(|rx| {
            let frame = codec::decode_classic(&rx.frame)
                .map_err(|e| CanError::Receive(e.to_string()))?;
            Ok(TimestampedFrame {
                frame,
                timestamp: rx.timestamp,
            })
        })
        .collect()
}

fn read_fd<D: ZCanDriver>(
    channel: &ChannelController<D>,
    pending: usize,
) -> Result<Vec<TimestampedFrame>, CanError> {
    let mut buf = vec![ZCanReceiveFdData::default(); pending];
    let received = channel
        .driver()
        .receive_fd(channel.handle(), &mut buf, WAIT_FOREVER) as usize;
    check_count(channel, received, pending)?;
    buf.truncate(received);
    buf.iter()
        .map(|rx| {
            let frame =
                codec::decode_fd(&rx.frame).map_err(|e| CanError::Receive(e.to_string()))?;
            Ok(TimestampedFrame {
                frame,
                timestamp: rx.timestamp,
            })
        })
        .collect()
}

fn check_count<D: ZCanDriver>(
    channel: &ChannelController<D>,
    received: usize,
    requested: usize,
) -> Result<(), CanError> {
    if received == 0 || received > requested {
        return Err(CanError::Receive(format!(
            "CAN{} read returned {} of {} pending frames",
            channel.index(),
            received,
            requested
        )));
    }
    Ok(())
}
