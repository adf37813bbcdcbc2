//! # Pending Frame Queue
//!
//! Bounded ring of frames awaiting transmission. One mutex guards the
//! ring; a paired condvar is signalled on enqueue and on frame
//! completion so a transmit loop parked in [`FrameQueue::pop`] can
//! re-evaluate its gate.
//!
//! The pop gate is where preemption lives: a head frame is eligible iff
//! it is high-priority (enqueued with flush) or the frame currently in
//! flight has had its callback delivered. Everything else waits, bounded
//! by the retry interval, so a timed-out pop doubles as the retransmit
//! tick.

use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::error::SenderError;
use crate::state::lock;

// ─── Frame Descriptor ───────────────────────────────────────────────────────

/// A producer frame queued for (or undergoing) transmission.
#[derive(Debug, Clone)]
pub struct PendingFrame {
    /// Monotonic number assigned at enqueue time.
    pub frame_number: u32,
    /// Whole-frame payload. The producer's buffer is released when the
    /// terminal callback for this frame returns.
    pub data: Bytes,
    /// Frame was enqueued with the flush flag and may preempt.
    pub high_priority: bool,
}

// ─── Producer Callback ──────────────────────────────────────────────────────

/// Terminal disposition of an accepted frame. Exactly one is delivered
/// per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// Every fragment was acknowledged by the receiver.
    Sent,
    /// The frame was dropped: preempted in flight or flushed from the
    /// queue before transmission.
    Cancelled,
}

/// Producer notification hook.
///
/// Invoked on the sender's worker threads with internal locks held: it
/// must return promptly and must not call back into the sender.
pub type FrameCallback = Arc<dyn Fn(FrameStatus, &PendingFrame) + Send + Sync>;

// ─── FrameQueue ─────────────────────────────────────────────────────────────

struct Ring {
    entries: VecDeque<PendingFrame>,
    capacity: usize,
    next_frame_number: u32,
}

/// Bounded pending-frame queue with priority-aware pop.
pub struct FrameQueue {
    inner: Mutex<Ring>,
    cond: Condvar,
    callback: FrameCallback,
    wait_for_ack: bool,
}

impl FrameQueue {
    pub fn new(capacity: usize, wait_for_ack: bool, callback: FrameCallback) -> Self {
        FrameQueue {
            inner: Mutex::new(Ring {
                entries: VecDeque::with_capacity(capacity),
                capacity,
                next_frame_number: 0,
            }),
            cond: Condvar::new(),
            callback,
            wait_for_ack,
        }
    }

    /// Append a frame, assigning its number.
    ///
    /// With `flush` set, every queued frame is cancel-notified and
    /// dropped first; the in-flight frame is the transmit loop's to
    /// cancel when it pops the replacement. `outstanding` says whether a
    /// current frame is still awaiting its callback; it counts toward
    /// the returned prior backlog.
    pub fn enqueue(
        &self,
        data: Bytes,
        flush: bool,
        outstanding: bool,
    ) -> Result<usize, SenderError> {
        let mut ring = lock(&self.inner);
        if flush {
            self.cancel_all_locked(&mut ring);
        }
        if ring.entries.len() == ring.capacity {
            return Err(SenderError::QueueFull);
        }
        let backlog = ring.entries.len() + usize::from(outstanding);
        ring.next_frame_number = ring.next_frame_number.wrapping_add(1);
        let frame = PendingFrame {
            frame_number: ring.next_frame_number,
            data,
            high_priority: flush,
        };
        trace!(
            frame = frame.frame_number,
            high_priority = flush,
            backlog,
            "frame queued"
        );
        ring.entries.push_back(frame);
        self.cond.notify_one();
        Ok(backlog)
    }

    /// Take the head frame if it is eligible, waiting up to `bound`.
    ///
    /// Eligibility: high-priority frames always pass; otherwise the
    /// frame in flight must have been acknowledged (gate disabled when
    /// the sender is configured not to wait for acks). The wait
    /// accumulates elapsed time across spurious wakes so `bound` holds
    /// overall; a timeout returns `None`, which the transmit loop treats
    /// as its retransmit tick.
    pub fn pop(&self, bound: Duration, acknowledged: &AtomicBool) -> Option<PendingFrame> {
        let mut ring = lock(&self.inner);
        let mut remaining = bound;
        loop {
            if let Some(head) = ring.entries.front() {
                if head.high_priority || !self.wait_for_ack || acknowledged.load(Ordering::Acquire)
                {
                    return ring.entries.pop_front();
                }
            }
            if remaining.is_zero() {
                return None;
            }
            let started = Instant::now();
            let (guard, _) = self
                .cond
                .wait_timeout(ring, remaining)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            ring = guard;
            remaining = remaining.saturating_sub(started.elapsed());
        }
    }

    /// Cancel-notify and drop every queued frame. The in-flight frame is
    /// untouched.
    pub fn flush(&self) {
        let mut ring = lock(&self.inner);
        self.cancel_all_locked(&mut ring);
    }

    /// Wake any parked pop so it can re-evaluate its gate.
    pub fn notify(&self) {
        let _ring = lock(&self.inner);
        self.cond.notify_all();
    }

    /// Queued (not in-flight) frame count.
    pub fn len(&self) -> usize {
        lock(&self.inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn cancel_all_locked(&self, ring: &mut Ring) {
        if ring.entries.is_empty() {
            return;
        }
        debug!(dropped = ring.entries.len(), "flushing pending frames");
        while let Some(frame) = ring.entries.pop_front() {
            (self.callback)(FrameStatus::Cancelled, &frame);
        }
    }
}
