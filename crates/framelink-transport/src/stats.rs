//! # Sender Statistics
//!
//! Lock-free counters shared by the transmit and ack loops, a serializable
//! snapshot for export, and the windowed efficiency estimator.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

// ─── Counters ───────────────────────────────────────────────────────────────

/// Shared atomic counters. Incremented from the worker loops and producer
/// threads; read via [`SenderCounters::snapshot`].
#[derive(Debug, Default)]
pub struct SenderCounters {
    pub frames_submitted: AtomicU64,
    pub frames_completed: AtomicU64,
    pub frames_cancelled: AtomicU64,
    pub fragments_sent: AtomicU64,
    pub retransmissions: AtomicU64,
    pub acks_received: AtomicU64,
    pub stale_acks: AtomicU64,
}

impl SenderCounters {
    pub fn snapshot(&self) -> SenderStats {
        SenderStats {
            frames_submitted: self.frames_submitted.load(Ordering::Relaxed),
            frames_completed: self.frames_completed.load(Ordering::Relaxed),
            frames_cancelled: self.frames_cancelled.load(Ordering::Relaxed),
            fragments_sent: self.fragments_sent.load(Ordering::Relaxed),
            retransmissions: self.retransmissions.load(Ordering::Relaxed),
            acks_received: self.acks_received.load(Ordering::Relaxed),
            stale_acks: self.stale_acks.load(Ordering::Relaxed),
        }
    }
}

/// Bump a counter by one.
pub(crate) fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

// ─── Snapshot ───────────────────────────────────────────────────────────────

/// Point-in-time sender statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SenderStats {
    /// Frames accepted into the queue.
    pub frames_submitted: u64,
    /// Frames fully acknowledged by the receiver.
    pub frames_completed: u64,
    /// Frames cancelled (preempted or flushed).
    pub frames_cancelled: u64,
    /// Fragment datagrams handed to the transport, retries included.
    pub fragments_sent: u64,
    /// Fragment transmissions beyond each fragment's first send.
    pub retransmissions: u64,
    /// Ack packets applied to the current frame.
    pub acks_received: u64,
    /// Ack packets dropped for referring to a non-current frame.
    pub stale_acks: u64,
}

// ─── Efficiency Window ──────────────────────────────────────────────────────

/// Circular window of per-frame (fragment count, transmissions issued)
/// totals, committed when the transmit loop advances to the next frame so
/// readers always see whole-frame snapshots.
#[derive(Debug, Clone)]
pub struct EfficiencyWindow {
    fragments: Vec<u64>,
    sent: Vec<u64>,
    index: usize,
}

impl EfficiencyWindow {
    pub fn new(window: usize) -> Self {
        EfficiencyWindow {
            fragments: vec![0; window],
            sent: vec![0; window],
            index: 0,
        }
    }

    /// Record the totals of the frame being retired and open a zeroed
    /// slot for the next one.
    pub fn commit(&mut self, nb_fragments: u64, nb_sent: u64) {
        self.fragments[self.index] = nb_fragments;
        self.sent[self.index] = nb_sent;
        self.index = (self.index + 1) % self.fragments.len();
        self.fragments[self.index] = 0;
        self.sent[self.index] = 0;
    }

    /// Ratio of distinct fragments to transmissions over the window, in
    /// `(0, 1]`. Returns 1.0 before any transmissions; a ratio above 1
    /// means lost send accounting and is clamped.
    pub fn estimate(&self) -> f32 {
        let fragments: u64 = self.fragments.iter().sum();
        let sent: u64 = self.sent.iter().sum();
        if sent == 0 {
            return 1.0;
        }
        let ratio = fragments as f32 / sent as f32;
        if ratio > 1.0 {
            warn!(fragments, sent, "efficiency above 1.0, clamping");
            return 1.0;
        }
        ratio
    }
}
