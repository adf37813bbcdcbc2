//! # Shared Sender State
//!
//! State shared by the transmit loop, the ack loop, producer threads and
//! the transport's send completions. Three lock domains:
//!
//! - `progress` — the frame in flight, its ack bitmap and the efficiency
//!   window.
//! - `window` — the to-send bitmap.
//! - the [`FrameQueue`]'s own mutex + condvar.
//!
//! Nesting order when more than one is held: **progress → window →
//! queue**. Send completions take only `window`; the ack loop takes
//! `progress` and then briefly the queue mutex to signal.
//!
//! `frame_acknowledged` mirrors `FrameProgress::callback_delivered` for
//! the two readers that must not take the progress lock — the pop
//! eligibility gate (runs under the queue mutex) and the enqueue backlog
//! computation. It is written only while holding `progress`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::bitmap::AckBitmap;
use crate::config::SenderConfig;
use crate::net::{ChannelId, NetworkManager};
use crate::queue::{FrameCallback, FrameQueue, PendingFrame};
use crate::stats::{EfficiencyWindow, SenderCounters};

/// Lock a mutex, recovering the guard if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ─── Lock Domains ───────────────────────────────────────────────────────────

/// Current-frame transmission progress. Guarded by the progress mutex.
pub(crate) struct FrameProgress {
    /// Frame being transmitted, `None` before the first pop.
    pub current: Option<PendingFrame>,
    /// Total fragments of the current frame.
    pub nb_fragments: usize,
    /// Terminal callback (Sent or Cancelled) delivered for the current
    /// frame. Set exactly once per frame.
    pub callback_delivered: bool,
    /// Fragments the receiver has acknowledged.
    pub acked: AckBitmap,
    /// Per-frame (fragments, transmissions) window for the efficiency
    /// estimate.
    pub efficiency: EfficiencyWindow,
}

/// Fragments handed to the transport but not yet confirmed sent.
/// Guarded by the window mutex.
pub(crate) struct SendWindow {
    pub to_send: AckBitmap,
}

// ─── SenderShared ───────────────────────────────────────────────────────────

/// Everything the loops, completions and producer threads share.
pub(crate) struct SenderShared {
    pub config: SenderConfig,
    pub manager: Arc<dyn NetworkManager>,
    pub data_channel: ChannelId,
    pub ack_channel: ChannelId,
    pub callback: FrameCallback,
    pub queue: FrameQueue,
    pub progress: Mutex<FrameProgress>,
    pub window: Mutex<SendWindow>,
    /// Pop-gate mirror of `callback_delivered`; true while no frame is
    /// outstanding.
    pub frame_acknowledged: AtomicBool,
    pub threads_should_stop: AtomicBool,
    pub data_loop_running: AtomicBool,
    pub ack_loop_running: AtomicBool,
    pub counters: Arc<SenderCounters>,
}

impl SenderShared {
    pub fn new(
        config: SenderConfig,
        manager: Arc<dyn NetworkManager>,
        data_channel: ChannelId,
        ack_channel: ChannelId,
        callback: FrameCallback,
        counters: Arc<SenderCounters>,
    ) -> Self {
        let queue = FrameQueue::new(
            config.queue_capacity,
            config.wait_for_ack,
            Arc::clone(&callback),
        );
        let efficiency = EfficiencyWindow::new(config.efficiency_window);
        SenderShared {
            config,
            manager,
            data_channel,
            ack_channel,
            callback,
            queue,
            progress: Mutex::new(FrameProgress {
                current: None,
                nb_fragments: 0,
                callback_delivered: false,
                acked: AckBitmap::default(),
                efficiency,
            }),
            window: Mutex::new(SendWindow {
                to_send: AckBitmap::default(),
            }),
            frame_acknowledged: AtomicBool::new(true),
            threads_should_stop: AtomicBool::new(false),
            data_loop_running: AtomicBool::new(false),
            ack_loop_running: AtomicBool::new(false),
            counters,
        }
    }

    pub fn should_stop(&self) -> bool {
        self.threads_should_stop.load(Ordering::Acquire)
    }
}
