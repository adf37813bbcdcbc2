//! # Frame Sender
//!
//! Reliable fragmented frame transmission over a [`NetworkManager`].
//! Accepts whole frames from the producer, splits them into fixed-size
//! fragments, and selectively retransmits whatever the receiver has not
//! acknowledged until the frame completes or a flush frame preempts it.
//!
//! ## Runtime shape
//!
//! Two long-lived worker threads per sender:
//!
//! 1. **Transmit loop** — pops the next eligible frame, recomputes the
//!    still-unacknowledged fragment set every retry interval, and hands
//!    fragments to the transport.
//! 2. **Ack loop** — blocks on the ack channel, merges received fragment
//!    bitmaps into the current frame's state and delivers the
//!    [`FrameStatus::Sent`] callback on completion.
//!
//! Producer threads call [`FrameSender::send_frame`] concurrently; the
//! transport invokes per-fragment send completions from its own threads.
//! Shutdown is cooperative: [`FrameSender::stop`] raises the stop flag
//! and both loops observe it within their own wait bounds.

use bytes::Bytes;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, trace, warn};

use crate::bitmap::AckBitmap;
use crate::config::SenderConfig;
use crate::error::SenderError;
use crate::net::{ChannelId, NetworkManager, RecvError, SendCompletion, SendStatus};
use crate::queue::{FrameCallback, FrameStatus, PendingFrame};
use crate::state::{lock, SenderShared};
use crate::stats::{bump, SenderCounters, SenderStats};
use crate::wire::{encode_fragment, FragmentHeader, FrameAck, ACK_PACKET_SIZE};

// ─── FrameSender ────────────────────────────────────────────────────────────

/// Handle to one running sender instance.
///
/// Owns the two worker threads. [`FrameSender::shutdown`] (also run on
/// drop) stops and joins them, so the shared state outlives every
/// completion the transport may still deliver.
pub struct FrameSender {
    shared: Arc<SenderShared>,
    data_handle: Option<JoinHandle<()>>,
    ack_handle: Option<JoinHandle<()>>,
}

impl FrameSender {
    /// Build a sender and spawn its worker threads.
    ///
    /// `data_channel` carries outgoing fragments, `ack_channel` incoming
    /// acks. `callback` receives the terminal [`FrameStatus`] for every
    /// accepted frame. If a thread fails to spawn, everything already
    /// started is torn down before the error returns.
    pub fn new(
        manager: Arc<dyn NetworkManager>,
        data_channel: ChannelId,
        ack_channel: ChannelId,
        callback: FrameCallback,
        config: SenderConfig,
    ) -> Result<Self, SenderError> {
        config.validate()?;

        let counters = Arc::new(SenderCounters::default());
        let hooks = Arc::clone(&counters);
        let producer_callback = callback;
        let callback: FrameCallback = Arc::new(move |status, frame: &PendingFrame| {
            match status {
                FrameStatus::Sent => bump(&hooks.frames_completed),
                FrameStatus::Cancelled => bump(&hooks.frames_cancelled),
            }
            (producer_callback)(status, frame);
        });

        let shared = Arc::new(SenderShared::new(
            config,
            manager,
            data_channel,
            ack_channel,
            callback,
            counters,
        ));

        let data_shared = Arc::clone(&shared);
        let data_handle = thread::Builder::new()
            .name("framelink-data".into())
            .spawn(move || data_loop(data_shared))
            .map_err(SenderError::Spawn)?;

        let ack_shared = Arc::clone(&shared);
        let ack_handle = match thread::Builder::new()
            .name("framelink-ack".into())
            .spawn(move || ack_loop(ack_shared))
        {
            Ok(handle) => handle,
            Err(err) => {
                shared.threads_should_stop.store(true, Ordering::Release);
                shared.queue.notify();
                let _ = data_handle.join();
                return Err(SenderError::Spawn(err));
            }
        };

        Ok(FrameSender {
            shared,
            data_handle: Some(data_handle),
            ack_handle: Some(ack_handle),
        })
    }

    /// Queue a frame for transmission.
    ///
    /// With `flush` set, every frame still waiting in the queue is
    /// cancel-notified and dropped first, and this frame will preempt
    /// the one in flight. Returns the number of frames ahead of this one
    /// (queued plus unacknowledged in-flight) at enqueue time.
    pub fn send_frame(&self, data: Bytes, flush: bool) -> Result<usize, SenderError> {
        if data.is_empty() {
            return Err(SenderError::BadParameters("empty frame"));
        }
        let max = self.shared.config.max_frame_size();
        if data.len() > max {
            return Err(SenderError::FrameTooLarge {
                size: data.len(),
                max,
            });
        }
        let outstanding = !self.shared.frame_acknowledged.load(Ordering::Acquire);
        let backlog = self.shared.queue.enqueue(data, flush, outstanding)?;
        bump(&self.shared.counters.frames_submitted);
        Ok(backlog)
    }

    /// Cancel-notify and drop every queued frame. The frame in flight,
    /// if any, keeps transmitting.
    pub fn flush_queue(&self) {
        self.shared.queue.flush();
    }

    /// Fragments-per-transmission ratio over the recent-frame window,
    /// in `(0, 1]`. 1.0 means no retransmissions (or no traffic yet).
    pub fn estimated_efficiency(&self) -> f32 {
        lock(&self.shared.progress).efficiency.estimate()
    }

    /// Counter snapshot.
    pub fn stats(&self) -> SenderStats {
        self.shared.counters.snapshot()
    }

    /// Raise the stop flag. Both loops observe it within their own wait
    /// bounds (retry interval for the transmit loop, read timeout for
    /// the ack loop).
    pub fn stop(&self) {
        self.shared.threads_should_stop.store(true, Ordering::Release);
        self.shared.queue.notify();
    }

    /// Whether either worker loop is still running.
    pub fn is_running(&self) -> bool {
        self.shared.data_loop_running.load(Ordering::Acquire)
            || self.shared.ack_loop_running.load(Ordering::Acquire)
    }

    /// Stop and join both worker threads, then cancel-notify whatever is
    /// still outstanding (queued frames and an unacknowledged in-flight
    /// frame) so every accepted frame gets its terminal callback exactly
    /// once. Idempotent; also runs on drop. The teardown callbacks are
    /// delivered on the calling thread.
    pub fn shutdown(&mut self) {
        self.stop();
        if let Some(handle) = self.data_handle.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.ack_handle.take() {
            let _ = handle.join();
        }

        self.shared.queue.flush();
        let mut progress = lock(&self.shared.progress);
        if let Some(current) = progress.current.take() {
            if !progress.callback_delivered {
                progress.callback_delivered = true;
                (self.shared.callback)(FrameStatus::Cancelled, &current);
            }
        }
    }
}

impl Drop for FrameSender {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ─── Transmit Loop ──────────────────────────────────────────────────────────

/// Entry point of the `framelink-data` thread.
fn data_loop(shared: Arc<SenderShared>) {
    shared.data_loop_running.store(true, Ordering::Release);
    debug!("transmit loop started");

    // Per-frame transmission accounting, owned by this thread.
    let mut transmissions: u64 = 0;
    let mut sent_once = AckBitmap::default();

    while !shared.should_stop() {
        let bound = shared
            .config
            .retry_wait(shared.manager.estimated_latency());
        let popped = shared.queue.pop(bound, &shared.frame_acknowledged);
        let advanced = popped.is_some();
        if let Some(frame) = popped {
            install_frame(&shared, frame, &mut transmissions, &mut sent_once);
        }
        if !advanced && !shared.config.enable_retries {
            continue;
        }
        transmit_pending(&shared, &mut transmissions, &mut sent_once);
    }

    shared.data_loop_running.store(false, Ordering::Release);
    debug!("transmit loop stopped");
}

/// Retire the outgoing frame and make `frame` current.
fn install_frame(
    shared: &Arc<SenderShared>,
    frame: PendingFrame,
    transmissions: &mut u64,
    sent_once: &mut AckBitmap,
) {
    let mut progress = lock(&shared.progress);

    // Whole-frame efficiency totals are committed at advance time so
    // readers never observe a frame mid-flight.
    let retired_fragments = progress.nb_fragments as u64;
    progress.efficiency.commit(retired_fragments, *transmissions);
    *transmissions = 0;

    if let Some(previous) = progress.current.take() {
        if !progress.callback_delivered {
            // Preempted mid-flight: drop its queued fragments, then tell
            // the producer.
            shared.manager.flush_channel(shared.data_channel);
            debug!(frame = previous.frame_number, "cancelling unacknowledged frame");
            (shared.callback)(FrameStatus::Cancelled, &previous);
        }
    }

    let nb_fragments = frame.data.len().div_ceil(shared.config.fragment_size);
    debug!(
        frame = frame.frame_number,
        fragments = nb_fragments,
        bytes = frame.data.len(),
        high_priority = frame.high_priority,
        "frame installed"
    );
    progress.nb_fragments = nb_fragments;
    progress.callback_delivered = false;
    shared.frame_acknowledged.store(false, Ordering::Release);
    progress.acked.reset(frame.frame_number);
    lock(&shared.window).to_send.reset(frame.frame_number);
    sent_once.reset(frame.frame_number);
    progress.current = Some(frame);
}

/// One retransmit round: merge unacknowledged fragments into the to-send
/// set, then hand each pending fragment to the transport.
fn transmit_pending(
    shared: &Arc<SenderShared>,
    transmissions: &mut u64,
    sent_once: &mut AckBitmap,
) {
    // Snapshot the work under the locks; sends go out with none held, so
    // a synchronous completion can take the window lock.
    let (frame, nb_fragments, pending) = {
        let progress = lock(&shared.progress);
        let Some(frame) = progress.current.clone() else {
            return;
        };
        if progress.callback_delivered {
            return;
        }
        let mut window = lock(&shared.window);
        for index in 0..progress.nb_fragments {
            if !progress.acked.test(index) {
                window.to_send.set(index);
            }
        }
        let pending: Vec<usize> = window.to_send.set_indices(progress.nb_fragments).collect();
        (frame, progress.nb_fragments, pending)
    };
    if pending.is_empty() {
        return;
    }

    trace!(
        frame = frame.frame_number,
        pending = pending.len(),
        "transmitting fragments"
    );
    let fragment_size = shared.config.fragment_size;
    for index in pending {
        let start = index * fragment_size;
        let end = (start + fragment_size).min(frame.data.len());
        let header = FragmentHeader::new(frame.frame_number, index as u8, nb_fragments as u8)
            .with_flush(frame.high_priority);
        let datagram = encode_fragment(&header, &frame.data[start..end]);

        if sent_once.test(index) {
            bump(&shared.counters.retransmissions);
        } else {
            sent_once.set(index);
        }
        bump(&shared.counters.fragments_sent);
        *transmissions += 1;

        let completion = send_completion(shared, frame.frame_number, index as u8);
        shared
            .manager
            .send_data(shared.data_channel, datagram, completion);
    }
}

/// Completion hook for one fragment send. Consumed exactly once by the
/// transport, on either status.
fn send_completion(
    shared: &Arc<SenderShared>,
    frame_number: u32,
    fragment_number: u8,
) -> SendCompletion {
    let shared = Arc::clone(shared);
    Box::new(move |status| match status {
        SendStatus::Sent => {
            let mut window = lock(&shared.window);
            if window.to_send.frame_number() == frame_number {
                if window.to_send.clear(fragment_number as usize) {
                    trace!(frame = frame_number, "all fragments handed to transport");
                }
            } else {
                // Completion for a preempted frame.
                trace!(
                    frame = frame_number,
                    fragment = fragment_number,
                    "stale send completion ignored"
                );
            }
        }
        SendStatus::Cancelled => {}
    })
}

// ─── Ack Loop ───────────────────────────────────────────────────────────────

/// Entry point of the `framelink-ack` thread.
fn ack_loop(shared: Arc<SenderShared>) {
    shared.ack_loop_running.store(true, Ordering::Release);
    debug!("ack loop started");

    let mut buf = [0u8; ACK_PACKET_SIZE];
    while !shared.should_stop() {
        match shared.manager.read_with_timeout(
            shared.ack_channel,
            &mut buf,
            shared.config.ack_read_timeout,
        ) {
            Ok(ACK_PACKET_SIZE) => {
                let mut slice = &buf[..];
                if let Some(ack) = FrameAck::decode(&mut slice) {
                    apply_ack(&shared, ack);
                }
            }
            Ok(len) => warn!(
                len,
                expected = ACK_PACKET_SIZE,
                "discarding ack packet with unexpected size"
            ),
            Err(RecvError::TimedOut) | Err(RecvError::Empty) => {}
            Err(err) => warn!(error = %err, "ack channel read failed"),
        }
    }

    shared.ack_loop_running.store(false, Ordering::Release);
    debug!("ack loop stopped");
}

/// Merge one received ack into the current frame's state.
fn apply_ack(shared: &Arc<SenderShared>, ack: FrameAck) {
    let mut progress = lock(&shared.progress);
    let Some(current) = progress.current.clone() else {
        bump(&shared.counters.stale_acks);
        return;
    };
    if !ack.matches_frame(current.frame_number) {
        trace!(
            ack_frame = ack.frame_number,
            current = current.frame_number,
            "stale ack dropped"
        );
        bump(&shared.counters.stale_acks);
        return;
    }

    progress.acked.merge(ack.high_packets_ack, ack.low_packets_ack);
    bump(&shared.counters.acks_received);

    if !progress.callback_delivered && progress.acked.all_set(progress.nb_fragments) {
        progress.callback_delivered = true;
        debug!(frame = current.frame_number, "frame fully acknowledged");
        (shared.callback)(FrameStatus::Sent, &current);
        // The gate opens only once the callback has returned: the
        // transmit loop must not select the next frame before the
        // producer hears about this one.
        shared.frame_acknowledged.store(true, Ordering::Release);
        shared.queue.notify();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Transport stub: sends complete synchronously, the ack channel
    /// only ever times out.
    struct NullNet;

    impl NetworkManager for NullNet {
        fn send_data(&self, _channel: ChannelId, _data: Bytes, completion: SendCompletion) {
            completion(SendStatus::Sent);
        }

        fn read_with_timeout(
            &self,
            _channel: ChannelId,
            _buf: &mut [u8],
            timeout: Duration,
        ) -> Result<usize, RecvError> {
            thread::sleep(timeout.min(Duration::from_millis(10)));
            Err(RecvError::TimedOut)
        }

        fn estimated_latency(&self) -> Option<Duration> {
            None
        }

        fn flush_channel(&self, _channel: ChannelId) {}
    }

    fn quiet_callback() -> FrameCallback {
        Arc::new(|_, _| {})
    }

    fn test_config() -> SenderConfig {
        SenderConfig {
            ack_read_timeout: Duration::from_millis(20),
            ..SenderConfig::default()
        }
    }

    // ─── Lifecycle ──────────────────────────────────────────────────────

    #[test]
    fn new_rejects_invalid_config() {
        let config = SenderConfig {
            fragment_size: 0,
            ..test_config()
        };
        let result = FrameSender::new(Arc::new(NullNet), 0, 1, quiet_callback(), config);
        assert!(matches!(result, Err(SenderError::InvalidConfig(_))));
    }

    #[test]
    fn shutdown_stops_both_loops() {
        let mut sender =
            FrameSender::new(Arc::new(NullNet), 0, 1, quiet_callback(), test_config()).unwrap();
        thread::sleep(Duration::from_millis(30));
        assert!(sender.is_running());
        sender.shutdown();
        assert!(!sender.is_running());
    }

    #[test]
    fn shutdown_is_idempotent() {
        let mut sender =
            FrameSender::new(Arc::new(NullNet), 0, 1, quiet_callback(), test_config()).unwrap();
        sender.shutdown();
        sender.shutdown();
    }

    #[test]
    fn drop_joins_workers() {
        let sender =
            FrameSender::new(Arc::new(NullNet), 0, 1, quiet_callback(), test_config()).unwrap();
        drop(sender);
    }

    // ─── Parameter Validation ───────────────────────────────────────────

    #[test]
    fn empty_frame_is_bad_parameters() {
        let sender =
            FrameSender::new(Arc::new(NullNet), 0, 1, quiet_callback(), test_config()).unwrap();
        let result = sender.send_frame(Bytes::new(), false);
        assert!(matches!(result, Err(SenderError::BadParameters(_))));
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let sender =
            FrameSender::new(Arc::new(NullNet), 0, 1, quiet_callback(), test_config()).unwrap();
        let max = sender.shared.config.max_frame_size();
        let result = sender.send_frame(Bytes::from(vec![0u8; max + 1]), false);
        assert!(matches!(result, Err(SenderError::FrameTooLarge { .. })));
    }

    #[test]
    fn efficiency_is_one_before_traffic() {
        let sender =
            FrameSender::new(Arc::new(NullNet), 0, 1, quiet_callback(), test_config()).unwrap();
        assert_eq!(sender.estimated_efficiency(), 1.0);
    }
}
