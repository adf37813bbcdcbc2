//! # Network Manager Capability
//!
//! The sender core does no socket I/O of its own. It is handed an
//! implementation of [`NetworkManager`] — the external datagram layer that
//! owns queuing, packet-level retries and latency estimation — and talks
//! to it through two numbered channels: one for outgoing fragments, one
//! for incoming acks.

use bytes::Bytes;
use std::time::Duration;

// ─── Channels ───────────────────────────────────────────────────────────────

/// Identifier of a datagram channel inside the manager.
pub type ChannelId = u8;

// ─── Send Completion ────────────────────────────────────────────────────────

/// Final status of a single datagram hand-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// The datagram left the manager's queue toward the network.
    Sent,
    /// The datagram was dropped before transmission (e.g. channel flush).
    Cancelled,
}

/// Per-send completion hook.
///
/// Invoked exactly once per [`NetworkManager::send_data`] call, on either
/// status. May fire synchronously from inside `send_data` or later from a
/// manager-owned thread, so the caller must not hold locks the completion
/// takes when issuing the send.
pub type SendCompletion = Box<dyn FnOnce(SendStatus) + Send>;

// ─── Receive Errors ─────────────────────────────────────────────────────────

/// Failure modes of [`NetworkManager::read_with_timeout`].
#[derive(Debug, thiserror::Error)]
pub enum RecvError {
    /// No datagram arrived within the timeout.
    #[error("read timed out")]
    TimedOut,
    /// The channel had no data buffered (non-fatal).
    #[error("channel empty")]
    Empty,
    /// The manager is shutting down; no further datagrams will arrive.
    #[error("channel disconnected")]
    Disconnected,
    /// Underlying transport error.
    #[error("transport i/o: {0}")]
    Io(#[from] std::io::Error),
}

// ─── NetworkManager ─────────────────────────────────────────────────────────

/// Datagram transport capability the sender runs over.
pub trait NetworkManager: Send + Sync {
    /// Queue one datagram on `channel`.
    ///
    /// `completion` is consumed exactly once with the final [`SendStatus`].
    fn send_data(&self, channel: ChannelId, data: Bytes, completion: SendCompletion);

    /// Block up to `timeout` for one datagram on `channel`, copying it
    /// into `buf` and returning its length.
    fn read_with_timeout(
        &self,
        channel: ChannelId,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, RecvError>;

    /// Latest round-trip latency estimate, if the manager has one.
    fn estimated_latency(&self) -> Option<Duration>;

    /// Drop every queued-but-unsent datagram on `channel`. Completions
    /// for dropped sends fire with [`SendStatus::Cancelled`].
    fn flush_channel(&self, channel: ChannelId);
}
