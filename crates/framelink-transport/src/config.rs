//! # Sender Configuration
//!
//! Tunables shared with the remote receiver (fragment geometry) plus the
//! local retry/ack pacing knobs. Defaults match the reference receiver.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::bitmap::MAX_FRAGMENTS;
use crate::error::SenderError;

/// Sender configuration parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderConfig {
    /// Payload bytes per fragment. Must match the receiver.
    pub fragment_size: usize,
    /// Upper bound on fragments per frame (≤ 128, the ack bitmap width).
    pub max_fragments_per_frame: usize,
    /// Capacity of the pending-frame queue.
    pub queue_capacity: usize,
    /// Lower clamp on the retransmit wait.
    pub min_retry_wait: Duration,
    /// Upper clamp on the retransmit wait.
    pub max_retry_wait: Duration,
    /// Latency substitute when the transport has no estimate yet.
    pub default_latency: Duration,
    /// Slack added to the latency estimate before clamping.
    pub retry_margin: Duration,
    /// Number of recent frames in the efficiency window.
    pub efficiency_window: usize,
    /// Retransmit unacked fragments when the pop wait times out.
    pub enable_retries: bool,
    /// Hold low-priority frames until the current frame is acknowledged.
    pub wait_for_ack: bool,
    /// Blocking-read timeout of the ack loop.
    pub ack_read_timeout: Duration,
}

impl Default for SenderConfig {
    fn default() -> Self {
        SenderConfig {
            fragment_size: 1000,
            max_fragments_per_frame: MAX_FRAGMENTS,
            queue_capacity: 16,
            min_retry_wait: Duration::from_millis(15),
            max_retry_wait: Duration::from_millis(50),
            default_latency: Duration::from_millis(100),
            retry_margin: Duration::from_millis(5),
            efficiency_window: 15,
            enable_retries: true,
            wait_for_ack: true,
            ack_read_timeout: Duration::from_secs(1),
        }
    }
}

impl SenderConfig {
    /// Largest frame the sender accepts, in bytes.
    pub fn max_frame_size(&self) -> usize {
        self.fragment_size * self.max_fragments_per_frame
    }

    /// Reject configurations the loops cannot run with.
    pub fn validate(&self) -> Result<(), SenderError> {
        if self.fragment_size == 0 {
            return Err(SenderError::InvalidConfig("fragment_size must be nonzero"));
        }
        if self.max_fragments_per_frame == 0 || self.max_fragments_per_frame > MAX_FRAGMENTS {
            return Err(SenderError::InvalidConfig(
                "max_fragments_per_frame must be in 1..=128",
            ));
        }
        if self.queue_capacity == 0 {
            return Err(SenderError::InvalidConfig("queue_capacity must be nonzero"));
        }
        if self.efficiency_window == 0 {
            return Err(SenderError::InvalidConfig(
                "efficiency_window must be nonzero",
            ));
        }
        if self.min_retry_wait > self.max_retry_wait {
            return Err(SenderError::InvalidConfig(
                "min_retry_wait exceeds max_retry_wait",
            ));
        }
        if self.ack_read_timeout.is_zero() {
            return Err(SenderError::InvalidConfig(
                "ack_read_timeout must be nonzero",
            ));
        }
        Ok(())
    }

    /// Bounded wait before the next retransmit round, derived from the
    /// transport's latency estimate.
    pub fn retry_wait(&self, estimated_latency: Option<Duration>) -> Duration {
        let latency = estimated_latency.unwrap_or(self.default_latency);
        (latency + self.retry_margin).clamp(self.min_retry_wait, self.max_retry_wait)
    }
}
