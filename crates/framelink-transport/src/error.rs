//! Sender error taxonomy.

/// Errors surfaced by the framelink sender API.
#[derive(Debug, thiserror::Error)]
pub enum SenderError {
    /// Null-equivalent or nonsensical inputs (empty frame, zero sizes).
    #[error("invalid parameters: {0}")]
    BadParameters(&'static str),

    /// The frame exceeds the configured maximum frame size.
    #[error("frame of {size} bytes exceeds maximum of {max}")]
    FrameTooLarge { size: usize, max: usize },

    /// Soft backpressure: the pending-frame queue is at capacity.
    /// The producer still owns the frame buffer and may retry.
    #[error("frame queue is full")]
    QueueFull,

    /// Configuration rejected at construction time.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// A worker thread could not be spawned.
    #[error("failed to spawn sender thread: {0}")]
    Spawn(#[source] std::io::Error),
}
