use std::time::Duration;

use thiserror::Error;

/// Capture subsystem errors.
#[derive(Debug, Clone, Error)]
pub enum CaptureError {
    /// No backend, permission denied, or the device refused to open.
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The device went away mid-stream. Ends the session.
    #[error("device lost: {0}")]
    DeviceLost(String),

    /// A single fetch failed. Counted as a miss and retried.
    #[error("frame fetch failed: {0}")]
    Fetch(String),

    /// The consumer waited longer than its deadline. The producer may still
    /// be running.
    #[error("no frame within {0:?}")]
    Timeout(Duration),

    /// The producer stopped (cancellation or device loss).
    #[error("frame stream ended")]
    EndOfStream,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to spawn capture thread: {0}")]
    Spawn(String),
}

impl CaptureError {
    /// Whether a fetch-time error should terminate the driver instead of
    /// being treated as a miss.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::DeviceLost(_) | Self::DeviceUnavailable(_))
    }
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, CaptureError>;
