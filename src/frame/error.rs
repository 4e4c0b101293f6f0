use thiserror::Error;

use crate::camera::types::PixelFormat;

/// Pixel-level failures: malformed raw buffers and invalid canonical frames.
///
/// The driver treats every one of these as a transient miss.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame data is {actual} bytes, expected {expected} for {width}x{height}")]
    LengthMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("frame has a zero dimension ({width}x{height})")]
    ZeroDimension { width: u32, height: u32 },

    #[error("{format} frame needs {expected} planes, got {actual}")]
    MissingPlane {
        format: PixelFormat,
        expected: usize,
        actual: usize,
    },

    #[error("plane {plane} stride {stride} is shorter than a row ({row_bytes} bytes)")]
    StrideTooSmall {
        plane: usize,
        stride: usize,
        row_bytes: usize,
    },

    #[error("plane {plane} holds {available} bytes, {needed} required")]
    Undersized {
        plane: usize,
        needed: usize,
        available: usize,
    },

    #[error("target bounds must be non-zero, got {width}x{height}")]
    InvalidBounds { width: u32, height: u32 },

    #[error("frame dimensions {width}x{height} overflow addressable memory")]
    TooLarge { width: u32, height: u32 },
}
