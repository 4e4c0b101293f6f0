use crate::camera::error::Result;
use crate::camera::types::{RawFrame, StreamFormat};

/// Platform-agnostic capture backend.
///
/// Implemented per platform (V4L2 on Linux, AVFoundation on macOS, Media
/// Foundation on Windows) outside this crate. Poll-style backends implement
/// it directly; callback-driven ones go through
/// [`DelegateBackend`](crate::camera::delegate::DelegateBackend).
///
/// A backend is owned by exactly one session and only ever touched from that
/// session's driver thread.
pub trait CaptureBackend: Send {
    /// Open the device and report its native layout.
    ///
    /// Errors are surfaced to the caller of `start` and never retried.
    fn open(&mut self) -> Result<StreamFormat>;

    /// Fetch the next frame, or `Ok(None)` when none is ready yet.
    ///
    /// The returned view borrows the backend and must be released before the
    /// next call. Transient failures return `Err` with a non-fatal error;
    /// see [`CaptureError::is_fatal`](crate::camera::error::CaptureError::is_fatal).
    fn fetch(&mut self) -> Result<Option<RawFrame<'_>>>;

    /// Release the device and any mapped memory. Must be idempotent.
    fn close(&mut self);
}

impl<B: CaptureBackend + ?Sized> CaptureBackend for Box<B> {
    fn open(&mut self) -> Result<StreamFormat> {
        (**self).open()
    }

    fn fetch(&mut self) -> Result<Option<RawFrame<'_>>> {
        (**self).fetch()
    }

    fn close(&mut self) {
        (**self).close()
    }
}
