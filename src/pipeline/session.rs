use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{error, info};

use crate::camera::backend::CaptureBackend;
use crate::camera::error::{CaptureError, Result};
use crate::camera::types::StreamFormat;
use crate::diagnostics::stats::{DiagnosticSnapshot, DiagnosticStats};
use crate::frame::canonical::CanonicalFrame;
use crate::pipeline::cancel::CancelSignal;
use crate::pipeline::config::PipelineConfig;
use crate::pipeline::driver::Driver;
use crate::pipeline::slot::{DeliverySlot, PopError};

/// Active capture session for a single camera.
///
/// Owns the driver thread, the delivery slot and the diagnostics for one
/// opened backend. Frames are consumed with [`next_frame`](Self::next_frame),
/// [`next_frame_timeout`](Self::next_frame_timeout), [`recv`](Self::recv) or
/// the [`frames`](Self::frames) iterator; all of them report end-of-stream
/// once the driver has stopped and the last frame has been taken.
pub struct CaptureSession {
    slot: Arc<DeliverySlot>,
    cancel: CancelSignal,
    stats: Arc<Mutex<DiagnosticStats>>,
    format: StreamFormat,
    thread: Option<JoinHandle<Result<()>>>,
    outcome: Option<Result<()>>,
}

impl CaptureSession {
    /// Open `backend` and start producing frames on a dedicated thread.
    ///
    /// Opening happens on the calling thread, so `DeviceUnavailable` and
    /// configuration errors are returned here and never retried. The session
    /// ends when `cancel` fires, the device is lost, or [`stop`](Self::stop)
    /// is called.
    pub fn start<B>(backend: B, config: PipelineConfig, cancel: CancelSignal) -> Result<Self>
    where
        B: CaptureBackend + 'static,
    {
        let slot = Arc::new(DeliverySlot::new());
        let stats = Arc::new(Mutex::new(DiagnosticStats::new()));
        let driver = Driver::open(backend, Arc::clone(&slot), config, Arc::clone(&stats))?;
        let format = driver.stream_format().clone();

        let thread = {
            let cancel = cancel.clone();
            std::thread::Builder::new()
                .name(format!("capture-{}", format.pixel_format))
                .spawn(move || {
                    info!("capture thread starting");
                    let result = driver.run(&cancel);
                    if let Err(e) = &result {
                        error!("capture stream ended: {e}");
                    }
                    info!("capture thread exiting");
                    result
                })
                // The closure, and with it the driver, is dropped on failure,
                // which releases the backend.
                .map_err(|e| CaptureError::Spawn(e.to_string()))?
        };

        Ok(Self {
            slot,
            cancel,
            stats,
            format,
            thread: Some(thread),
            outcome: None,
        })
    }

    /// Layout the backend declared when it opened.
    pub fn stream_format(&self) -> &StreamFormat {
        &self.format
    }

    /// Whether the driver is still producing frames.
    pub fn is_running(&self) -> bool {
        self.thread.is_some() && !self.slot.is_closed()
    }

    /// Take a snapshot of diagnostic stats for this session.
    pub fn diagnostics(&self) -> DiagnosticSnapshot {
        self.stats.lock().snapshot()
    }

    /// Block until the next frame, or `EndOfStream`.
    pub fn next_frame(&self) -> Result<CanonicalFrame> {
        self.slot.pop().map_err(|_| CaptureError::EndOfStream)
    }

    /// Block for at most `timeout`.
    ///
    /// `Timeout` means the producer is alive but slow; `EndOfStream` means
    /// it has stopped.
    pub fn next_frame_timeout(&self, timeout: Duration) -> Result<CanonicalFrame> {
        self.slot.pop_timeout(timeout).map_err(|e| match e {
            PopError::Closed => CaptureError::EndOfStream,
            PopError::Timeout => CaptureError::Timeout(timeout),
        })
    }

    /// Await the next frame. `None` at end-of-stream.
    pub async fn recv(&self) -> Option<CanonicalFrame> {
        self.slot.recv().await
    }

    /// Blocking iterator over delivered frames, ending at end-of-stream.
    pub fn frames(&self) -> Frames<'_> {
        Frames { slot: &self.slot }
    }

    /// Cancel the driver and wait for it to release the backend.
    ///
    /// Idempotent. Returns the error that ended the stream, if the device
    /// was lost rather than cancelled.
    pub fn stop(&mut self) -> Result<()> {
        self.cancel.cancel();
        if let Some(handle) = self.thread.take() {
            let outcome = handle
                .join()
                .unwrap_or_else(|_| Err(CaptureError::DeviceLost("capture thread panicked".to_string())));
            self.slot.close();
            self.outcome = Some(outcome);
        }
        self.outcome.clone().unwrap_or(Ok(()))
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Iterator returned by [`CaptureSession::frames`].
pub struct Frames<'a> {
    slot: &'a DeliverySlot,
}

impl Iterator for Frames<'_> {
    type Item = CanonicalFrame;

    fn next(&mut self) -> Option<CanonicalFrame> {
        self.slot.pop().ok()
    }
}

impl<'a> IntoIterator for &'a CaptureSession {
    type Item = CanonicalFrame;
    type IntoIter = Frames<'a>;

    fn into_iter(self) -> Frames<'a> {
        self.frames()
    }
}

/// Start a session, wait up to `timeout` for one frame, and stop again.
pub fn take_single_frame<B>(
    backend: B,
    config: PipelineConfig,
    timeout: Duration,
) -> Result<CanonicalFrame>
where
    B: CaptureBackend + 'static,
{
    let mut session = CaptureSession::start(backend, config, CancelSignal::new())?;
    let frame = session.next_frame_timeout(timeout);
    let stopped = session.stop();
    match frame {
        // Report why the stream ended instead of the bare end-of-stream.
        Err(CaptureError::EndOfStream) => stopped.and(Err(CaptureError::EndOfStream)),
        other => other,
    }
}
