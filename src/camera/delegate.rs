//! Adapter from callback-driven capture APIs to the polling
//! [`CaptureBackend`] contract.
//!
//! AVFoundation-style APIs push frames into a delegate on their own thread.
//! The delegate copies each frame into a one-frame holding area, replacing
//! any frame the driver has not fetched yet, and the driver polls that area
//! exactly as it would poll a V4L2 device.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::camera::backend::CaptureBackend;
use crate::camera::error::{CaptureError, Result};
use crate::camera::types::{OwnedRawFrame, RawFrame, StreamFormat};

#[derive(Default)]
struct Held {
    frame: Option<OwnedRawFrame>,
    lost: Option<String>,
}

/// Handle given to a callback source for delivering frames.
#[derive(Clone, Default)]
pub struct DelegateSink {
    held: Arc<Mutex<Held>>,
}

impl DelegateSink {
    /// Copy `frame` into the holding area. Returns `true` if an unfetched
    /// frame was discarded.
    pub fn deliver(&self, frame: &RawFrame<'_>) -> bool {
        self.deliver_owned(OwnedRawFrame::copy_from(frame))
    }

    /// Like [`deliver`](Self::deliver) for a frame the source already owns.
    pub fn deliver_owned(&self, frame: OwnedRawFrame) -> bool {
        self.held.lock().frame.replace(frame).is_some()
    }

    /// Report that the device went away. The next fetch fails fatally.
    pub fn report_lost(&self, reason: impl Into<String>) {
        self.held.lock().lost = Some(reason.into());
    }

    fn take(&self) -> std::result::Result<Option<OwnedRawFrame>, String> {
        let mut held = self.held.lock();
        match &held.lost {
            Some(reason) => Err(reason.clone()),
            None => Ok(held.frame.take()),
        }
    }

    fn clear(&self) {
        *self.held.lock() = Held::default();
    }
}

/// A capture API that pushes frames instead of being polled.
pub trait DelegateSource: Send {
    /// Begin delivering frames into `sink` and report the stream layout.
    fn start(&mut self, sink: DelegateSink) -> Result<StreamFormat>;

    /// Stop delivering frames. Called once per successful `start`.
    fn stop(&mut self);
}

/// [`CaptureBackend`] over a [`DelegateSource`].
pub struct DelegateBackend<S: DelegateSource> {
    source: S,
    sink: DelegateSink,
    current: Option<OwnedRawFrame>,
    started: bool,
}

impl<S: DelegateSource> DelegateBackend<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            sink: DelegateSink::default(),
            current: None,
            started: false,
        }
    }
}

impl<S: DelegateSource> CaptureBackend for DelegateBackend<S> {
    fn open(&mut self) -> Result<StreamFormat> {
        self.sink.clear();
        let format = self.source.start(self.sink.clone())?;
        self.started = true;
        Ok(format)
    }

    fn fetch(&mut self) -> Result<Option<RawFrame<'_>>> {
        match self.sink.take() {
            Err(reason) => Err(CaptureError::DeviceLost(reason)),
            Ok(None) => Ok(None),
            Ok(Some(frame)) => {
                let frame = self.current.insert(frame);
                Ok(Some(frame.as_raw()))
            }
        }
    }

    fn close(&mut self) {
        if self.started {
            self.started = false;
            self.source.stop();
        }
        self.current = None;
        self.sink.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::mock::solid_bgra;
    use crate::camera::types::PixelFormat;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread::JoinHandle;
    use std::time::Duration;

    type SinkCell = Arc<Mutex<Option<DelegateSink>>>;

    /// Source whose sink the test drives by hand.
    struct ManualSource {
        sink: SinkCell,
        stops: Arc<AtomicUsize>,
    }

    impl DelegateSource for ManualSource {
        fn start(&mut self, sink: DelegateSink) -> Result<StreamFormat> {
            *self.sink.lock() = Some(sink);
            Ok(StreamFormat::new(PixelFormat::Bgra32, 2, 2))
        }

        fn stop(&mut self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn manual() -> (DelegateBackend<ManualSource>, SinkCell, Arc<AtomicUsize>) {
        let sink = Arc::new(Mutex::new(None));
        let stops = Arc::new(AtomicUsize::new(0));
        let backend = DelegateBackend::new(ManualSource {
            sink: Arc::clone(&sink),
            stops: Arc::clone(&stops),
        });
        (backend, sink, stops)
    }

    #[test]
    fn fetch_is_empty_until_delegate_delivers() {
        let (mut backend, sink, _) = manual();
        backend.open().unwrap();
        assert!(backend.fetch().unwrap().is_none());

        let frame = solid_bgra(2, 2, [1, 2, 3]);
        let sink = sink.lock().clone().unwrap();
        assert!(!sink.deliver(&frame.as_raw()));
        let raw = backend.fetch().unwrap().unwrap();
        assert_eq!(raw.planes[0].data, &frame.planes[0].data[..]);
        assert!(backend.fetch().unwrap().is_none());
    }

    #[test]
    fn newest_delivery_wins() {
        let (mut backend, sink, _) = manual();
        backend.open().unwrap();
        let sink = sink.lock().clone().unwrap();

        sink.deliver_owned(solid_bgra(2, 2, [1, 1, 1]));
        assert!(sink.deliver_owned(solid_bgra(2, 2, [9, 9, 9])));

        let raw = backend.fetch().unwrap().unwrap();
        assert_eq!(&raw.planes[0].data[..4], &[9, 9, 9, 0xFF]);
    }

    #[test]
    fn reported_loss_is_fatal() {
        let (mut backend, sink, _) = manual();
        backend.open().unwrap();
        sink.lock().clone().unwrap().report_lost("device disconnected");
        let err = backend.fetch().unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn close_stops_source_once() {
        let (mut backend, _, stops) = manual();
        backend.open().unwrap();
        backend.close();
        backend.close();
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    /// Source that pushes frames from its own thread, like a capture delegate.
    struct ThreadedSource {
        running: Arc<AtomicBool>,
        worker: Option<JoinHandle<()>>,
    }

    impl DelegateSource for ThreadedSource {
        fn start(&mut self, sink: DelegateSink) -> Result<StreamFormat> {
            self.running.store(true, Ordering::SeqCst);
            let running = Arc::clone(&self.running);
            self.worker = Some(std::thread::spawn(move || {
                let mut value = 0u8;
                while running.load(Ordering::SeqCst) {
                    sink.deliver_owned(solid_bgra(2, 2, [value, value, value]));
                    value = value.wrapping_add(1);
                    std::thread::sleep(Duration::from_millis(1));
                }
            }));
            Ok(StreamFormat::new(PixelFormat::Bgra32, 2, 2))
        }

        fn stop(&mut self) {
            self.running.store(false, Ordering::SeqCst);
            if let Some(worker) = self.worker.take() {
                let _ = worker.join();
            }
        }
    }

    #[test]
    fn threaded_delegate_is_polled_like_a_device() {
        let mut backend = DelegateBackend::new(ThreadedSource {
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        });
        backend.open().unwrap();

        let mut fetched = 0;
        for _ in 0..200 {
            if backend.fetch().unwrap().is_some() {
                fetched += 1;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        backend.close();
        assert!(fetched > 0);
    }
}
