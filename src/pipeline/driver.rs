//! The producer side of a capture session.
//!
//! Each cycle fetches one raw frame, normalises and bounds it, and pushes it
//! into the delivery slot. Cycles that yield nothing are misses; after
//! `miss_threshold` consecutive misses the driver keeps the slot fresh with
//! neutral-fill frames and backs off to roughly one frame interval.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::camera::backend::CaptureBackend;
use crate::camera::error::{CaptureError, Result};
use crate::camera::types::StreamFormat;
use crate::diagnostics::stats::DiagnosticStats;
use crate::frame::canonical::{CanonicalFrame, TargetBounds};
use crate::frame::convert::{normalize, Normalized};
use crate::frame::error::FrameError;
use crate::frame::resample::fit_within;
use crate::pipeline::cancel::CancelSignal;
use crate::pipeline::config::PipelineConfig;
use crate::pipeline::slot::{DeliverySlot, PushOutcome};

/// Frames logged at debug level after a session starts.
const LOGGED_EARLY_FRAMES: u64 = 3;

/// Consecutive cycles without a delivered frame.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MissCounter(u32);

impl MissCounter {
    /// Count one more miss and return the new streak length.
    pub fn record(&mut self) -> u32 {
        self.0 = self.0.saturating_add(1);
        self.0
    }

    pub fn reset(&mut self) {
        self.0 = 0;
    }

    pub fn count(self) -> u32 {
        self.0
    }
}

/// Outcome of one driver cycle.
#[derive(Debug)]
pub enum Cycle {
    /// A converted frame was pushed.
    Delivered,
    /// No frame this cycle. Sleep `backoff` before the next one. `filled`
    /// is set when a neutral frame was pushed in its place.
    Missed { backoff: Duration, filled: bool },
    /// The backend reported a fatal error; the stream is over.
    Lost(CaptureError),
    /// The slot was closed underneath the driver.
    Detached,
}

/// Why a fetched frame could not be delivered.
enum Rejected {
    Malformed(FrameError),
    Unconvertible(FrameError),
}

pub struct Driver<B: CaptureBackend> {
    backend: B,
    slot: Arc<DeliverySlot>,
    config: PipelineConfig,
    bounds: TargetBounds,
    stats: Arc<Mutex<DiagnosticStats>>,
    format: StreamFormat,
    misses: MissCounter,
    /// Size of the last frame handed to the slot; neutral fills use it.
    output_size: (u32, u32),
    delivered: u64,
    warned_unsupported: bool,
    warned_malformed: bool,
    released: bool,
}

impl<B: CaptureBackend> Driver<B> {
    /// Validate `config`, open the backend and prepare the first cycle.
    ///
    /// The backend is closed again if opening fails.
    pub fn open(
        mut backend: B,
        slot: Arc<DeliverySlot>,
        config: PipelineConfig,
        stats: Arc<Mutex<DiagnosticStats>>,
    ) -> Result<Self> {
        config.validate()?;
        let bounds = config.bounds()?;

        let format = match backend.open() {
            Ok(format) => format,
            Err(e) => {
                backend.close();
                return Err(e);
            }
        };

        let output_size = if format.width == 0 || format.height == 0 {
            (bounds.max_width(), bounds.max_height())
        } else {
            bounds.output_size(format.width, format.height)
        };

        info!(
            fourcc = %format.pixel_format,
            format = format.pixel_format.describe(),
            width = format.width,
            height = format.height,
            output_width = output_size.0,
            output_height = output_size.1,
            strides = ?format.strides,
            resampling = !bounds.contains(format.width, format.height),
            "camera stream opened"
        );

        let mut driver = Self {
            backend,
            slot,
            config,
            bounds,
            stats,
            format,
            misses: MissCounter::default(),
            output_size,
            delivered: 0,
            warned_unsupported: false,
            warned_malformed: false,
            released: false,
        };
        if !driver.format.pixel_format.is_known() {
            driver.note_unsupported();
        }
        Ok(driver)
    }

    pub fn stream_format(&self) -> &StreamFormat {
        &self.format
    }

    pub fn output_size(&self) -> (u32, u32) {
        self.output_size
    }

    pub fn misses(&self) -> MissCounter {
        self.misses
    }

    /// Run one fetch, convert and deliver cycle. Never sleeps.
    pub fn step(&mut self) -> Cycle {
        let fetched = match self.backend.fetch() {
            Ok(Some(raw)) => Ok(Some(normalize(&raw).map_err(Rejected::Malformed))),
            Ok(None) => Ok(None),
            Err(e) => Err(e),
        };

        match fetched {
            Err(e) if e.is_fatal() => {
                warn!(error = %e, "capture device lost");
                Cycle::Lost(e)
            }
            Err(e) => {
                trace!(error = %e, "frame fetch failed");
                self.miss(self.config.retry_backoff())
            }
            Ok(None) => self.miss(self.config.retry_backoff()),
            Ok(Some(normalized)) => {
                let bounded = normalized.and_then(|n| self.bound(n));
                match bounded {
                    Ok(frame) => self.deliver(frame),
                    Err(rejected) => {
                        self.note_rejected(rejected);
                        self.miss(self.config.reject_backoff())
                    }
                }
            }
        }
    }

    /// Loop until cancelled, the device is lost or the slot is closed, then
    /// release the backend and close the slot.
    ///
    /// Returns the fatal backend error, if that is what ended the stream.
    pub fn run(mut self, cancel: &CancelSignal) -> Result<()> {
        let result = loop {
            if cancel.is_cancelled() {
                break Ok(());
            }
            match self.step() {
                Cycle::Delivered => {}
                Cycle::Missed { backoff, .. } => {
                    if cancel.sleep(backoff) {
                        break Ok(());
                    }
                }
                Cycle::Lost(e) => break Err(e),
                Cycle::Detached => break Ok(()),
            }
        };
        self.release();
        result
    }

    /// Close the backend and then the slot. Only the first call has an effect.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.backend.close();
        self.slot.close();
        let stats = self.stats.lock();
        info!(
            frames = stats.frame_count(),
            misses = stats.miss_count(),
            neutral_fills = stats.neutral_fill_count(),
            "camera stream closed"
        );
    }

    fn bound(&mut self, normalized: Normalized) -> std::result::Result<CanonicalFrame, Rejected> {
        if let Some(format) = normalized.unsupported {
            self.stats.lock().record_unsupported(format);
            self.note_unsupported();
        }
        fit_within(normalized.frame, self.bounds).map_err(Rejected::Unconvertible)
    }

    fn deliver(&mut self, frame: CanonicalFrame) -> Cycle {
        let (width, height) = (frame.width(), frame.height());
        let bytes = frame.data().len();

        if !self.push(frame) {
            return Cycle::Detached;
        }
        self.stats.lock().record_frame(bytes);

        if self.delivered < LOGGED_EARLY_FRAMES {
            debug!(frame = self.delivered, width, height, bytes, "frame delivered");
        }
        if self.misses.count() >= self.config.miss_threshold {
            info!(misses = self.misses.count(), "camera recovered");
        }
        self.delivered += 1;
        self.output_size = (width, height);
        self.misses.reset();
        self.warned_malformed = false;
        Cycle::Delivered
    }

    fn miss(&mut self, backoff: Duration) -> Cycle {
        let count = self.misses.record();
        self.stats.lock().record_miss();

        let threshold = self.config.miss_threshold;
        if count < threshold {
            return Cycle::Missed {
                backoff,
                filled: false,
            };
        }
        if count == threshold {
            warn!(misses = count, "no frames from camera, pushing neutral fill");
        }

        let (width, height) = self.output_size;
        let filled = match CanonicalFrame::neutral(width, height) {
            Ok(frame) => {
                if !self.push(frame) {
                    return Cycle::Detached;
                }
                self.stats.lock().record_neutral_fill();
                true
            }
            Err(e) => {
                warn!(error = %e, "cannot build neutral fill");
                false
            }
        };
        Cycle::Missed {
            backoff: self.config.stall_backoff(),
            filled,
        }
    }

    /// Push into the slot; `false` once the slot is closed.
    fn push(&mut self, frame: CanonicalFrame) -> bool {
        match self.slot.push(frame) {
            PushOutcome::Stored => true,
            PushOutcome::Replaced => {
                self.stats.lock().record_replaced();
                true
            }
            PushOutcome::Closed => false,
        }
    }

    fn note_unsupported(&mut self) {
        if !self.warned_unsupported {
            self.warned_unsupported = true;
            warn!(
                fourcc = %self.format.pixel_format,
                "unsupported pixel format, delivering neutral frames"
            );
        }
    }

    fn note_rejected(&mut self, rejected: Rejected) {
        if self.warned_malformed {
            return;
        }
        self.warned_malformed = true;
        match rejected {
            Rejected::Malformed(e) => warn!(error = %e, "dropping malformed frame"),
            Rejected::Unconvertible(e) => warn!(error = %e, "dropping frame that cannot be resampled"),
        }
    }
}

impl<B: CaptureBackend> Drop for Driver<B> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::mock::{solid_bgra, Exhausted, ScriptedBackend};
    use crate::camera::types::{fourcc, PixelFormat};
    use crate::pipeline::slot::PopError;

    fn bgra_format(width: u32, height: u32) -> StreamFormat {
        StreamFormat::new(PixelFormat::Bgra32, width, height)
    }

    fn open(backend: ScriptedBackend) -> (Driver<ScriptedBackend>, Arc<DeliverySlot>) {
        open_with(backend, PipelineConfig::default())
    }

    fn open_with(
        backend: ScriptedBackend,
        config: PipelineConfig,
    ) -> (Driver<ScriptedBackend>, Arc<DeliverySlot>) {
        let slot = Arc::new(DeliverySlot::new());
        let stats = Arc::new(Mutex::new(DiagnosticStats::new()));
        let driver = Driver::open(backend, Arc::clone(&slot), config, stats).unwrap();
        (driver, slot)
    }

    #[test]
    fn delivers_converted_frame() {
        let backend = ScriptedBackend::new(bgra_format(2, 2)).with_frame(solid_bgra(2, 2, [255, 0, 0]));
        let (mut driver, slot) = open(backend);

        assert!(matches!(driver.step(), Cycle::Delivered));
        let frame = slot.try_pop().unwrap();
        assert_eq!((frame.width(), frame.height()), (2, 2));
        assert_eq!(frame.pixel(1, 1), Some([82, 90, 240]));
    }

    #[test]
    fn oversized_frames_are_bounded() {
        let backend =
            ScriptedBackend::new(bgra_format(704, 576)).with_frame(solid_bgra(704, 576, [0, 0, 0]));
        let (mut driver, slot) = open(backend);
        assert_eq!(driver.output_size(), (352, 288));

        driver.step();
        let frame = slot.try_pop().unwrap();
        assert_eq!((frame.width(), frame.height()), (352, 288));
    }

    #[test]
    fn absent_frame_is_a_short_miss() {
        let (mut driver, slot) = open(ScriptedBackend::new(bgra_format(2, 2)));
        match driver.step() {
            Cycle::Missed { backoff, filled } => {
                assert_eq!(backoff, Duration::from_millis(10));
                assert!(!filled);
            }
            other => panic!("unexpected cycle {other:?}"),
        }
        assert_eq!(driver.misses().count(), 1);
        assert!(!slot.is_occupied());
    }

    #[test]
    fn transient_fetch_error_is_a_miss() {
        let backend = ScriptedBackend::new(bgra_format(2, 2))
            .with_error(CaptureError::Fetch("EIO".to_string()));
        let (mut driver, _slot) = open(backend);
        assert!(matches!(driver.step(), Cycle::Missed { .. }));
        assert_eq!(driver.misses().count(), 1);
    }

    #[test]
    fn malformed_frame_uses_reject_backoff() {
        let backend = ScriptedBackend::new(bgra_format(4, 4)).with_packed(vec![0; 10]);
        let (mut driver, slot) = open(backend);
        match driver.step() {
            Cycle::Missed { backoff, .. } => assert_eq!(backoff, Duration::from_millis(5)),
            other => panic!("unexpected cycle {other:?}"),
        }
        assert!(!slot.is_occupied());
    }

    #[test]
    fn neutral_fill_after_threshold_misses() {
        let backend = ScriptedBackend::new(bgra_format(640, 480));
        let (mut driver, slot) = open(backend);

        for _ in 0..29 {
            assert!(matches!(driver.step(), Cycle::Missed { filled: false, .. }));
        }
        assert!(!slot.is_occupied());

        match driver.step() {
            Cycle::Missed { backoff, filled } => {
                assert!(filled);
                assert_eq!(backoff, Duration::from_millis(33));
            }
            other => panic!("unexpected cycle {other:?}"),
        }
        let frame = slot.try_pop().unwrap();
        assert_eq!((frame.width(), frame.height()), (352, 288));
        assert!(frame.is_neutral());

        // Still stalled: every further miss refreshes the slot.
        assert!(matches!(driver.step(), Cycle::Missed { filled: true, .. }));
        assert!(slot.is_occupied());
    }

    #[test]
    fn neutral_fill_uses_last_delivered_size() {
        let config = PipelineConfig {
            miss_threshold: 2,
            ..PipelineConfig::default()
        };
        let backend = ScriptedBackend::new(bgra_format(8, 6)).with_frame(solid_bgra(4, 2, [9, 9, 9]));
        let (mut driver, slot) = open_with(backend, config);

        assert!(matches!(driver.step(), Cycle::Delivered));
        slot.try_pop();
        driver.step();
        driver.step();

        let fill = slot.try_pop().unwrap();
        assert_eq!((fill.width(), fill.height()), (4, 2));
        assert!(fill.is_neutral());
    }

    #[test]
    fn delivery_resets_miss_streak() {
        let backend = ScriptedBackend::new(bgra_format(2, 2))
            .with_misses(5)
            .with_frame(solid_bgra(2, 2, [1, 2, 3]));
        let (mut driver, _slot) = open(backend);
        for _ in 0..5 {
            driver.step();
        }
        assert_eq!(driver.misses().count(), 5);
        assert!(matches!(driver.step(), Cycle::Delivered));
        assert_eq!(driver.misses().count(), 0);
    }

    #[test]
    fn unknown_format_delivers_neutral_frames() {
        let format = StreamFormat::new(PixelFormat::from_fourcc(fourcc(b"MJPG")), 4, 4);
        let backend = ScriptedBackend::new(format).with_packed(vec![0xFF; 7]);
        let (mut driver, slot) = open(backend);

        assert!(matches!(driver.step(), Cycle::Delivered));
        assert!(slot.try_pop().unwrap().is_neutral());
        let snapshot = driver.stats.lock().snapshot();
        assert_eq!(snapshot.unsupported_format.as_deref(), Some("MJPG"));
    }

    #[test]
    fn fatal_error_ends_stream() {
        let backend = ScriptedBackend::new(bgra_format(2, 2)).when_exhausted(Exhausted::Lost);
        let (mut driver, _slot) = open(backend);
        assert!(matches!(driver.step(), Cycle::Lost(CaptureError::DeviceLost(_))));
    }

    #[test]
    fn replaced_frames_are_counted() {
        let backend = ScriptedBackend::new(bgra_format(2, 2))
            .with_frame(solid_bgra(2, 2, [1, 1, 1]))
            .with_frame(solid_bgra(2, 2, [2, 2, 2]));
        let (mut driver, _slot) = open(backend);
        driver.step();
        driver.step();
        assert_eq!(driver.stats.lock().snapshot().replaced_count, 1);
    }

    #[test]
    fn closed_slot_detaches_driver() {
        let backend = ScriptedBackend::new(bgra_format(2, 2)).with_frame(solid_bgra(2, 2, [0, 0, 0]));
        let (mut driver, slot) = open(backend);
        slot.close();
        assert!(matches!(driver.step(), Cycle::Detached));
    }

    #[test]
    fn open_failure_closes_backend() {
        let backend = ScriptedBackend::new(bgra_format(2, 2))
            .with_open_error(CaptureError::DeviceUnavailable("no device".to_string()));
        let counts = backend.counts();
        let slot = Arc::new(DeliverySlot::new());
        let stats = Arc::new(Mutex::new(DiagnosticStats::new()));

        let result = Driver::open(backend, slot, PipelineConfig::default(), stats);
        assert!(matches!(result, Err(CaptureError::DeviceUnavailable(_))));
        assert_eq!(counts.closes(), 1);
    }

    #[test]
    fn invalid_config_never_opens_backend() {
        let backend = ScriptedBackend::new(bgra_format(2, 2));
        let counts = backend.counts();
        let config = PipelineConfig {
            max_width: 0,
            ..PipelineConfig::default()
        };
        let slot = Arc::new(DeliverySlot::new());
        let stats = Arc::new(Mutex::new(DiagnosticStats::new()));

        assert!(matches!(
            Driver::open(backend, slot, config, stats),
            Err(CaptureError::Config(_))
        ));
        assert_eq!(counts.opens(), 0);
    }

    #[test]
    fn run_releases_once_on_cancel() {
        let backend = ScriptedBackend::new(bgra_format(2, 2))
            .with_frame(solid_bgra(2, 2, [0, 0, 0]))
            .when_exhausted(Exhausted::Miss);
        let counts = backend.counts();
        let (driver, slot) = open(backend);

        let cancel = CancelSignal::new();
        let runner = {
            let cancel = cancel.clone();
            std::thread::spawn(move || driver.run(&cancel))
        };
        std::thread::sleep(Duration::from_millis(30));
        cancel.cancel();

        assert!(runner.join().unwrap().is_ok());
        assert_eq!(counts.closes(), 1);
        assert!(slot.is_closed());
    }

    #[test]
    fn run_returns_device_loss() {
        let backend = ScriptedBackend::new(bgra_format(2, 2))
            .with_frame(solid_bgra(2, 2, [0, 0, 0]))
            .when_exhausted(Exhausted::Lost);
        let counts = backend.counts();
        let (driver, slot) = open(backend);

        let result = driver.run(&CancelSignal::new());
        assert!(matches!(result, Err(CaptureError::DeviceLost(_))));
        assert_eq!(counts.closes(), 1);

        // The frame delivered before the loss is still there, then EOS.
        assert!(slot.pop().is_ok());
        assert_eq!(slot.pop(), Err(PopError::Closed));
    }

    #[test]
    fn dropping_unstarted_driver_releases_backend() {
        let backend = ScriptedBackend::new(bgra_format(2, 2));
        let counts = backend.counts();
        let (driver, slot) = open(backend);
        drop(driver);
        assert_eq!(counts.closes(), 1);
        assert!(slot.is_closed());
    }
}
