//! Scripted capture backend for exercising the pipeline without hardware.
//!
//! Uses a builder to queue frames, misses and errors that `fetch` replays in
//! order. Counters are shared through `Arc`s so a test can keep observing the
//! backend after handing it to a session.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::camera::backend::CaptureBackend;
use crate::camera::error::{CaptureError, Result};
use crate::camera::types::{OwnedPlane, OwnedRawFrame, PixelFormat, RawFrame, StreamFormat};

/// One scripted fetch outcome.
#[derive(Debug)]
enum Step {
    Frame(OwnedRawFrame),
    Miss,
    Error(CaptureError),
}

/// What `fetch` does once the script is used up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exhausted {
    /// Report "no frame yet" forever.
    Miss,
    /// Replay the last frame served.
    RepeatLast,
    /// Fail with `DeviceLost`.
    Lost,
}

/// Shared call counters for a [`ScriptedBackend`].
#[derive(Debug, Clone, Default)]
pub struct CallCounts {
    opens: Arc<AtomicUsize>,
    fetches: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl CallCounts {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Number of `close` calls, including redundant ones.
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// Capture backend that replays a fixed script.
pub struct ScriptedBackend {
    format: StreamFormat,
    open_error: Option<CaptureError>,
    script: VecDeque<Step>,
    exhausted: Exhausted,
    fetch_delay: Option<Duration>,
    current: Option<OwnedRawFrame>,
    counts: CallCounts,
    open: bool,
}

impl ScriptedBackend {
    /// Create a backend declaring `format` with an empty script.
    pub fn new(format: StreamFormat) -> Self {
        Self {
            format,
            open_error: None,
            script: VecDeque::new(),
            exhausted: Exhausted::Miss,
            fetch_delay: None,
            current: None,
            counts: CallCounts::default(),
            open: false,
        }
    }

    /// Make `open` fail with `error`.
    pub fn with_open_error(mut self, error: CaptureError) -> Self {
        self.open_error = Some(error);
        self
    }

    /// Queue a frame.
    pub fn with_frame(mut self, frame: OwnedRawFrame) -> Self {
        self.script.push_back(Step::Frame(frame));
        self
    }

    /// Queue a single-plane frame in the declared format and size.
    pub fn with_packed(self, data: Vec<u8>) -> Self {
        let frame = OwnedRawFrame {
            format: self.format.pixel_format,
            width: self.format.width,
            height: self.format.height,
            planes: vec![OwnedPlane { data, stride: 0 }],
        };
        self.with_frame(frame)
    }

    /// Queue `count` fetches that return no frame.
    pub fn with_misses(mut self, count: usize) -> Self {
        self.script.extend((0..count).map(|_| Step::Miss));
        self
    }

    /// Queue a fetch error.
    pub fn with_error(mut self, error: CaptureError) -> Self {
        self.script.push_back(Step::Error(error));
        self
    }

    /// Choose what happens after the script runs out.
    pub fn when_exhausted(mut self, exhausted: Exhausted) -> Self {
        self.exhausted = exhausted;
        self
    }

    /// Sleep this long inside every fetch, like a camera pacing its output.
    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }

    /// Counters that stay readable after the backend is moved away.
    pub fn counts(&self) -> CallCounts {
        self.counts.clone()
    }
}

impl CaptureBackend for ScriptedBackend {
    fn open(&mut self) -> Result<StreamFormat> {
        self.counts.opens.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.open_error.take() {
            return Err(error);
        }
        self.open = true;
        Ok(self.format.clone())
    }

    fn fetch(&mut self) -> Result<Option<RawFrame<'_>>> {
        self.counts.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.fetch_delay {
            std::thread::sleep(delay);
        }
        if !self.open {
            return Err(CaptureError::DeviceLost("device is closed".to_string()));
        }

        match self.script.pop_front() {
            Some(Step::Frame(frame)) => {
                self.current = Some(frame);
            }
            Some(Step::Miss) => return Ok(None),
            Some(Step::Error(error)) => return Err(error),
            None => match self.exhausted {
                Exhausted::Miss => return Ok(None),
                Exhausted::RepeatLast if self.current.is_some() => {}
                Exhausted::RepeatLast => return Ok(None),
                Exhausted::Lost => {
                    return Err(CaptureError::DeviceLost("script exhausted".to_string()))
                }
            },
        }
        Ok(self.current.as_ref().map(OwnedRawFrame::as_raw))
    }

    fn close(&mut self) {
        self.counts.closes.fetch_add(1, Ordering::SeqCst);
        self.open = false;
        self.current = None;
    }
}

/// Tightly packed BGRA frame of one colour, handy for scripted tests.
pub fn solid_bgra(width: u32, height: u32, [r, g, b]: [u8; 3]) -> OwnedRawFrame {
    let pixels = width as usize * height as usize;
    let data = [b, g, r, 0xFF].repeat(pixels);
    OwnedRawFrame {
        format: PixelFormat::Bgra32,
        width,
        height,
        planes: vec![OwnedPlane { data, stride: 0 }],
    }
}
