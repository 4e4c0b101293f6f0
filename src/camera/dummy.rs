use std::time::Duration;

use crate::camera::backend::CaptureBackend;
use crate::camera::error::{CaptureError, Result};
use crate::camera::types::{Plane, PixelFormat, RawFrame, StreamFormat};
use crate::frame::convert::rgb_to_ycbcr;

/// Colour bars, left to right, as RGB.
pub const BARS: [[u8; 3]; 8] = [
    [255, 255, 255],
    [255, 255, 0],
    [0, 255, 255],
    [0, 255, 0],
    [255, 0, 255],
    [255, 0, 0],
    [0, 0, 255],
    [0, 0, 0],
];

/// Default pacing, roughly 30 fps.
const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(33);

/// A fake capture backend for running the pipeline without hardware.
///
/// Emits eight vertical colour bars encoded in the requested pixel format,
/// paced like a real camera.
///
/// Enable via `DUMMY_CAMERA=1` environment variable.
pub struct TestPatternBackend {
    format: StreamFormat,
    frame_interval: Duration,
    planes: Vec<Vec<u8>>,
    open: bool,
}

impl TestPatternBackend {
    /// A `width`x`height` stream in `pixel_format`.
    pub fn new(pixel_format: PixelFormat, width: u32, height: u32) -> Self {
        Self {
            format: StreamFormat::new(pixel_format, width, height),
            frame_interval: DEFAULT_FRAME_INTERVAL,
            planes: Vec::new(),
            open: false,
        }
    }

    /// Change the pacing between frames. Zero disables it.
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    /// Whether the dummy camera is enabled via environment variable.
    pub fn is_enabled() -> bool {
        gate_value_enables(std::env::var(ENABLE_VAR).ok().as_deref())
    }

    /// The default test pattern when `DUMMY_CAMERA` is set, for callers
    /// that fall back to a real device otherwise.
    pub fn from_env() -> Option<Self> {
        Self::is_enabled().then(Self::default)
    }

    /// Bar colour at column `x`.
    pub fn bar_at(&self, x: u32) -> [u8; 3] {
        bar_at(x, self.format.width)
    }
}

/// Environment variable that switches callers to the test pattern.
pub const ENABLE_VAR: &str = "DUMMY_CAMERA";

fn gate_value_enables(value: Option<&str>) -> bool {
    matches!(value, Some("1" | "true"))
}

impl Default for TestPatternBackend {
    /// 640x480 YUYV, the most common webcam mode.
    fn default() -> Self {
        Self::new(PixelFormat::Yuyv, 640, 480)
    }
}

impl CaptureBackend for TestPatternBackend {
    fn open(&mut self) -> Result<StreamFormat> {
        let StreamFormat {
            pixel_format,
            width,
            height,
            ..
        } = self.format;
        if width == 0 || height == 0 {
            return Err(CaptureError::DeviceUnavailable(format!(
                "test pattern cannot be {width}x{height}"
            )));
        }
        self.planes = render(pixel_format, width, height);
        self.open = true;
        Ok(self.format.clone())
    }

    fn fetch(&mut self) -> Result<Option<RawFrame<'_>>> {
        if !self.open {
            return Err(CaptureError::DeviceLost("test pattern is closed".to_string()));
        }
        if !self.frame_interval.is_zero() {
            std::thread::sleep(self.frame_interval);
        }
        Ok(Some(RawFrame::new(
            self.format.pixel_format,
            self.format.width,
            self.format.height,
            self.planes.iter().map(|p| Plane::new(p, 0)).collect(),
        )))
    }

    fn close(&mut self) {
        self.open = false;
        self.planes = Vec::new();
    }
}

fn bar_at(x: u32, width: u32) -> [u8; 3] {
    let index = (u64::from(x) * BARS.len() as u64 / u64::from(width.max(1))) as usize;
    BARS[index.min(BARS.len() - 1)]
}

/// Encode one frame of bars with tightly packed rows.
fn render(format: PixelFormat, width: u32, height: u32) -> Vec<Vec<u8>> {
    let (w, h) = (width as usize, height as usize);
    let rgb_row: Vec<[u8; 3]> = (0..width).map(|x| bar_at(x, width)).collect();
    let yuv_row: Vec<[u8; 3]> = rgb_row.iter().map(|&[r, g, b]| rgb_to_ycbcr(r, g, b)).collect();

    let repeat = |row: Vec<u8>, rows: usize| row.repeat(rows);

    match format {
        PixelFormat::Rgb24 => vec![repeat(rgb_row.concat(), h)],
        PixelFormat::Bgr24 => {
            let row: Vec<u8> = rgb_row.iter().flat_map(|&[r, g, b]| [b, g, r]).collect();
            vec![repeat(row, h)]
        }
        PixelFormat::Bgra32 => {
            let row: Vec<u8> = rgb_row.iter().flat_map(|&[r, g, b]| [b, g, r, 0xFF]).collect();
            vec![repeat(row, h)]
        }
        PixelFormat::Yuv24 => vec![repeat(yuv_row.concat(), h)],
        PixelFormat::Yuv444Planar => (0..3)
            .map(|c| repeat(yuv_row.iter().map(|px| px[c]).collect(), h))
            .collect(),
        PixelFormat::Yuyv | PixelFormat::Uyvy => {
            let row: Vec<u8> = yuv_row
                .chunks(2)
                .flat_map(|pair| {
                    let [y0, cb, cr] = pair[0];
                    let y1 = pair.get(1).map_or(y0, |px| px[0]);
                    if format == PixelFormat::Yuyv {
                        [y0, cb, y1, cr]
                    } else {
                        [cb, y0, cr, y1]
                    }
                })
                .collect();
            vec![repeat(row, h)]
        }
        PixelFormat::Nv12 => {
            let luma: Vec<u8> = yuv_row.iter().map(|px| px[0]).collect();
            let chroma: Vec<u8> = yuv_row
                .chunks(2)
                .flat_map(|pair| [pair[0][1], pair[0][2]])
                .collect();
            vec![repeat(luma, h), repeat(chroma, h.div_ceil(2))]
        }
        // Opaque payload; the normaliser substitutes neutral frames.
        PixelFormat::Unknown(_) => vec![vec![0x80; w * h * 2]],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::convert::normalize;

    const ALL_FORMATS: [PixelFormat; 8] = [
        PixelFormat::Nv12,
        PixelFormat::Yuyv,
        PixelFormat::Uyvy,
        PixelFormat::Yuv24,
        PixelFormat::Yuv444Planar,
        PixelFormat::Rgb24,
        PixelFormat::Bgr24,
        PixelFormat::Bgra32,
    ];

    fn open(format: PixelFormat, width: u32, height: u32) -> TestPatternBackend {
        let mut backend =
            TestPatternBackend::new(format, width, height).with_frame_interval(Duration::ZERO);
        backend.open().unwrap();
        backend
    }

    #[test]
    fn every_format_normalises_to_the_bars() {
        for format in ALL_FORMATS {
            let mut backend = open(format, 64, 6);
            let raw = backend.fetch().unwrap().unwrap();
            let frame = normalize(&raw).unwrap().frame;
            for (i, &[r, g, b]) in BARS.iter().enumerate() {
                let x = i as u32 * 8 + 4;
                assert_eq!(
                    frame.pixel(x, 5),
                    Some(rgb_to_ycbcr(r, g, b)),
                    "{format} bar {i}"
                );
            }
        }
    }

    #[test]
    fn odd_sizes_still_normalise() {
        for format in ALL_FORMATS {
            let mut backend = open(format, 7, 3);
            let raw = backend.fetch().unwrap().unwrap();
            assert!(normalize(&raw).is_ok(), "{format}");
        }
    }

    #[test]
    fn unknown_format_yields_neutral_frame() {
        let mut backend = open(PixelFormat::Unknown(0x1234_5678), 8, 8);
        let raw = backend.fetch().unwrap().unwrap();
        let normalized = normalize(&raw).unwrap();
        assert!(normalized.frame.is_neutral());
        assert!(normalized.unsupported.is_some());
    }

    #[test]
    fn fetch_after_close_is_fatal() {
        let mut backend = open(PixelFormat::Rgb24, 4, 4);
        backend.close();
        assert!(backend.fetch().unwrap_err().is_fatal());
    }

    #[test]
    fn gate_accepts_one_or_true() {
        assert!(gate_value_enables(Some("1")));
        assert!(gate_value_enables(Some("true")));
        assert!(!gate_value_enables(Some("0")));
        assert!(!gate_value_enables(Some("TRUE")));
        assert!(!gate_value_enables(Some("")));
        assert!(!gate_value_enables(None));
    }

    #[test]
    fn from_env_follows_gate() {
        assert_eq!(
            TestPatternBackend::from_env().is_some(),
            TestPatternBackend::is_enabled()
        );
    }

    #[test]
    fn zero_size_is_unavailable() {
        let mut backend = TestPatternBackend::new(PixelFormat::Rgb24, 0, 4);
        assert!(matches!(
            backend.open(),
            Err(CaptureError::DeviceUnavailable(_))
        ));
    }

    #[test]
    fn bars_span_the_width() {
        let backend = TestPatternBackend::new(PixelFormat::Rgb24, 80, 1);
        assert_eq!(backend.bar_at(0), BARS[0]);
        assert_eq!(backend.bar_at(79), BARS[7]);
    }
}
