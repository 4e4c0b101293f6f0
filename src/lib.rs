//! Live camera frame pipeline.
//!
//! A [`CaptureBackend`] yields raw frames in whatever layout the hardware
//! produces. Each frame is normalised into packed Y/Cb/Cr triplets, bounded
//! to a maximum resolution (352x288 by default) and handed to a single
//! consumer through a freshest-wins slot, so a slow consumer never stalls the
//! camera. When the camera stops producing, neutral frames keep the stream
//! alive until it recovers or the session is cancelled.

pub mod camera;
pub mod diagnostics;
pub mod frame;
pub mod pipeline;

use std::time::Duration;

pub use camera::backend::CaptureBackend;
pub use camera::error::{CaptureError, Result};
pub use camera::types::{PixelFormat, RawFrame, StreamFormat};
pub use frame::canonical::{CanonicalFrame, TargetBounds};
pub use pipeline::cancel::CancelSignal;
pub use pipeline::config::PipelineConfig;
pub use pipeline::session::CaptureSession;

/// Open `backend` and stream frames until `cancel` fires or the device is
/// lost.
pub fn start<B>(backend: B, config: PipelineConfig, cancel: CancelSignal) -> Result<CaptureSession>
where
    B: CaptureBackend + 'static,
{
    CaptureSession::start(backend, config, cancel)
}

/// Capture one frame, waiting at most `timeout`, and release the device.
pub fn take_single_frame<B>(
    backend: B,
    config: PipelineConfig,
    timeout: Duration,
) -> Result<CanonicalFrame>
where
    B: CaptureBackend + 'static,
{
    pipeline::session::take_single_frame(backend, config, timeout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::dummy::{TestPatternBackend, BARS};
    use crate::frame::convert::rgb_to_ycbcr;

    fn test_pattern() -> TestPatternBackend {
        TestPatternBackend::new(PixelFormat::Nv12, 1280, 720)
            .with_frame_interval(Duration::from_millis(2))
    }

    #[test]
    fn end_to_end_with_test_pattern() {
        let cancel = CancelSignal::new();
        let mut session = start(test_pattern(), PipelineConfig::default(), cancel.clone()).unwrap();

        let frame = session.next_frame_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!((frame.width(), frame.height()), (352, 288));
        assert_eq!(frame.data().len(), 352 * 288 * 3);
        // 16:9 loses its outer columns; the first visible bar is yellow.
        let [r, g, b] = BARS[1];
        assert_eq!(frame.pixel(0, 0), Some(rgb_to_ycbcr(r, g, b)));

        cancel.cancel();
        // At most the waiting frame plus one from the cycle in flight.
        assert!(session.frames().count() <= 2);
        assert!(session.stop().is_ok());
    }

    #[test]
    fn single_frame_from_test_pattern() {
        let frame =
            take_single_frame(test_pattern(), PipelineConfig::default(), Duration::from_secs(2))
                .unwrap();
        assert_eq!((frame.width(), frame.height()), (352, 288));
    }

    #[test]
    fn small_frames_keep_native_size() {
        let backend = TestPatternBackend::new(PixelFormat::Yuyv, 160, 120)
            .with_frame_interval(Duration::from_millis(2));
        let frame =
            take_single_frame(backend, PipelineConfig::default(), Duration::from_secs(2)).unwrap();
        assert_eq!((frame.width(), frame.height()), (160, 120));
    }

    #[test]
    fn stream_format_is_reported() {
        let session = start(test_pattern(), PipelineConfig::default(), CancelSignal::new()).unwrap();
        let format = session.stream_format();
        assert_eq!(format.pixel_format, PixelFormat::Nv12);
        assert_eq!((format.width, format.height), (1280, 720));
    }
}
