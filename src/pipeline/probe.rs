//! Smoke test for a running session: log a handful of frames.

use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

use crate::camera::error::{CaptureError, Result};
use crate::pipeline::session::CaptureSession;

/// Frames consumed by a default probe.
pub const DEFAULT_PROBE_FRAMES: usize = 5;
/// Per-frame wait of a default probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Size of one probed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbedFrame {
    pub width: u32,
    pub height: u32,
    pub bytes: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeReport {
    pub frames: Vec<ProbedFrame>,
    /// Attempts that gave up waiting while the stream was still alive.
    pub timeouts: usize,
}

/// Consume up to `count` frames from `session`, waiting at most
/// `per_frame_timeout` for each.
///
/// A timeout is logged and the probe moves on; end-of-stream aborts it.
pub fn probe_frames(
    session: &CaptureSession,
    count: usize,
    per_frame_timeout: Duration,
) -> Result<ProbeReport> {
    let mut report = ProbeReport::default();
    for index in 1..=count {
        match session.next_frame_timeout(per_frame_timeout) {
            Ok(frame) => {
                let probed = ProbedFrame {
                    width: frame.width(),
                    height: frame.height(),
                    bytes: frame.data().len(),
                };
                info!(
                    "frame {index}: {}x{} ({} bytes)",
                    probed.width, probed.height, probed.bytes
                );
                report.frames.push(probed);
            }
            Err(CaptureError::Timeout(waited)) => {
                warn!("frame {index}: none received within {waited:?}");
                report.timeouts += 1;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(report)
}

/// [`probe_frames`] with [`DEFAULT_PROBE_FRAMES`] frames and
/// [`DEFAULT_PROBE_TIMEOUT`] per frame.
pub fn smoke_test(session: &CaptureSession) -> Result<ProbeReport> {
    probe_frames(session, DEFAULT_PROBE_FRAMES, DEFAULT_PROBE_TIMEOUT)
}
