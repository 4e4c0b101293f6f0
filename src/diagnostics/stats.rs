use serde::Serialize;
use std::time::Instant;

use crate::camera::types::PixelFormat;

/// Collects diagnostic statistics for one capture session.
pub struct DiagnosticStats {
    frame_count: u64,
    miss_count: u64,
    neutral_fill_count: u64,
    replaced_count: u64,
    total_bytes: u64,
    start_time: Instant,
    last_frame_time: Option<Instant>,
    unsupported_format: Option<PixelFormat>,
}

/// Snapshot of diagnostic stats for serialisation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticSnapshot {
    pub fps: f64,
    pub frame_count: u64,
    pub miss_count: u64,
    pub miss_rate: f64,
    pub neutral_fill_count: u64,
    pub replaced_count: u64,
    pub bandwidth_bps: u64,
    /// Milliseconds since the last delivered frame, if any.
    pub since_last_frame_ms: Option<u64>,
    pub unsupported_format: Option<String>,
}

impl DiagnosticStats {
    /// Create new stats with zeroed counters.
    pub fn new() -> Self {
        Self {
            frame_count: 0,
            miss_count: 0,
            neutral_fill_count: 0,
            replaced_count: 0,
            total_bytes: 0,
            start_time: Instant::now(),
            last_frame_time: None,
            unsupported_format: None,
        }
    }

    /// Record a frame pushed into the delivery slot.
    pub fn record_frame(&mut self, bytes: usize) {
        self.frame_count += 1;
        self.total_bytes += bytes as u64;
        self.last_frame_time = Some(Instant::now());
    }

    /// Record a cycle that produced no frame.
    pub fn record_miss(&mut self) {
        self.miss_count += 1;
    }

    /// Record a neutral-fill frame pushed while stalled.
    pub fn record_neutral_fill(&mut self) {
        self.neutral_fill_count += 1;
    }

    /// Record a frame discarded from the slot before anyone consumed it.
    pub fn record_replaced(&mut self) {
        self.replaced_count += 1;
    }

    /// Remember a format the normaliser could not map.
    pub fn record_unsupported(&mut self, format: PixelFormat) {
        self.unsupported_format = Some(format);
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn miss_count(&self) -> u64 {
        self.miss_count
    }

    pub fn neutral_fill_count(&self) -> u64 {
        self.neutral_fill_count
    }

    /// Calculate current FPS based on elapsed time.
    pub fn fps(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed < 0.001 {
            return 0.0;
        }
        self.frame_count as f64 / elapsed
    }

    /// Misses as a percentage of all cycles (0.0 - 100.0).
    pub fn miss_rate(&self) -> f64 {
        let total = self.frame_count + self.miss_count;
        if total == 0 {
            return 0.0;
        }
        (self.miss_count as f64 / total as f64) * 100.0
    }

    /// Output bandwidth in bytes per second.
    pub fn bandwidth_bps(&self) -> u64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed < 0.001 {
            return 0;
        }
        (self.total_bytes as f64 / elapsed) as u64
    }

    /// Take a serialisable snapshot.
    pub fn snapshot(&self) -> DiagnosticSnapshot {
        DiagnosticSnapshot {
            fps: self.fps(),
            frame_count: self.frame_count,
            miss_count: self.miss_count,
            miss_rate: self.miss_rate(),
            neutral_fill_count: self.neutral_fill_count,
            replaced_count: self.replaced_count,
            bandwidth_bps: self.bandwidth_bps(),
            since_last_frame_ms: self
                .last_frame_time
                .map(|t| t.elapsed().as_millis() as u64),
            unsupported_format: self.unsupported_format.map(|f| f.to_string()),
        }
    }
}

impl Default for DiagnosticStats {
    fn default() -> Self {
        Self::new()
    }
}
