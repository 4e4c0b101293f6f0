use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::camera::error::{CaptureError, Result};
use crate::frame::canonical::{TargetBounds, CIF_HEIGHT, CIF_WIDTH};

/// Consecutive misses before the driver starts pushing neutral frames.
pub const DEFAULT_MISS_THRESHOLD: u32 = 30;
/// Backoff after a fetch that produced nothing.
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 10;
/// Backoff after a fetched frame was rejected as malformed.
pub const DEFAULT_REJECT_BACKOFF_MS: u64 = 5;
/// Backoff once stalled: roughly one frame interval at 30 fps.
pub const DEFAULT_STALL_BACKOFF_MS: u64 = 33;

/// Tunables for one capture session.
///
/// Serialised as camelCase JSON; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    pub max_width: u32,
    pub max_height: u32,
    pub miss_threshold: u32,
    pub retry_backoff_ms: u64,
    pub reject_backoff_ms: u64,
    pub stall_backoff_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_width: CIF_WIDTH,
            max_height: CIF_HEIGHT,
            miss_threshold: DEFAULT_MISS_THRESHOLD,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            reject_backoff_ms: DEFAULT_REJECT_BACKOFF_MS,
            stall_backoff_ms: DEFAULT_STALL_BACKOFF_MS,
        }
    }
}

impl PipelineConfig {
    /// Load from a JSON file, returning defaults when the file is missing.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| CaptureError::Config(format!("{}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| CaptureError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the driver cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.bounds()?;
        if self.miss_threshold == 0 {
            return Err(CaptureError::Config(
                "missThreshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn bounds(&self) -> Result<TargetBounds> {
        TargetBounds::new(self.max_width, self.max_height)
            .map_err(|e| CaptureError::Config(e.to_string()))
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn reject_backoff(&self) -> Duration {
        Duration::from_millis(self.reject_backoff_ms)
    }

    pub fn stall_backoff(&self) -> Duration {
        Duration::from_millis(self.stall_backoff_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_cif_and_observed_constants() {
        let config = PipelineConfig::default();
        assert_eq!((config.max_width, config.max_height), (352, 288));
        assert_eq!(config.miss_threshold, 30);
        assert_eq!(config.stall_backoff(), Duration::from_millis(33));
        assert_eq!(config.retry_backoff(), Duration::from_millis(10));
        assert_eq!(config.reject_backoff(), Duration::from_millis(5));
    }

    #[test]
    fn load_returns_default_when_file_missing() {
        let dir = TempDir::new().unwrap();
        let config = PipelineConfig::load(&dir.path().join("missing.json")).unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn load_fills_missing_fields_with_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("camfeed.json");
        std::fs::write(&path, r#"{"maxWidth": 640, "missThreshold": 5}"#).unwrap();

        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.max_width, 640);
        assert_eq!(config.max_height, 288);
        assert_eq!(config.miss_threshold, 5);
        assert_eq!(config.stall_backoff_ms, 33);
    }

    #[test]
    fn load_rejects_invalid_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("camfeed.json");
        std::fs::write(&path, "not valid json!!!").unwrap();
        assert!(matches!(
            PipelineConfig::load(&path),
            Err(CaptureError::Config(_))
        ));
    }

    #[test]
    fn load_rejects_zero_bounds() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("camfeed.json");
        std::fs::write(&path, r#"{"maxHeight": 0}"#).unwrap();
        assert!(PipelineConfig::load(&path).is_err());
    }

    #[test]
    fn validate_rejects_zero_threshold() {
        let config = PipelineConfig {
            miss_threshold: 0,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn serialises_to_camelcase() {
        let json = serde_json::to_value(PipelineConfig::default()).unwrap();
        assert_eq!(json["maxWidth"], 352);
        assert_eq!(json["stallBackoffMs"], 33);
    }
}
