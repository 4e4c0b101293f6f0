use serde::{Deserialize, Serialize};

use crate::frame::error::FrameError;

/// Bytes per canonical pixel: Y, Cb, Cr.
pub const BYTES_PER_PIXEL: usize = 3;

/// Limited-range black: the value of every neutral-fill pixel.
pub const NEUTRAL_PIXEL: [u8; 3] = [16, 128, 128];

/// CIF, the default output bound.
pub const CIF_WIDTH: u32 = 352;
pub const CIF_HEIGHT: u32 = 288;

/// Byte length of a `width`x`height` canonical frame, if it fits in memory.
pub(crate) fn canonical_len(width: u32, height: u32) -> Result<usize, FrameError> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(BYTES_PER_PIXEL))
        .ok_or(FrameError::TooLarge { width, height })
}

/// A frame in the canonical packed 4:4:4 layout.
///
/// `data` is row-major with pixel `i` at byte `i * 3` holding `[Y, Cb, Cr]`;
/// no padding and no header. The length invariant is enforced at
/// construction, so a value of this type is always well-formed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalFrame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl CanonicalFrame {
    /// Wrap canonical bytes, checking `data.len() == width * height * 3`.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::ZeroDimension { width, height });
        }
        let expected = canonical_len(width, height)?;
        if data.len() != expected {
            return Err(FrameError::LengthMismatch {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// A frame filled with [`NEUTRAL_PIXEL`].
    pub fn neutral(width: u32, height: u32) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::ZeroDimension { width, height });
        }
        let len = canonical_len(width, height)?;
        let data = NEUTRAL_PIXEL
            .iter()
            .copied()
            .cycle()
            .take(len)
            .collect();
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consume the frame and return its bytes.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// `[Y, Cb, Cr]` at `(x, y)`, or `None` outside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        Some([self.data[i], self.data[i + 1], self.data[i + 2]])
    }

    /// Whether every pixel equals [`NEUTRAL_PIXEL`].
    pub fn is_neutral(&self) -> bool {
        self.data
            .chunks_exact(BYTES_PER_PIXEL)
            .all(|p| p == NEUTRAL_PIXEL)
    }
}

/// Maximum output resolution. Frames larger on either axis are cropped and
/// downsampled to exactly this size; smaller frames pass through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "BoundsRepr")]
pub struct TargetBounds {
    max_width: u32,
    max_height: u32,
}

/// Wire shape of [`TargetBounds`]; deserialisation goes through
/// [`TargetBounds::new`] so zero bounds are rejected.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BoundsRepr {
    max_width: u32,
    max_height: u32,
}

impl TryFrom<BoundsRepr> for TargetBounds {
    type Error = FrameError;

    fn try_from(repr: BoundsRepr) -> Result<Self, FrameError> {
        Self::new(repr.max_width, repr.max_height)
    }
}

impl TargetBounds {
    pub fn new(max_width: u32, max_height: u32) -> Result<Self, FrameError> {
        if max_width == 0 || max_height == 0 {
            return Err(FrameError::InvalidBounds {
                width: max_width,
                height: max_height,
            });
        }
        Ok(Self {
            max_width,
            max_height,
        })
    }

    pub const fn cif() -> Self {
        Self {
            max_width: CIF_WIDTH,
            max_height: CIF_HEIGHT,
        }
    }

    pub fn max_width(&self) -> u32 {
        self.max_width
    }

    pub fn max_height(&self) -> u32 {
        self.max_height
    }

    /// Whether a `width`x`height` source fits without resampling.
    pub fn contains(&self, width: u32, height: u32) -> bool {
        width <= self.max_width && height <= self.max_height
    }

    /// Output size for a source of the given size: native when it fits,
    /// otherwise exactly the bounds.
    pub fn output_size(&self, width: u32, height: u32) -> (u32, u32) {
        if self.contains(width, height) {
            (width, height)
        } else {
            (self.max_width, self.max_height)
        }
    }
}

impl Default for TargetBounds {
    fn default() -> Self {
        Self::cif()
    }
}
