//! Aspect-preserving downsampling into [`TargetBounds`].
//!
//! Oversized frames are centre-cropped to the target aspect ratio and then
//! nearest-sampled into exactly `max_width`x`max_height`. Every output
//! pixel is a verbatim copy of one source pixel, so results are
//! deterministic and cost O(1) per pixel.

use crate::frame::canonical::{canonical_len, CanonicalFrame, TargetBounds, BYTES_PER_PIXEL};
use crate::frame::error::FrameError;

/// Source rectangle sampled into the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub x0: u32,
    pub y0: u32,
    pub width: u32,
    pub height: u32,
}

/// Centred crop of a `src_w`x`src_h` frame matching the aspect of `bounds`.
///
/// Wider sources lose columns on both sides, taller ones lose rows. The
/// cropped extent is `round(h * dst_aspect)` or `round(w / dst_aspect)`,
/// computed in exact integer arithmetic and clamped to `[1, extent]`.
pub fn crop_region(src_w: u32, src_h: u32, bounds: TargetBounds) -> CropRegion {
    let (w, h) = (u64::from(src_w), u64::from(src_h));
    let (dst_w, dst_h) = (
        u64::from(bounds.max_width()),
        u64::from(bounds.max_height()),
    );

    // w / h > dst_w / dst_h
    if w * dst_h > dst_w * h {
        let crop_w = round_div(h * dst_w, dst_h).clamp(1, w) as u32;
        CropRegion {
            x0: (src_w - crop_w) / 2,
            y0: 0,
            width: crop_w,
            height: src_h,
        }
    } else {
        let crop_h = round_div(w * dst_h, dst_w).clamp(1, h) as u32;
        CropRegion {
            x0: 0,
            y0: (src_h - crop_h) / 2,
            width: src_w,
            height: crop_h,
        }
    }
}

/// `num / den` rounded half away from zero (operands are non-negative).
/// `den` must fit in `u32` so the remainder test cannot overflow.
fn round_div(num: u64, den: u64) -> u64 {
    num / den + u64::from(num % den * 2 >= den)
}

/// Bound `frame` to `bounds`.
///
/// Frames that already fit on both axes are returned untouched; nothing is
/// ever upscaled. Otherwise the result is exactly the bounds.
pub fn fit_within(frame: CanonicalFrame, bounds: TargetBounds) -> Result<CanonicalFrame, FrameError> {
    let (src_w, src_h) = (frame.width(), frame.height());
    if bounds.contains(src_w, src_h) {
        return Ok(frame);
    }

    let crop = crop_region(src_w, src_h, bounds);
    let (dst_w, dst_h) = (bounds.max_width(), bounds.max_height());
    let mut dst = vec![0u8; canonical_len(dst_w, dst_h)?];

    let src = frame.data();
    let src_stride = src_w as usize * BYTES_PER_PIXEL;
    let columns = source_columns(&crop, src_w, dst_w);

    for (dy, out) in dst
        .chunks_exact_mut(dst_w as usize * BYTES_PER_PIXEL)
        .enumerate()
    {
        let sy = sample(crop.y0, crop.height, dy as u32, dst_h, src_h);
        let row = &src[sy as usize * src_stride..(sy as usize + 1) * src_stride];
        for (px, &sx) in out.chunks_exact_mut(BYTES_PER_PIXEL).zip(&columns) {
            let i = sx as usize * BYTES_PER_PIXEL;
            px.copy_from_slice(&row[i..i + BYTES_PER_PIXEL]);
        }
    }

    CanonicalFrame::new(dst_w, dst_h, dst)
}

/// Source column for every destination column; identical for all rows.
fn source_columns(crop: &CropRegion, src_w: u32, dst_w: u32) -> Vec<u32> {
    (0..dst_w)
        .map(|dx| sample(crop.x0, crop.width, dx, dst_w, src_w))
        .collect()
}

/// `origin + d * extent / dst` with truncating division, clamped below `limit`.
fn sample(origin: u32, extent: u32, d: u32, dst: u32, limit: u32) -> u32 {
    let rel = u64::from(d) * u64::from(extent) / u64::from(dst);
    (u64::from(origin) + rel).min(u64::from(limit) - 1) as u32
}
