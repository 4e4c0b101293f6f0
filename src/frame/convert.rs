//! Pixel format normalisation.
//!
//! Maps every supported raw encoding into the canonical packed Y/Cb/Cr
//! layout with exact byte-level rules. Planes are validated up front, so the
//! per-pixel loops only ever slice inside checked row windows.

use crate::camera::types::{Plane, PixelFormat, RawFrame};
use crate::frame::canonical::{canonical_len, CanonicalFrame, BYTES_PER_PIXEL};
use crate::frame::error::FrameError;

/// Result of normalising one raw frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub frame: CanonicalFrame,
    /// Set when the source format had no mapping and the frame was replaced
    /// by neutral fill.
    pub unsupported: Option<PixelFormat>,
}

/// Convert a raw frame into a [`CanonicalFrame`] of the same size.
///
/// Unknown formats are not an error: they produce a neutral-fill frame and
/// report the format in [`Normalized::unsupported`]. Buffers too short for
/// the declared geometry fail instead of being read out of bounds.
pub fn normalize(raw: &RawFrame<'_>) -> Result<Normalized, FrameError> {
    let (width, height) = (raw.width, raw.height);
    if width == 0 || height == 0 {
        return Err(FrameError::ZeroDimension { width, height });
    }

    let expected = raw.format.plane_count();
    if raw.planes.len() < expected {
        return Err(FrameError::MissingPlane {
            format: raw.format,
            expected,
            actual: raw.planes.len(),
        });
    }

    let w = width as usize;
    let h = height as usize;
    let mut dst = vec![0u8; canonical_len(width, height)?];

    match raw.format {
        PixelFormat::Nv12 => nv12_to_canonical(&raw.planes[0], &raw.planes[1], w, h, &mut dst)?,
        PixelFormat::Yuyv => {
            packed_422_to_canonical(&raw.planes[0], w, h, PackedOrder::LUMA_FIRST, &mut dst)?
        }
        PixelFormat::Uyvy => {
            packed_422_to_canonical(&raw.planes[0], w, h, PackedOrder::CHROMA_FIRST, &mut dst)?
        }
        PixelFormat::Yuv24 => yuv24_to_canonical(&raw.planes[0], w, h, &mut dst)?,
        PixelFormat::Yuv444Planar => {
            planar_444_to_canonical(&raw.planes[..3], w, h, &mut dst)?
        }
        PixelFormat::Rgb24 => color_to_canonical(&raw.planes[0], w, h, ColorLayout::RGB, &mut dst)?,
        PixelFormat::Bgr24 => color_to_canonical(&raw.planes[0], w, h, ColorLayout::BGR, &mut dst)?,
        PixelFormat::Bgra32 => {
            color_to_canonical(&raw.planes[0], w, h, ColorLayout::BGRA, &mut dst)?
        }
        PixelFormat::Unknown(_) => {
            return Ok(Normalized {
                frame: CanonicalFrame::neutral(width, height)?,
                unsupported: Some(raw.format),
            });
        }
    }

    Ok(Normalized {
        frame: CanonicalFrame::new(width, height, dst)?,
        unsupported: None,
    })
}

/// Fixed-point BT.601 RGB to limited-range YCbCr.
///
/// `>>` on `i32` is an arithmetic shift, so negative intermediates round
/// towards negative infinity before the offset is added.
pub fn rgb_to_ycbcr(r: u8, g: u8, b: u8) -> [u8; 3] {
    let (r, g, b) = (i32::from(r), i32::from(g), i32::from(b));
    let y = ((66 * r + 129 * g + 25 * b + 128) >> 8) + 16;
    let cb = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
    let cr = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;
    [clamp_byte(y), clamp_byte(cb), clamp_byte(cr)]
}

fn clamp_byte(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// Validated window over the rows of one plane.
struct Rows<'a> {
    data: &'a [u8],
    stride: usize,
    row_bytes: usize,
}

impl<'a> Rows<'a> {
    /// Check that `rows` rows of `row_bytes` each are addressable with the
    /// plane's stride (zero stride means tightly packed).
    fn new(plane: &Plane<'a>, index: usize, row_bytes: usize, rows: usize) -> Result<Self, FrameError> {
        let stride = if plane.stride == 0 {
            row_bytes
        } else {
            plane.stride
        };
        if stride < row_bytes {
            return Err(FrameError::StrideTooSmall {
                plane: index,
                stride,
                row_bytes,
            });
        }

        let available = plane.data.len();
        let needed = match rows.checked_sub(1) {
            None => 0,
            // An extent past usize::MAX can never be backed by a buffer.
            Some(last) => last
                .checked_mul(stride)
                .and_then(|start| start.checked_add(row_bytes))
                .ok_or(FrameError::Undersized {
                    plane: index,
                    needed: usize::MAX,
                    available,
                })?,
        };
        if available < needed {
            return Err(FrameError::Undersized {
                plane: index,
                needed,
                available,
            });
        }

        Ok(Self {
            data: plane.data,
            stride,
            row_bytes,
        })
    }

    fn row(&self, r: usize) -> &'a [u8] {
        let start = r * self.stride;
        &self.data[start..start + self.row_bytes]
    }
}

fn dst_rows(dst: &mut [u8], width: usize) -> std::slice::ChunksExactMut<'_, u8> {
    dst.chunks_exact_mut(width * BYTES_PER_PIXEL)
}

/// Biplanar 4:2:0. Chroma for `(row, col)` sits at
/// `(row / 2) * stride + (col / 2) * 2` as Cb then Cr.
fn nv12_to_canonical(
    luma: &Plane<'_>,
    chroma: &Plane<'_>,
    width: usize,
    height: usize,
    dst: &mut [u8],
) -> Result<(), FrameError> {
    let chroma_cols = width.div_ceil(2);
    let luma = Rows::new(luma, 0, width, height)?;
    let chroma = Rows::new(chroma, 1, chroma_cols * 2, height.div_ceil(2))?;

    for (row, out) in dst_rows(dst, width).enumerate() {
        let y_row = luma.row(row);
        let c_row = chroma.row(row / 2);
        for (col, px) in out.chunks_exact_mut(BYTES_PER_PIXEL).enumerate() {
            let c = (col / 2) * 2;
            px[0] = y_row[col];
            px[1] = c_row[c];
            px[2] = c_row[c + 1];
        }
    }
    Ok(())
}

/// Byte positions inside a 4-byte 4:2:2 group.
#[derive(Clone, Copy)]
struct PackedOrder {
    y0: usize,
    u: usize,
    y1: usize,
    v: usize,
}

impl PackedOrder {
    const LUMA_FIRST: Self = Self {
        y0: 0,
        u: 1,
        y1: 2,
        v: 3,
    };
    const CHROMA_FIRST: Self = Self {
        u: 0,
        y0: 1,
        v: 2,
        y1: 3,
    };
}

/// Packed 4:2:2. Even columns take the first luma of their group, odd
/// columns the second; both share the group's chroma.
fn packed_422_to_canonical(
    plane: &Plane<'_>,
    width: usize,
    height: usize,
    order: PackedOrder,
    dst: &mut [u8],
) -> Result<(), FrameError> {
    let rows = Rows::new(plane, 0, width.div_ceil(2) * 4, height)?;

    for (row, out) in dst_rows(dst, width).enumerate() {
        let src = rows.row(row);
        for (col, px) in out.chunks_exact_mut(BYTES_PER_PIXEL).enumerate() {
            let group = &src[(col / 2) * 4..(col / 2) * 4 + 4];
            px[0] = if col % 2 == 0 {
                group[order.y0]
            } else {
                group[order.y1]
            };
            px[1] = group[order.u];
            px[2] = group[order.v];
        }
    }
    Ok(())
}

/// Packed 4:4:4 is already canonical apart from row padding.
fn yuv24_to_canonical(
    plane: &Plane<'_>,
    width: usize,
    height: usize,
    dst: &mut [u8],
) -> Result<(), FrameError> {
    let rows = Rows::new(plane, 0, width * BYTES_PER_PIXEL, height)?;
    for (row, out) in dst_rows(dst, width).enumerate() {
        out.copy_from_slice(rows.row(row));
    }
    Ok(())
}

fn planar_444_to_canonical(
    planes: &[Plane<'_>],
    width: usize,
    height: usize,
    dst: &mut [u8],
) -> Result<(), FrameError> {
    let y = Rows::new(&planes[0], 0, width, height)?;
    let cb = Rows::new(&planes[1], 1, width, height)?;
    let cr = Rows::new(&planes[2], 2, width, height)?;

    for (row, out) in dst_rows(dst, width).enumerate() {
        let (y_row, cb_row, cr_row) = (y.row(row), cb.row(row), cr.row(row));
        for (col, px) in out.chunks_exact_mut(BYTES_PER_PIXEL).enumerate() {
            px[0] = y_row[col];
            px[1] = cb_row[col];
            px[2] = cr_row[col];
        }
    }
    Ok(())
}

/// Channel positions for packed colour formats.
#[derive(Clone, Copy)]
struct ColorLayout {
    bytes_per_pixel: usize,
    r: usize,
    g: usize,
    b: usize,
}

impl ColorLayout {
    const RGB: Self = Self {
        bytes_per_pixel: 3,
        r: 0,
        g: 1,
        b: 2,
    };
    const BGR: Self = Self {
        bytes_per_pixel: 3,
        r: 2,
        g: 1,
        b: 0,
    };
    const BGRA: Self = Self {
        bytes_per_pixel: 4,
        r: 2,
        g: 1,
        b: 0,
    };
}

fn color_to_canonical(
    plane: &Plane<'_>,
    width: usize,
    height: usize,
    layout: ColorLayout,
    dst: &mut [u8],
) -> Result<(), FrameError> {
    let rows = Rows::new(plane, 0, width * layout.bytes_per_pixel, height)?;

    for (row, out) in dst_rows(dst, width).enumerate() {
        let src = rows.row(row).chunks_exact(layout.bytes_per_pixel);
        for (px, s) in out.chunks_exact_mut(BYTES_PER_PIXEL).zip(src) {
            px.copy_from_slice(&rgb_to_ycbcr(s[layout.r], s[layout.g], s[layout.b]));
        }
    }
    Ok(())
}
