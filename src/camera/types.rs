use serde::Serialize;
use std::fmt;

/// Pack a four-character code the way V4L2 and Media Foundation do
/// (first character in the least significant byte).
pub const fn fourcc(code: &[u8; 4]) -> u32 {
    u32::from_le_bytes(*code)
}

/// Pixel encodings a capture backend can declare.
///
/// Every known variant has an exact byte-level mapping into the canonical
/// Y/Cb/Cr triplet layout. Anything else is carried as `Unknown` with its
/// raw FourCC so it can be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// Biplanar 4:2:0: full-resolution luma plane, then an interleaved Cb/Cr
    /// plane subsampled 2x2.
    Nv12,
    /// Packed 4:2:2, luma first: `[Y0, U, Y1, V]` per pixel pair.
    Yuyv,
    /// Packed 4:2:2, chroma first: `[U, Y0, V, Y1]` per pixel pair.
    Uyvy,
    /// Packed 4:4:4: `[Y, Cb, Cr]` per pixel in a single plane.
    Yuv24,
    /// Triplanar 4:4:4: separate Y, Cb and Cr planes, each with its own stride.
    Yuv444Planar,
    /// 24-bit colour, bytes R, G, B.
    Rgb24,
    /// 24-bit colour, bytes B, G, R.
    Bgr24,
    /// 32-bit colour, bytes B, G, R, A. Alpha is ignored.
    Bgra32,
    /// Encoding with no mapping (compressed streams, exotic layouts).
    Unknown(u32),
}

impl PixelFormat {
    /// Resolve a FourCC into a format tag.
    pub fn from_fourcc(code: u32) -> Self {
        const NV12: u32 = fourcc(b"NV12");
        const YUYV: u32 = fourcc(b"YUYV");
        const YUY2: u32 = fourcc(b"YUY2");
        const UYVY: u32 = fourcc(b"UYVY");
        const YUV3: u32 = fourcc(b"YUV3");
        const YM24: u32 = fourcc(b"YM24");
        const RGB3: u32 = fourcc(b"RGB3");
        const BGR3: u32 = fourcc(b"BGR3");
        const BGRA: u32 = fourcc(b"BGRA");

        match code {
            NV12 => Self::Nv12,
            YUYV | YUY2 => Self::Yuyv,
            UYVY => Self::Uyvy,
            YUV3 => Self::Yuv24,
            YM24 => Self::Yuv444Planar,
            RGB3 => Self::Rgb24,
            BGR3 => Self::Bgr24,
            BGRA => Self::Bgra32,
            other => Self::Unknown(other),
        }
    }

    /// FourCC for this format.
    pub fn fourcc(self) -> u32 {
        match self {
            Self::Nv12 => fourcc(b"NV12"),
            Self::Yuyv => fourcc(b"YUYV"),
            Self::Uyvy => fourcc(b"UYVY"),
            Self::Yuv24 => fourcc(b"YUV3"),
            Self::Yuv444Planar => fourcc(b"YM24"),
            Self::Rgb24 => fourcc(b"RGB3"),
            Self::Bgr24 => fourcc(b"BGR3"),
            Self::Bgra32 => fourcc(b"BGRA"),
            Self::Unknown(code) => code,
        }
    }

    /// Number of byte planes a frame of this format carries.
    ///
    /// `Unknown` formats are never read, so they require none.
    pub fn plane_count(self) -> usize {
        match self {
            Self::Nv12 => 2,
            Self::Yuv444Planar => 3,
            Self::Unknown(_) => 0,
            _ => 1,
        }
    }

    /// Human-readable description used in stream logs.
    pub fn describe(self) -> &'static str {
        match self {
            Self::Nv12 => "NV12 (YCbCr 4:2:0 biplanar)",
            Self::Yuyv => "YUYV (YCbCr 4:2:2)",
            Self::Uyvy => "UYVY (YCbCr 4:2:2)",
            Self::Yuv24 => "YUV24 (YCbCr 4:4:4 packed)",
            Self::Yuv444Planar => "YUV444 (YCbCr 4:4:4 planar)",
            Self::Rgb24 => "RGB24",
            Self::Bgr24 => "BGR24",
            Self::Bgra32 => "BGRA32",
            Self::Unknown(_) => "unknown",
        }
    }

    pub fn is_known(self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = self.fourcc().to_le_bytes();
        let printable = code.iter().all(|b| b.is_ascii_graphic() || *b == b' ');
        if printable {
            write!(f, "{}", String::from_utf8_lossy(&code))
        } else {
            write!(f, "0x{:08x}", self.fourcc())
        }
    }
}

/// Stream layout declared by a backend when it opens the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamFormat {
    pub pixel_format: PixelFormat,
    pub width: u32,
    pub height: u32,
    /// Row stride of each plane in bytes. Zero means tightly packed rows.
    pub strides: Vec<usize>,
}

impl StreamFormat {
    pub fn new(pixel_format: PixelFormat, width: u32, height: u32) -> Self {
        Self {
            pixel_format,
            width,
            height,
            strides: vec![0; pixel_format.plane_count()],
        }
    }

    pub fn with_strides(mut self, strides: Vec<usize>) -> Self {
        self.strides = strides;
        self
    }
}

/// One byte plane of a raw frame, borrowed from the backend.
#[derive(Debug, Clone, Copy)]
pub struct Plane<'a> {
    pub data: &'a [u8],
    /// Bytes between the starts of consecutive rows. Zero means tight rows.
    pub stride: usize,
}

impl<'a> Plane<'a> {
    pub fn new(data: &'a [u8], stride: usize) -> Self {
        Self { data, stride }
    }
}

/// A frame exactly as the backend produced it.
///
/// The view borrows backend memory and is only valid for the duration of
/// the fetch call that produced it; the pipeline copies everything it
/// needs before the borrow ends.
#[derive(Debug, Clone)]
pub struct RawFrame<'a> {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub planes: Vec<Plane<'a>>,
}

impl<'a> RawFrame<'a> {
    pub fn new(format: PixelFormat, width: u32, height: u32, planes: Vec<Plane<'a>>) -> Self {
        Self {
            format,
            width,
            height,
            planes,
        }
    }

    /// Single-plane frame with tightly packed rows.
    pub fn packed(format: PixelFormat, width: u32, height: u32, data: &'a [u8]) -> Self {
        Self::new(format, width, height, vec![Plane::new(data, 0)])
    }

    /// Split a contiguous NV12 buffer (luma rows followed by chroma rows,
    /// both sharing `stride`) into its two planes.
    ///
    /// If the buffer is too short to hold the luma plane the chroma plane is
    /// left empty; the normalizer reports the shortfall.
    pub fn nv12_contiguous(width: u32, height: u32, stride: usize, data: &'a [u8]) -> Self {
        let row = if stride == 0 { width as usize } else { stride };
        let split = row.saturating_mul(height as usize).min(data.len());
        let (luma, chroma) = data.split_at(split);
        Self::new(
            PixelFormat::Nv12,
            width,
            height,
            vec![Plane::new(luma, stride), Plane::new(chroma, stride)],
        )
    }

    /// Total bytes across all planes.
    pub fn byte_len(&self) -> usize {
        self.planes.iter().map(|p| p.data.len()).sum()
    }
}

/// Owned counterpart of [`Plane`], used where a frame must outlive the
/// callback that delivered it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedPlane {
    pub data: Vec<u8>,
    pub stride: usize,
}

/// Owned counterpart of [`RawFrame`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedRawFrame {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub planes: Vec<OwnedPlane>,
}

impl OwnedRawFrame {
    /// Deep-copy a borrowed frame.
    pub fn copy_from(raw: &RawFrame<'_>) -> Self {
        Self {
            format: raw.format,
            width: raw.width,
            height: raw.height,
            planes: raw
                .planes
                .iter()
                .map(|p| OwnedPlane {
                    data: p.data.to_vec(),
                    stride: p.stride,
                })
                .collect(),
        }
    }

    /// Borrow as a [`RawFrame`] view.
    pub fn as_raw(&self) -> RawFrame<'_> {
        RawFrame {
            format: self.format,
            width: self.width,
            height: self.height,
            planes: self
                .planes
                .iter()
                .map(|p| Plane::new(&p.data, p.stride))
                .collect(),
        }
    }
}
