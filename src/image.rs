#![expect(unsafe_code, reason = "plane views over backend-owned memory")]

//! Planar 8-bit YUV image views.
//!
//! [`YuvImage`] is shared by both directions: it is what [`encode`](crate::encode)
//! reads from and what a [`Decoded`](crate::Decoded) hands out. Plane buffers
//! are never copied by this crate.

use core::ptr::NonNull;

use imgref::ImgRef;

use crate::{CodecError, Release};

/// Chroma subsampling. The discriminants are libavif's pixel format codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Chroma {
    /// Full-resolution chroma.
    Yuv444 = 1,
    /// Chroma halved in both directions.
    Yuv420 = 3,
}

impl Chroma {
    /// Map a libavif pixel format code.
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            1 => Some(Chroma::Yuv444),
            3 => Some(Chroma::Yuv420),
            _ => None,
        }
    }

    /// The libavif pixel format code.
    pub fn raw(self) -> i32 {
        self as i32
    }

    /// Dimensions of the U and V planes for a `width` x `height` image.
    pub fn chroma_size(self, width: u32, height: u32) -> (u32, u32) {
        match self {
            Chroma::Yuv444 => (width, height),
            Chroma::Yuv420 => (width.div_ceil(2), height.div_ceil(2)),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Chroma::Yuv444 => "4:4:4",
            Chroma::Yuv420 => "4:2:0",
        }
    }
}

impl core::fmt::Display for Chroma {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Image dimensions, as returned by [`config`](crate::config).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Three borrowed 8-bit planes (Y, U, V) plus their chroma layout.
#[derive(Clone, Debug)]
pub struct YuvImage<'a> {
    format: Chroma,
    planes: [ImgRef<'a, u8>; 3],
}

impl<'a> YuvImage<'a> {
    /// Build from prepared plane views.
    ///
    /// The luma plane sets the image size; both chroma planes must match
    /// [`Chroma::chroma_size`] for it.
    pub fn new(
        format: Chroma,
        y: ImgRef<'a, u8>,
        u: ImgRef<'a, u8>,
        v: ImgRef<'a, u8>,
    ) -> Result<Self, CodecError> {
        let (width, height) = (y.width(), y.height());
        if width == 0 || height == 0 {
            return Err(CodecError::InvalidInput(format!(
                "image dimensions must be positive, got {width}x{height}"
            )));
        }
        let width = u32::try_from(width)
            .map_err(|_| CodecError::InvalidInput(format!("width {width} out of range")))?;
        let height = u32::try_from(height)
            .map_err(|_| CodecError::InvalidInput(format!("height {height} out of range")))?;

        let (cw, ch) = format.chroma_size(width, height);
        for (name, plane) in [("U", &u), ("V", &v)] {
            if plane.width() != cw as usize || plane.height() != ch as usize {
                return Err(CodecError::InvalidInput(format!(
                    "{name} plane is {}x{}, {format} needs {cw}x{ch}",
                    plane.width(),
                    plane.height()
                )));
            }
        }

        Ok(Self {
            format,
            planes: [y, u, v],
        })
    }

    /// Build from raw plane slices and row strides in bytes.
    ///
    /// Each slice must hold `stride * (rows - 1) + row_width` bytes or more.
    pub fn from_planes(
        width: u32,
        height: u32,
        format: Chroma,
        planes: [&'a [u8]; 3],
        strides: [usize; 3],
    ) -> Result<Self, CodecError> {
        if width == 0 || height == 0 {
            return Err(CodecError::InvalidInput(format!(
                "image dimensions must be positive, got {width}x{height}"
            )));
        }
        let (cw, ch) = format.chroma_size(width, height);
        let sizes = [(width, height), (cw, ch), (cw, ch)];

        let [y, u, v] = [0, 1, 2].map(|i| plane_view(i, planes[i], sizes[i], strides[i]));
        Self::new(format, y?, u?, v?)
    }

    /// Views over decoded backend planes, borrowed for as long as `owner`.
    pub(crate) fn from_backend(
        format: Chroma,
        planes: &'a [RawPlane; 3],
        _owner: &'a Release<'_>,
    ) -> Self {
        // SAFETY: `owner` holds the backend object that allocated the planes
        // and is borrowed for `'a`, so the memory stays alive and unmodified.
        let planes = planes.map(|p| unsafe { p.view() });
        Self { format, planes }
    }

    pub fn width(&self) -> u32 {
        self.planes[0].width() as u32
    }

    pub fn height(&self) -> u32 {
        self.planes[0].height() as u32
    }

    pub fn format(&self) -> Chroma {
        self.format
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width(),
            height: self.height(),
        }
    }

    /// Y, U and V planes, in that order.
    pub fn planes(&self) -> &[ImgRef<'a, u8>; 3] {
        &self.planes
    }

    pub fn y(&self) -> ImgRef<'a, u8> {
        self.planes[0]
    }

    pub fn u(&self) -> ImgRef<'a, u8> {
        self.planes[1]
    }

    pub fn v(&self) -> ImgRef<'a, u8> {
        self.planes[2]
    }
}

const PLANE_NAMES: [&str; 3] = ["Y", "U", "V"];

fn plane_view<'a>(
    index: usize,
    buf: &'a [u8],
    (width, height): (u32, u32),
    stride: usize,
) -> Result<ImgRef<'a, u8>, CodecError> {
    let name = PLANE_NAMES[index];
    let (width, height) = (width as usize, height as usize);
    if stride < width {
        return Err(CodecError::InvalidInput(format!(
            "{name} stride {stride} is smaller than row width {width}"
        )));
    }
    let needed = stride
        .checked_mul(height - 1)
        .and_then(|n| n.checked_add(width))
        .ok_or_else(|| CodecError::InvalidInput(format!("{name} plane size overflows")))?;
    if buf.len() < needed {
        return Err(CodecError::InvalidInput(format!(
            "{name} plane has {} bytes, needs {needed}",
            buf.len()
        )));
    }
    Ok(ImgRef::new_stride(buf, width, height, stride))
}

/// A plane pointer handed out by a backend, validated once at decode time.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RawPlane {
    ptr: NonNull<u8>,
    width: usize,
    height: usize,
    stride: usize,
}

// SAFETY: the pointer is only read through `view`, whose caller keeps the
// owning backend object alive. Backend frames are not tied to a thread.
unsafe impl Send for RawPlane {}
unsafe impl Sync for RawPlane {}

impl RawPlane {
    /// Returns `None` for a null pointer, an empty plane, or a stride shorter
    /// than a row.
    pub(crate) fn new(ptr: *const u8, stride: usize, width: u32, height: u32) -> Option<Self> {
        let ptr = NonNull::new(ptr.cast_mut())?;
        let (width, height) = (width as usize, height as usize);
        if width == 0 || height == 0 || stride < width {
            return None;
        }
        Some(Self {
            ptr,
            width,
            height,
            stride,
        })
    }

    /// # Safety
    ///
    /// The backend object that owns this memory must stay alive, and must not
    /// write to the plane, for `'a`.
    pub(crate) unsafe fn view<'a>(&self) -> ImgRef<'a, u8> {
        let len = self.stride * (self.height - 1) + self.width;
        // SAFETY: the backend allocated at least `stride` bytes per row for
        // `height` rows; the caller guarantees liveness.
        let buf = unsafe { core::slice::from_raw_parts(self.ptr.as_ptr(), len) };
        ImgRef::new_stride(buf, self.width, self.height, self.stride)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chroma_codes() {
        assert_eq!(Chroma::from_raw(1), Some(Chroma::Yuv444));
        assert_eq!(Chroma::from_raw(3), Some(Chroma::Yuv420));
        assert_eq!(Chroma::from_raw(2), None);
        assert_eq!(Chroma::from_raw(4), None);
        assert_eq!(Chroma::Yuv420.raw(), 3);
    }

    #[test]
    fn chroma_size_rounds_up() {
        assert_eq!(Chroma::Yuv420.chroma_size(5, 3), (3, 2));
        assert_eq!(Chroma::Yuv444.chroma_size(5, 3), (5, 3));
    }

    #[test]
    fn from_planes_420() {
        let y = vec![0u8; 8 * 4];
        let u = vec![0u8; 4 * 2];
        let v = vec![0u8; 4 * 2];
        let img = YuvImage::from_planes(8, 4, Chroma::Yuv420, [&y, &u, &v], [8, 4, 4]).unwrap();
        assert_eq!(img.dimensions(), Dimensions { width: 8, height: 4 });
        assert_eq!(img.u().width(), 4);
        assert_eq!(img.format(), Chroma::Yuv420);
    }

    #[test]
    fn from_planes_padded_stride() {
        // last row may stop at the row width
        let y = vec![0u8; 16 * 3 + 10];
        let c = vec![0u8; 10 * 16];
        let img =
            YuvImage::from_planes(10, 4, Chroma::Yuv444, [&y, &c, &c], [16, 16, 16]).unwrap();
        assert_eq!(img.y().stride(), 16);
    }

    #[test]
    fn from_planes_rejects_short_plane() {
        let y = vec![0u8; 8 * 4 - 1];
        let c = vec![0u8; 8];
        let err = YuvImage::from_planes(8, 4, Chroma::Yuv420, [&y, &c, &c], [8, 4, 4]).unwrap_err();
        assert!(matches!(err, CodecError::InvalidInput(_)), "{err}");
    }

    #[test]
    fn from_planes_rejects_zero_dimensions() {
        let err = YuvImage::from_planes(0, 4, Chroma::Yuv444, [&[], &[], &[]], [0, 0, 0])
            .unwrap_err();
        assert!(matches!(err, CodecError::InvalidInput(_)));
    }

    #[test]
    fn from_planes_rejects_narrow_stride() {
        let y = vec![0u8; 64];
        let err = YuvImage::from_planes(8, 4, Chroma::Yuv444, [&y, &y, &y], [8, 4, 8]).unwrap_err();
        assert!(err.to_string().contains("U stride"), "{err}");
    }

    #[test]
    fn new_rejects_mismatched_chroma() {
        let y = vec![0u8; 16];
        let y = ImgRef::new(&y[..], 4, 4);
        let err = YuvImage::new(Chroma::Yuv420, y, y, y).unwrap_err();
        assert!(err.to_string().contains("needs 2x2"), "{err}");
    }

    #[test]
    fn raw_plane_validation() {
        let buf = [7u8; 12];
        assert!(RawPlane::new(core::ptr::null(), 4, 4, 3).is_none());
        assert!(RawPlane::new(buf.as_ptr(), 3, 4, 3).is_none());
        let plane = RawPlane::new(buf.as_ptr(), 4, 4, 3).unwrap();
        // SAFETY: `buf` outlives the view.
        let view = unsafe { plane.view() };
        assert_eq!(view.rows().count(), 3);
        assert!(view.pixels().all(|p| p == 7));
    }
}
