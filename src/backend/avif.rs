#![expect(unsafe_code, reason = "raw FFI calls into libavif")]

//! libavif adapter: encode, decode and config.
//!
//! libavif structs are only ever handled through pointers the library
//! allocates, so the `Raw*` mirrors below declare just the leading fields this
//! adapter reads or writes.

use std::ffi::{OsStr, c_int};
use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;

use libloading::Library;
use tracing::{debug, info, trace};

use super::{Backend, BackendKind, open_library, resolve};
use crate::error::LoadError;
use crate::image::RawPlane;
use crate::{Chroma, CodecError, ContainerFormat, Decoded, Dimensions, Encoded, Release, YuvImage};

/// Library opened when no override is configured.
#[cfg(target_os = "macos")]
pub const DEFAULT_LIBRARY: &str = "/opt/homebrew/lib/libavif.dylib";
#[cfg(windows)]
pub const DEFAULT_LIBRARY: &str = "avif.dll";
#[cfg(not(any(target_os = "macos", windows)))]
pub const DEFAULT_LIBRARY: &str = "libavif.so";

/// Versioned names tried after [`DEFAULT_LIBRARY`], newest ABI first. Runtime
/// packages usually ship only these, without the unversioned symlink.
#[cfg(target_os = "macos")]
pub const FALLBACK_LIBRARIES: &[&str] = &["/usr/local/lib/libavif.dylib", "libavif.16.dylib"];
#[cfg(windows)]
pub const FALLBACK_LIBRARIES: &[&str] = &["libavif.dll"];
#[cfg(not(any(target_os = "macos", windows)))]
pub const FALLBACK_LIBRARIES: &[&str] = &[
    "libavif.so.16",
    "libavif.so.15",
    "libavif.so.14",
    "libavif.so.13",
];

const AVIF_RESULT_OK: c_int = 0;

/// Sample depth of every image this adapter reads or writes.
const DEPTH: u32 = 8;
/// Thread hint applied to every encoder and decoder.
const MAX_THREADS: c_int = 2;
/// `AVIF_SPEED_FASTEST`.
const SPEED_FASTEST: c_int = 10;

#[repr(C)]
#[allow(dead_code)]
struct RawImage {
    width: u32,
    height: u32,
    depth: u32,

    yuv_format: c_int,
    yuv_range: c_int,
    yuv_chroma_sample_position: c_int,
    yuv_planes: [*mut u8; 3],
    yuv_row_bytes: [u32; 3],
    image_owns_yuv_planes: c_int,

    alpha_plane: *mut u8,
    alpha_row_bytes: u32,
    image_owns_alpha_plane: c_int,
    alpha_premultiplied: c_int,
}

#[repr(C)]
#[allow(dead_code)]
struct RawEncoder {
    codec_choice: c_int,
    max_threads: c_int,
    speed: c_int,
}

#[repr(C)]
#[allow(dead_code)]
struct RawDecoder {
    codec_choice: c_int,
    max_threads: c_int,
    requested_source: c_int,
    allow_progressive: c_int,
    allow_incremental: c_int,
    ignore_exif: c_int,
    ignore_xmp: c_int,
    image_size_limit: u32,
    image_dimension_limit: u32,
    image_count_limit: u32,
    strict_flags: u32,
    image: *mut RawImage,
}

#[repr(C)]
struct RawRwData {
    data: *mut u8,
    size: usize,
}

type ImageCreateFn = unsafe extern "C" fn(u32, u32, u32, c_int) -> *mut RawImage;
type ImageDestroyFn = unsafe extern "C" fn(*mut RawImage);
type EncoderCreateFn = unsafe extern "C" fn() -> *mut RawEncoder;
type EncoderWriteFn =
    unsafe extern "C" fn(*mut RawEncoder, *const RawImage, *mut RawRwData) -> c_int;
type EncoderDestroyFn = unsafe extern "C" fn(*mut RawEncoder);
type RwDataFreeFn = unsafe extern "C" fn(*mut RawRwData);
type DecoderCreateFn = unsafe extern "C" fn() -> *mut RawDecoder;
type DecoderDestroyFn = unsafe extern "C" fn(*mut RawDecoder);
type DecoderSetIoMemoryFn = unsafe extern "C" fn(*mut RawDecoder, *const u8, usize) -> c_int;
type DecoderParseFn = unsafe extern "C" fn(*mut RawDecoder) -> c_int;
type DecoderNextImageFn = unsafe extern "C" fn(*mut RawDecoder) -> c_int;

/// A loaded libavif with its full entry-point table.
pub struct AvifBackend {
    path: String,
    image_create: ImageCreateFn,
    encoder_create: EncoderCreateFn,
    encoder_write: EncoderWriteFn,
    encoder_destroy: EncoderDestroyFn,
    image_destroy: ImageDestroyFn,
    rw_data_free: RwDataFreeFn,
    decoder_destroy: DecoderDestroyFn,
    decoder_set_io_memory: DecoderSetIoMemoryFn,
    decoder_parse: DecoderParseFn,
    decoder_next_image: DecoderNextImageFn,
    decoder_create: DecoderCreateFn,
    _library: Library,
}

impl fmt::Debug for AvifBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AvifBackend")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl AvifBackend {
    /// Open libavif at `path` and resolve every entry point this adapter uses.
    ///
    /// Fails on the first missing symbol; a partially resolved library is
    /// never returned.
    pub fn open(path: impl AsRef<OsStr>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let lib = open_library(path)?;

        // SAFETY: each type alias matches the libavif prototype of the symbol.
        let backend = unsafe {
            AvifBackend {
                image_create: resolve(&lib, path, "avifImageCreate")?,
                encoder_create: resolve(&lib, path, "avifEncoderCreate")?,
                encoder_write: resolve(&lib, path, "avifEncoderWrite")?,
                encoder_destroy: resolve(&lib, path, "avifEncoderDestroy")?,
                image_destroy: resolve(&lib, path, "avifImageDestroy")?,
                rw_data_free: resolve(&lib, path, "avifRWDataFree")?,
                decoder_destroy: resolve(&lib, path, "avifDecoderDestroy")?,
                decoder_set_io_memory: resolve(&lib, path, "avifDecoderSetIOMemory")?,
                decoder_parse: resolve(&lib, path, "avifDecoderParse")?,
                decoder_next_image: resolve(&lib, path, "avifDecoderNextImage")?,
                decoder_create: resolve(&lib, path, "avifDecoderCreate")?,
                path: path.to_string_lossy().into_owned(),
                _library: lib,
            }
        };

        info!("loaded libavif from {}", backend.path);
        Ok(backend)
    }

    /// Path the library was opened from.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Encode a single 8-bit frame.
    ///
    /// The planes are handed to libavif by reference and only read during
    /// this call. Thread count and speed are fixed.
    pub fn encode(&self, image: &YuvImage<'_>) -> Result<Encoded<'_>, CodecError> {
        let mut planes = [(&[] as &[u8], 0u32); 3];
        for (slot, plane) in planes.iter_mut().zip(image.planes()) {
            let stride = u32::try_from(plane.stride()).map_err(|_| {
                CodecError::InvalidInput(format!("stride {} out of range", plane.stride()))
            })?;
            *slot = (plane.buf(), stride);
        }
        self.write(image.width(), image.height(), DEPTH, image.format().raw(), planes)
    }

    /// Encode caller-owned planes described by libavif's own depth and
    /// `avifPixelFormat` values. Each plane is a buffer and its row bytes.
    fn write(
        &self,
        width: u32,
        height: u32,
        depth: u32,
        yuv_format: c_int,
        planes: [(&[u8], u32); 3],
    ) -> Result<Encoded<'_>, CodecError> {
        let frame = ImageGuard::create(self, width, height, depth, yuv_format);
        let encoder = EncoderGuard::create(self);
        let (Some(frame), Some(encoder)) = (frame, encoder) else {
            return Err(CodecError::Create("failed to create encoder"));
        };

        // SAFETY: both objects are live and exclusively ours. The frame does
        // not own the caller's planes, so destroying it leaves them alone.
        let (raw, enc) = unsafe { (&mut *frame.as_ptr(), &mut *encoder.as_ptr()) };
        for (i, (buf, row_bytes)) in planes.into_iter().enumerate() {
            raw.yuv_planes[i] = buf.as_ptr().cast_mut();
            raw.yuv_row_bytes[i] = row_bytes;
        }
        raw.image_owns_yuv_planes = 0;
        enc.max_threads = MAX_THREADS;
        enc.speed = SPEED_FASTEST;

        let mut output = AvifData::empty(self);
        // SAFETY: encoder, frame and output are valid; the planes outlive the call.
        let result =
            unsafe { (self.encoder_write)(encoder.as_ptr(), frame.as_ptr(), output.as_mut_ptr()) };
        if result != AVIF_RESULT_OK {
            debug!(result, "avifEncoderWrite failed");
            return Err(CodecError::Encode);
        }

        drop(encoder);
        drop(frame);
        Ok(Encoded::new(output))
    }

    /// Create a decoder over `data` and parse the container.
    fn parse<'a>(&'a self, data: &'a [u8]) -> Result<AvifDecoder<'a>, CodecError> {
        let decoder =
            AvifDecoder::create(self).ok_or(CodecError::Create("failed to create decoder"))?;

        // SAFETY: the decoder is live; `data` outlives it through `'a`.
        unsafe {
            (*decoder.as_ptr()).max_threads = MAX_THREADS;
            let result = (self.decoder_set_io_memory)(decoder.as_ptr(), data.as_ptr(), data.len());
            if result != AVIF_RESULT_OK {
                debug!(result, "avifDecoderSetIOMemory failed");
                return Err(CodecError::Parse("failed to set memory"));
            }
            let result = (self.decoder_parse)(decoder.as_ptr());
            if result != AVIF_RESULT_OK {
                debug!(result, "avifDecoderParse failed");
                return Err(CodecError::Parse("failed to decode"));
            }
        }

        Ok(decoder)
    }
}

impl Backend for AvifBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Avif
    }

    fn decode<'a>(&'a self, data: &'a [u8]) -> Result<Decoded<'a>, CodecError> {
        let decoder = self.parse(data)?;

        // SAFETY: the decoder is live and parsed.
        let result = unsafe { (self.decoder_next_image)(decoder.as_ptr()) };
        if result != AVIF_RESULT_OK {
            debug!(result, "avifDecoderNextImage failed");
            return Err(CodecError::Decode("failed to decode"));
        }

        let frame = decoder.frame().ok_or(CodecError::Decode("failed to decode"))?;
        if frame.depth != DEPTH {
            return Err(CodecError::UnsupportedDepth(frame.depth));
        }
        let format = Chroma::from_raw(frame.yuv_format)
            .ok_or(CodecError::UnsupportedChroma(frame.yuv_format))?;
        let (width, height) = (frame.width, frame.height);
        let planes = frame_planes(frame, format).ok_or(CodecError::Decode("failed to decode"))?;

        Ok(Decoded::new(
            ContainerFormat::Avif,
            width,
            height,
            format,
            planes,
            Release::Decoder(decoder),
        ))
    }

    fn config(&self, data: &[u8]) -> Result<Dimensions, CodecError> {
        let decoder = self.parse(data)?;
        let frame = decoder.frame().ok_or(CodecError::Parse("failed to decode"))?;
        Ok(Dimensions {
            width: frame.width,
            height: frame.height,
        })
    }
}

fn frame_planes(frame: &RawImage, format: Chroma) -> Option<[RawPlane; 3]> {
    let (cw, ch) = format.chroma_size(frame.width, frame.height);
    let sizes = [(frame.width, frame.height), (cw, ch), (cw, ch)];
    let [y, u, v] = [0, 1, 2].map(|i| {
        RawPlane::new(
            frame.yuv_planes[i],
            frame.yuv_row_bytes[i] as usize,
            sizes[i].0,
            sizes[i].1,
        )
    });
    Some([y?, u?, v?])
}

/// A libavif decoder together with its current frame.
///
/// Destroying the decoder frees the frame and its planes.
#[derive(Debug)]
pub struct AvifDecoder<'a> {
    backend: &'a AvifBackend,
    raw: NonNull<RawDecoder>,
    _input: PhantomData<&'a [u8]>,
}

// SAFETY: a libavif decoder is not bound to the thread that created it. After
// decoding it is only read through plane views and destroyed on drop.
unsafe impl Send for AvifDecoder<'_> {}

impl<'a> AvifDecoder<'a> {
    fn create(backend: &'a AvifBackend) -> Option<Self> {
        // SAFETY: avifDecoderCreate has no preconditions.
        let raw = NonNull::new(unsafe { (backend.decoder_create)() })?;
        Some(Self {
            backend,
            raw,
            _input: PhantomData,
        })
    }

    fn as_ptr(&self) -> *mut RawDecoder {
        self.raw.as_ptr()
    }

    fn frame(&self) -> Option<&RawImage> {
        // SAFETY: `image` is either null or owned by the live decoder.
        unsafe { (*self.raw.as_ptr()).image.as_ref() }
    }
}

impl Drop for AvifDecoder<'_> {
    fn drop(&mut self) {
        trace!("avifDecoderDestroy");
        // SAFETY: we own the decoder and destroy it exactly once.
        unsafe { (self.backend.decoder_destroy)(self.raw.as_ptr()) }
    }
}

/// Output bytes allocated by libavif's encoder.
#[derive(Debug)]
pub struct AvifData<'a> {
    backend: &'a AvifBackend,
    raw: RawRwData,
}

impl fmt::Debug for RawRwData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawRwData").field("size", &self.size).finish()
    }
}

// SAFETY: the buffer is plain heap memory owned exclusively by this value.
unsafe impl Send for AvifData<'_> {}
unsafe impl Sync for AvifData<'_> {}

impl<'a> AvifData<'a> {
    fn empty(backend: &'a AvifBackend) -> Self {
        Self {
            backend,
            raw: RawRwData {
                data: std::ptr::null_mut(),
                size: 0,
            },
        }
    }

    fn as_mut_ptr(&mut self) -> *mut RawRwData {
        &mut self.raw
    }

    pub fn as_bytes(&self) -> &[u8] {
        if self.raw.data.is_null() {
            return &[];
        }
        // SAFETY: libavif wrote `size` initialized bytes at `data`, which we own.
        unsafe { std::slice::from_raw_parts(self.raw.data, self.raw.size) }
    }
}

impl Drop for AvifData<'_> {
    fn drop(&mut self) {
        trace!(size = self.raw.size, "avifRWDataFree");
        // SAFETY: avifRWDataFree accepts empty and filled buffers alike.
        unsafe { (self.backend.rw_data_free)(&mut self.raw) }
    }
}

/// Call-scoped frame for encoding.
struct ImageGuard<'a> {
    backend: &'a AvifBackend,
    raw: NonNull<RawImage>,
}

impl<'a> ImageGuard<'a> {
    fn create(
        backend: &'a AvifBackend,
        width: u32,
        height: u32,
        depth: u32,
        yuv_format: c_int,
    ) -> Option<Self> {
        // SAFETY: avifImageCreate only records the parameters.
        let raw = unsafe { (backend.image_create)(width, height, depth, yuv_format) };
        NonNull::new(raw).map(|raw| Self { backend, raw })
    }

    fn as_ptr(&self) -> *mut RawImage {
        self.raw.as_ptr()
    }
}

impl Drop for ImageGuard<'_> {
    fn drop(&mut self) {
        // SAFETY: created by avifImageCreate, destroyed once.
        unsafe { (self.backend.image_destroy)(self.raw.as_ptr()) }
    }
}

/// Call-scoped encoder.
struct EncoderGuard<'a> {
    backend: &'a AvifBackend,
    raw: NonNull<RawEncoder>,
}

impl<'a> EncoderGuard<'a> {
    fn create(backend: &'a AvifBackend) -> Option<Self> {
        // SAFETY: avifEncoderCreate has no preconditions.
        let raw = unsafe { (backend.encoder_create)() };
        NonNull::new(raw).map(|raw| Self { backend, raw })
    }

    fn as_ptr(&self) -> *mut RawEncoder {
        self.raw.as_ptr()
    }
}

impl Drop for EncoderGuard<'_> {
    fn drop(&mut self) {
        // SAFETY: created by avifEncoderCreate, destroyed once.
        unsafe { (self.backend.encoder_destroy)(self.raw.as_ptr()) }
    }
}
