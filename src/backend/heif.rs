#![expect(unsafe_code, reason = "raw FFI calls into libheif")]

//! libheif adapter: decode and config. libheif is never used to encode.

use std::ffi::{CStr, OsStr, c_char, c_int, c_void};
use std::fmt;
use std::marker::PhantomData;
use std::ptr::{self, NonNull};

use libloading::Library;
use tracing::{debug, info, trace};

use super::{Backend, BackendKind, open_library, resolve, resolve_optional};
use crate::error::LoadError;
use crate::image::RawPlane;
use crate::{Chroma, CodecError, ContainerFormat, Decoded, Dimensions, Release};

/// Library opened when no override is configured.
#[cfg(target_os = "macos")]
pub const DEFAULT_LIBRARY: &str = "/opt/homebrew/lib/libheif.dylib";
#[cfg(windows)]
pub const DEFAULT_LIBRARY: &str = "heif.dll";
#[cfg(not(any(target_os = "macos", windows)))]
pub const DEFAULT_LIBRARY: &str = "libheif.so";

/// Versioned names tried after [`DEFAULT_LIBRARY`].
#[cfg(target_os = "macos")]
pub const FALLBACK_LIBRARIES: &[&str] = &["/usr/local/lib/libheif.dylib", "libheif.1.dylib"];
#[cfg(windows)]
pub const FALLBACK_LIBRARIES: &[&str] = &["libheif.dll"];
#[cfg(not(any(target_os = "macos", windows)))]
pub const FALLBACK_LIBRARIES: &[&str] = &["libheif.so.1"];

/// `heif_colorspace_undefined` / `heif_chroma_undefined`: keep the stored layout.
const KEEP_NATIVE: c_int = 99;

/// `heif_colorspace_YCbCr`.
const HEIF_COLORSPACE_YCBCR: c_int = 0;

const HEIF_CHROMA_420: c_int = 1;
const HEIF_CHROMA_444: c_int = 3;

/// `heif_channel_Y`, `heif_channel_Cb`, `heif_channel_Cr`.
const CHANNELS: [c_int; 3] = [0, 1, 2];
const CHANNEL_NAMES: [&str; 3] = ["Y", "Cb", "Cr"];

/// Layout, width, height and plane views of a decoded image.
type Frame = (Chroma, u32, u32, [RawPlane; 3]);

#[repr(C)]
struct RawError {
    code: c_int,
    subcode: c_int,
    message: *const c_char,
}

#[repr(C)]
struct RawContext {
    _opaque: [u8; 0],
}

#[repr(C)]
struct RawHandle {
    _opaque: [u8; 0],
}

#[repr(C)]
struct RawImage {
    _opaque: [u8; 0],
}

type ContextAllocFn = unsafe extern "C" fn() -> *mut RawContext;
type ContextFreeFn = unsafe extern "C" fn(*mut RawContext);
type ReadFromMemoryFn =
    unsafe extern "C" fn(*mut RawContext, *const c_void, usize, *const c_void) -> RawError;
type PrimaryHandleFn = unsafe extern "C" fn(*mut RawContext, *mut *mut RawHandle) -> RawError;
type HandleDimensionFn = unsafe extern "C" fn(*const RawHandle) -> c_int;
type DecodeImageFn =
    unsafe extern "C" fn(*const RawHandle, *mut *mut RawImage, c_int, c_int, *const c_void) -> RawError;
type ImageChromaFn = unsafe extern "C" fn(*const RawImage) -> c_int;
type ImageDimensionFn = unsafe extern "C" fn(*const RawImage) -> c_int;
type ImagePlaneFn = unsafe extern "C" fn(*const RawImage, c_int, *mut c_int) -> *const u8;
type InitFn = unsafe extern "C" fn(*const c_void) -> RawError;
type HandleReleaseFn = unsafe extern "C" fn(*const RawHandle);
type ImageReleaseFn = unsafe extern "C" fn(*const RawImage);

/// A loaded libheif with its full entry-point table.
pub struct HeifBackend {
    path: String,
    context_free: ContextFreeFn,
    read_from_memory: ReadFromMemoryFn,
    primary_handle: PrimaryHandleFn,
    handle_width: HandleDimensionFn,
    handle_height: HandleDimensionFn,
    decode_image: DecodeImageFn,
    image_chroma: ImageChromaFn,
    image_width: ImageDimensionFn,
    image_height: ImageDimensionFn,
    image_plane: ImagePlaneFn,
    context_alloc: ContextAllocFn,
    handle_release: Option<HandleReleaseFn>,
    image_release: Option<ImageReleaseFn>,
    _library: Library,
}

impl fmt::Debug for HeifBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeifBackend")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl HeifBackend {
    /// Open libheif at `path` and resolve every entry point this adapter uses.
    ///
    /// `heif_init` is called when the library exports it. The handle and
    /// image release functions are optional too; without them those objects
    /// stay with libheif.
    pub fn open(path: impl AsRef<OsStr>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let lib = open_library(path)?;

        // SAFETY: each type alias matches the libheif prototype of the symbol.
        let init = unsafe { resolve_optional::<InitFn>(&lib, "heif_init") };
        let backend = unsafe {
            HeifBackend {
                context_free: resolve(&lib, path, "heif_context_free")?,
                read_from_memory: resolve(
                    &lib,
                    path,
                    "heif_context_read_from_memory_without_copy",
                )?,
                primary_handle: resolve(&lib, path, "heif_context_get_primary_image_handle")?,
                handle_width: resolve(&lib, path, "heif_image_handle_get_width")?,
                handle_height: resolve(&lib, path, "heif_image_handle_get_height")?,
                decode_image: resolve(&lib, path, "heif_decode_image")?,
                image_chroma: resolve(&lib, path, "heif_image_get_chroma_format")?,
                image_width: resolve(&lib, path, "heif_image_get_primary_width")?,
                image_height: resolve(&lib, path, "heif_image_get_primary_height")?,
                image_plane: resolve(&lib, path, "heif_image_get_plane_readonly")?,
                context_alloc: resolve(&lib, path, "heif_context_alloc")?,
                handle_release: resolve_optional(&lib, "heif_image_handle_release"),
                image_release: resolve_optional(&lib, "heif_image_release"),
                path: path.to_string_lossy().into_owned(),
                _library: lib,
            }
        };

        if let Some(init) = init {
            // SAFETY: heif_init takes an optional parameter block; null is accepted.
            let err = unsafe { init(ptr::null()) };
            if err.code != 0 {
                debug!(code = err.code, "heif_init: {}", error_message(&err));
            }
        }

        info!("loaded libheif from {}", backend.path);
        Ok(backend)
    }

    /// Path the library was opened from.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Allocate a context over `data` and fetch the primary image handle.
    fn open_context<'a>(&'a self, data: &'a [u8]) -> Result<HeifContext<'a>, CodecError> {
        let mut context =
            HeifContext::alloc(self).ok_or(CodecError::Create("failed to create context"))?;

        // SAFETY: the context is live; `data` outlives it through `'a`.
        let err = unsafe {
            (self.read_from_memory)(
                context.as_ptr(),
                data.as_ptr().cast(),
                data.len(),
                ptr::null(),
            )
        };
        check(&err, CodecError::Parse("failed to parse"))?;

        let mut handle = ptr::null_mut();
        // SAFETY: the context holds a parsed file; `handle` is a valid out slot.
        let err = unsafe { (self.primary_handle)(context.as_ptr(), &mut handle) };
        check(&err, CodecError::Parse("failed to parse"))?;
        context.handle = Some(NonNull::new(handle).ok_or(CodecError::Parse("failed to parse"))?);

        Ok(context)
    }

    /// Decode the primary image into `context` in the requested layout.
    ///
    /// Returns `Ok(None)` when libheif produced an image without Y, Cb and Cr
    /// planes, which it does when it converts to RGB.
    fn decode_frame(
        &self,
        context: &mut HeifContext<'_>,
        handle: *const RawHandle,
        target_colorspace: c_int,
        target_chroma: c_int,
    ) -> Result<Option<Frame>, CodecError> {
        let mut image = ptr::null_mut();
        // SAFETY: `handle` belongs to the live context; `image` is a valid out slot.
        let err = unsafe {
            (self.decode_image)(handle, &mut image, target_colorspace, target_chroma, ptr::null())
        };
        check(&err, CodecError::Decode("failed to decode image"))?;
        let image = NonNull::new(image).ok_or(CodecError::Decode("failed to decode image"))?;
        context.set_image(image);
        let image = image.as_ptr().cast_const();

        // SAFETY: `image` was just decoded and is kept alive by `context`.
        let (chroma, width, height) = unsafe {
            (
                (self.image_chroma)(image),
                (self.image_width)(image),
                (self.image_height)(image),
            )
        };
        let format = chroma_from_heif(chroma).ok_or(CodecError::UnsupportedChroma(chroma))?;
        let (width, height) = positive_dimensions(width, height)
            .ok_or(CodecError::Decode("failed to decode image"))?;

        let planes = yuv_planes(format, width, height, |channel| {
            let mut stride: c_int = 0;
            // SAFETY: valid image and channel; `stride` is a valid out slot.
            let plane = unsafe { (self.image_plane)(image, channel, &mut stride) };
            (plane, stride)
        });
        Ok(planes.map(|planes| (format, width, height, planes)))
    }
}

impl Backend for HeifBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Heif
    }

    fn decode<'a>(&'a self, data: &'a [u8]) -> Result<Decoded<'a>, CodecError> {
        let mut context = self.open_context(data)?;
        let handle = context.handle().ok_or(CodecError::Parse("failed to parse"))?;

        let frame = match self.decode_frame(&mut context, handle, KEEP_NATIVE, KEEP_NATIVE)? {
            Some(frame) => frame,
            None => {
                debug!("libheif did not keep a YCbCr layout, decoding again as 4:2:0");
                self.decode_frame(&mut context, handle, HEIF_COLORSPACE_YCBCR, HEIF_CHROMA_420)?
                    .ok_or(CodecError::Decode("failed to decode image"))?
            }
        };
        let (format, width, height, planes) = frame;

        Ok(Decoded::new(
            ContainerFormat::Heic,
            width,
            height,
            format,
            planes,
            Release::Context(context),
        ))
    }

    fn config(&self, data: &[u8]) -> Result<Dimensions, CodecError> {
        let context = self.open_context(data)?;
        let handle = context.handle().ok_or(CodecError::Parse("failed to parse"))?;

        // SAFETY: `handle` belongs to the live context.
        let (width, height) = unsafe { ((self.handle_width)(handle), (self.handle_height)(handle)) };
        let (width, height) =
            positive_dimensions(width, height).ok_or(CodecError::Parse("failed to parse"))?;
        Ok(Dimensions { width, height })
    }
}

/// Map libheif's chroma enumeration onto the two supported layouts.
pub(crate) fn chroma_from_heif(chroma: c_int) -> Option<Chroma> {
    match chroma {
        HEIF_CHROMA_420 => Some(Chroma::Yuv420),
        HEIF_CHROMA_444 => Some(Chroma::Yuv444),
        _ => None,
    }
}

/// Collect the Y, Cb and Cr planes through `plane`, which returns the base
/// pointer and stride for a libheif channel.
fn yuv_planes(
    format: Chroma,
    width: u32,
    height: u32,
    mut plane: impl FnMut(c_int) -> (*const u8, c_int),
) -> Option<[RawPlane; 3]> {
    let (cw, ch) = format.chroma_size(width, height);
    let sizes = [(width, height), (cw, ch), (cw, ch)];
    let mut planes = [None, None, None];
    for (i, &channel) in CHANNELS.iter().enumerate() {
        let (base, stride) = plane(channel);
        if base.is_null() {
            debug!(channel, %format, "libheif returned no {} plane", CHANNEL_NAMES[i]);
            return None;
        }
        let Ok(stride) = usize::try_from(stride) else {
            debug!(channel, stride, "libheif returned a negative stride");
            return None;
        };
        planes[i] = RawPlane::new(base, stride, sizes[i].0, sizes[i].1);
        if planes[i].is_none() {
            debug!(channel, stride, "{} plane is smaller than the image", CHANNEL_NAMES[i]);
            return None;
        }
    }
    let [y, u, v] = planes;
    Some([y?, u?, v?])
}

fn positive_dimensions(width: c_int, height: c_int) -> Option<(u32, u32)> {
    let width = u32::try_from(width).ok().filter(|&w| w > 0)?;
    let height = u32::try_from(height).ok().filter(|&h| h > 0)?;
    Some((width, height))
}

fn check(err: &RawError, failure: CodecError) -> Result<(), CodecError> {
    if err.code == 0 {
        return Ok(());
    }
    debug!(
        code = err.code,
        subcode = err.subcode,
        "libheif: {}",
        error_message(err)
    );
    Err(failure)
}

fn error_message(err: &RawError) -> String {
    if err.message.is_null() {
        return String::new();
    }
    // SAFETY: libheif error messages are static NUL-terminated strings.
    unsafe { CStr::from_ptr(err.message) }
        .to_string_lossy()
        .into_owned()
}

/// A libheif context and everything decoded from it.
///
/// Freeing the context invalidates the handle, the image and its planes. The
/// handle and image are released first when the library exports the release
/// functions.
#[derive(Debug)]
pub struct HeifContext<'a> {
    backend: &'a HeifBackend,
    raw: NonNull<RawContext>,
    handle: Option<NonNull<RawHandle>>,
    image: Option<NonNull<RawImage>>,
    _input: PhantomData<&'a [u8]>,
}

// SAFETY: libheif contexts are not bound to the creating thread. After
// decoding the context is only read through plane views and freed on drop.
unsafe impl Send for HeifContext<'_> {}

impl<'a> HeifContext<'a> {
    fn alloc(backend: &'a HeifBackend) -> Option<Self> {
        // SAFETY: heif_context_alloc has no preconditions.
        let raw = NonNull::new(unsafe { (backend.context_alloc)() })?;
        Some(Self {
            backend,
            raw,
            handle: None,
            image: None,
            _input: PhantomData,
        })
    }

    fn as_ptr(&self) -> *mut RawContext {
        self.raw.as_ptr()
    }

    fn handle(&self) -> Option<*const RawHandle> {
        self.handle.map(|h| h.as_ptr().cast_const())
    }

    /// Keep `image` alive with the context, releasing any earlier decode.
    fn set_image(&mut self, image: NonNull<RawImage>) {
        if let (Some(old), Some(release)) = (self.image.replace(image), self.backend.image_release) {
            // SAFETY: `old` came from heif_decode_image on this context and
            // nothing borrows its planes yet.
            unsafe { release(old.as_ptr()) }
        }
    }
}

impl Drop for HeifContext<'_> {
    fn drop(&mut self) {
        trace!("heif_context_free");
        // SAFETY: each object was produced by this context and is released
        // once, children before the context.
        unsafe {
            if let (Some(image), Some(release)) = (self.image, self.backend.image_release) {
                release(image.as_ptr());
            }
            if let (Some(handle), Some(release)) = (self.handle, self.backend.handle_release) {
                release(handle.as_ptr());
            }
            (self.backend.context_free)(self.raw.as_ptr());
        }
    }
}

impl fmt::Debug for RawError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawError")
            .field("code", &self.code)
            .field("subcode", &self.subcode)
            .finish_non_exhaustive()
    }
}
