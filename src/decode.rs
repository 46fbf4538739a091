//! Image decoding.

use tracing::trace;

use crate::format::sniff;
use crate::image::RawPlane;
use crate::loader::{self, Backends};
use crate::{
    Backend, BackendKind, Chroma, CodecError, ContainerFormat, Dimensions, Limits, Release,
    YuvImage,
};

/// A decoded frame whose planes live in backend memory.
///
/// The planes stay valid until this value is dropped or passed to
/// [`free`](crate::free).
#[derive(Debug)]
pub struct Decoded<'a> {
    container: ContainerFormat,
    width: u32,
    height: u32,
    format: Chroma,
    planes: [RawPlane; 3],
    owner: Release<'a>,
}

impl<'a> Decoded<'a> {
    pub(crate) fn new(
        container: ContainerFormat,
        width: u32,
        height: u32,
        format: Chroma,
        planes: [RawPlane; 3],
        owner: Release<'a>,
    ) -> Self {
        Self {
            container,
            width,
            height,
            format,
            planes,
            owner,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width,
            height: self.height,
        }
    }

    /// Chroma layout of the decoded frame.
    pub fn format(&self) -> Chroma {
        self.format
    }

    /// Container the frame came from.
    pub fn container(&self) -> ContainerFormat {
        self.container
    }

    /// Backend that owns the planes.
    pub fn backend(&self) -> BackendKind {
        self.owner.backend()
    }

    /// The resource that [`free`](crate::free) will release.
    pub fn owner(&self) -> &Release<'a> {
        &self.owner
    }

    /// Borrow the planes. The views cannot outlive `self`.
    pub fn image(&self) -> YuvImage<'_> {
        YuvImage::from_backend(self.format, &self.planes, &self.owner)
    }

    /// Release the backend resources now.
    pub fn free(self) {
        self.owner.free();
    }
}

impl<'a> From<Decoded<'a>> for Release<'a> {
    fn from(decoded: Decoded<'a>) -> Self {
        decoded.owner
    }
}

/// Image decode request builder.
///
/// # Example
///
/// ```no_run
/// use zendyn::DecodeRequest;
///
/// let data: &[u8] = &[]; // your image bytes
/// let decoded = DecodeRequest::new(data).decode()?;
/// println!("{}x{} {}", decoded.width(), decoded.height(), decoded.format());
/// # Ok::<(), zendyn::CodecError>(())
/// ```
pub struct DecodeRequest<'a> {
    data: &'a [u8],
    backends: Option<&'a Backends>,
    limits: Option<&'a Limits>,
}

impl<'a> DecodeRequest<'a> {
    /// Create a new decode request. The format is sniffed from the bytes.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            backends: None,
            limits: None,
        }
    }

    /// Route through `backends` instead of the process-wide set.
    pub fn with_backends(mut self, backends: &'a Backends) -> Self {
        self.backends = Some(backends);
        self
    }

    /// Set dimension limits.
    pub fn with_limits(mut self, limits: &'a Limits) -> Self {
        self.limits = Some(limits);
        self
    }

    /// The container format this request would be routed as, if any.
    pub fn format(&self) -> Option<ContainerFormat> {
        sniff(self.data, self.backends().capabilities())
    }

    /// Decode the primary image.
    pub fn decode(self) -> Result<Decoded<'a>, CodecError> {
        let backend = self.route()?;
        let decoded = backend.decode(self.data)?;
        if let Some(limits) = self.limits {
            limits.check_dimensions(decoded.width(), decoded.height())?;
        }
        Ok(decoded)
    }

    /// Read the dimensions from the header without keeping any backend
    /// object alive.
    pub fn config(self) -> Result<Dimensions, CodecError> {
        let backend = self.route()?;
        let dims = backend.config(self.data)?;
        if let Some(limits) = self.limits {
            limits.check_dimensions(dims.width, dims.height)?;
        }
        Ok(dims)
    }

    fn backends(&self) -> &'a Backends {
        self.backends.unwrap_or_else(|| loader::global())
    }

    fn route(&self) -> Result<&'a dyn Backend, CodecError> {
        let backends = self.backends();
        let format =
            sniff(self.data, backends.capabilities()).ok_or(CodecError::UnrecognizedFormat)?;
        trace!(?format, len = self.data.len(), "routing");
        backends
            .get(format.backend())
            .ok_or(CodecError::UnrecognizedFormat)
    }
}

/// Decode `data` with the process-wide backends.
pub fn decode(data: &[u8]) -> Result<Decoded<'_>, CodecError> {
    DecodeRequest::new(data).decode()
}

/// Read the dimensions of `data` with the process-wide backends.
pub fn config(data: &[u8]) -> Result<Dimensions, CodecError> {
    DecodeRequest::new(data).config()
}

#[cfg(test)]
mod tests {
    use super::*;

    const AVIF_HEADER: &[u8] = b"\x00\x00\x00\x1cftypavif\x00\x00\x00\x00mif1";

    #[test]
    fn builder_pattern() {
        let backends = Backends::none();
        let limits = Limits::none();
        let request = DecodeRequest::new(AVIF_HEADER)
            .with_backends(&backends)
            .with_limits(&limits);
        assert!(request.limits.is_some());
        assert_eq!(request.format(), None);
    }

    #[test]
    fn unloaded_backend_is_unrecognized() {
        let backends = Backends::none();
        let result = DecodeRequest::new(AVIF_HEADER)
            .with_backends(&backends)
            .decode();
        assert!(matches!(result, Err(CodecError::UnrecognizedFormat)));

        let result = DecodeRequest::new(AVIF_HEADER)
            .with_backends(&backends)
            .config();
        assert!(matches!(result, Err(CodecError::UnrecognizedFormat)));
    }

    #[test]
    fn short_input_is_unrecognized() {
        for len in 0..12 {
            assert!(matches!(
                decode(&AVIF_HEADER[..len]),
                Err(CodecError::UnrecognizedFormat)
            ));
            assert!(matches!(
                config(&AVIF_HEADER[..len]),
                Err(CodecError::UnrecognizedFormat)
            ));
        }
    }
}
