//! Image encoding.

use core::ops::Deref;

use tracing::trace;

use crate::backend::avif::AvifData;
use crate::loader::{self, Backends};
use crate::{BackendKind, CodecError, Limits, Release, YuvImage};

/// Encoded AVIF bytes, held in libavif's output buffer until dropped.
#[derive(Debug)]
pub struct Encoded<'a> {
    data: AvifData<'a>,
}

impl<'a> Encoded<'a> {
    pub(crate) fn new(data: AvifData<'a>) -> Self {
        Self { data }
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.data.as_bytes()
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    /// Copy the bytes out. The backend buffer stays alive.
    pub fn to_vec(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    /// Copy the bytes out and release the backend buffer.
    pub fn into_vec(self) -> Vec<u8> {
        let out = self.to_vec();
        self.free();
        out
    }

    /// Release the backend buffer now.
    pub fn free(self) {
        Release::from(self).free();
    }
}

impl Deref for Encoded<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl AsRef<[u8]> for Encoded<'_> {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl<'a> From<Encoded<'a>> for Release<'a> {
    fn from(encoded: Encoded<'a>) -> Self {
        Release::Bytes(encoded.data)
    }
}

/// Image encode request builder. Output is always AVIF.
///
/// # Example
///
/// ```no_run
/// use zendyn::{Chroma, EncodeRequest, YuvImage};
///
/// let (y, c) = (vec![16u8; 64 * 64], vec![128u8; 32 * 32]);
/// let image = YuvImage::from_planes(64, 64, Chroma::Yuv420, [&y, &c, &c], [64, 32, 32])?;
/// let avif = EncodeRequest::new(&image).encode()?.into_vec();
/// # Ok::<(), zendyn::CodecError>(())
/// ```
pub struct EncodeRequest<'a, 'img> {
    image: &'img YuvImage<'img>,
    backends: Option<&'a Backends>,
    limits: Option<&'a Limits>,
}

impl<'a, 'img> EncodeRequest<'a, 'img> {
    pub fn new(image: &'img YuvImage<'img>) -> Self {
        Self {
            image,
            backends: None,
            limits: None,
        }
    }

    /// Encode with `backends` instead of the process-wide set.
    pub fn with_backends(mut self, backends: &'a Backends) -> Self {
        self.backends = Some(backends);
        self
    }

    /// Set dimension limits.
    pub fn with_limits(mut self, limits: &'a Limits) -> Self {
        self.limits = Some(limits);
        self
    }

    /// Encode a single frame with libavif.
    pub fn encode(self) -> Result<Encoded<'a>, CodecError> {
        if let Some(limits) = self.limits {
            limits.check_dimensions(self.image.width(), self.image.height())?;
        }
        let backends = self.backends.unwrap_or_else(|| loader::global());
        let avif = backends
            .avif()
            .ok_or(CodecError::Unavailable(BackendKind::Avif))?;
        trace!(
            width = self.image.width(),
            height = self.image.height(),
            format = %self.image.format(),
            "encoding"
        );
        avif.encode(self.image)
    }
}

/// Encode `image` with the process-wide libavif.
pub fn encode(image: &YuvImage<'_>) -> Result<Encoded<'static>, CodecError> {
    EncodeRequest::new(image)
        .with_backends(loader::global())
        .encode()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Chroma;

    #[test]
    fn encode_without_libavif_is_unavailable() {
        let (y, c) = (vec![0u8; 16], vec![0u8; 4]);
        let image = YuvImage::from_planes(4, 4, Chroma::Yuv420, [&y, &c, &c], [4, 2, 2]).unwrap();
        let backends = Backends::none();
        let err = EncodeRequest::new(&image)
            .with_backends(&backends)
            .encode()
            .unwrap_err();
        assert!(matches!(err, CodecError::Unavailable(BackendKind::Avif)));
        assert_eq!(err.to_string(), "libavif backend is not loaded");
    }

    #[test]
    fn limits_checked_before_backend() {
        let (y, c) = (vec![0u8; 16], vec![0u8; 16]);
        let image = YuvImage::from_planes(4, 4, Chroma::Yuv444, [&y, &c, &c], [4, 4, 4]).unwrap();
        let backends = Backends::none();
        let limits = Limits::none().with_max_width(2);
        let err = EncodeRequest::new(&image)
            .with_backends(&backends)
            .with_limits(&limits)
            .encode()
            .unwrap_err();
        assert!(matches!(err, CodecError::LimitExceeded(_)), "{err}");
    }
}
