#![expect(unsafe_code, reason = "dlopen and symbol lookup")]

//! Native codec backends.
//!
//! Each backend wraps one dynamically loaded library behind [`Backend`]. A
//! backend value only exists once its whole symbol table resolved; there is
//! no partially loaded state.

pub mod avif;
pub mod heif;

use std::ffi::OsStr;

use libloading::Library;

use crate::error::LoadError;
use crate::{CodecError, Decoded, Dimensions};

pub use avif::AvifBackend;
pub use heif::HeifBackend;

/// Identifies a backend library.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// libavif: AVIF decode, encode and config.
    Avif,
    /// libheif: HEIC decode and config.
    Heif,
}

impl BackendKind {
    pub const ALL: [BackendKind; 2] = [BackendKind::Avif, BackendKind::Heif];

    /// Name of the native library.
    pub fn library_name(self) -> &'static str {
        match self {
            BackendKind::Avif => "libavif",
            BackendKind::Heif => "libheif",
        }
    }
}

impl core::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.library_name())
    }
}

/// The decode side shared by both backends.
///
/// `decode` hands ownership of the backend objects to the returned
/// [`Decoded`]; `config` never does.
pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Parse the container and materialize the primary image.
    fn decode<'a>(&'a self, data: &'a [u8]) -> Result<Decoded<'a>, CodecError>;

    /// Parse the container header and report its dimensions.
    fn config(&self, data: &[u8]) -> Result<Dimensions, CodecError>;
}

fn open_library(path: &OsStr) -> Result<Library, LoadError> {
    // SAFETY: the candidates are codec libraries from the platform's package
    // manager or an explicit override; their initializers are trusted.
    unsafe { Library::new(path) }.map_err(|source| LoadError::Open {
        path: path.to_string_lossy().into_owned(),
        source,
    })
}

/// Resolve one entry point as a plain function pointer.
///
/// # Safety
///
/// `T` must match the C signature of `symbol`.
unsafe fn resolve<T: Copy>(
    lib: &Library,
    path: &OsStr,
    symbol: &'static str,
) -> Result<T, LoadError> {
    // SAFETY: forwarded to the caller.
    let sym = unsafe { lib.get::<T>(symbol.as_bytes()) }.map_err(|source| LoadError::Symbol {
        path: path.to_string_lossy().into_owned(),
        symbol,
        source,
    })?;
    Ok(*sym)
}

/// Resolve an entry point that is allowed to be missing.
///
/// # Safety
///
/// `T` must match the C signature of `symbol`.
unsafe fn resolve_optional<T: Copy>(lib: &Library, symbol: &'static str) -> Option<T> {
    // SAFETY: forwarded to the caller.
    unsafe { lib.get::<T>(symbol.as_bytes()) }.ok().map(|sym| *sym)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_missing_library() {
        let err = open_library(OsStr::new("/nonexistent/libzendyn-missing.so")).unwrap_err();
        assert!(matches!(err, LoadError::Open { .. }));
        assert!(err.to_string().contains("libzendyn-missing"), "{err}");
    }

    #[test]
    fn kind_display() {
        assert_eq!(BackendKind::Avif.to_string(), "libavif");
        assert_eq!(BackendKind::Heif.to_string(), "libheif");
    }
}
