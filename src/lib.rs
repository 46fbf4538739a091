//! # zendyn
//!
//! AVIF and HEIC decoding, AVIF encoding, and header inspection over
//! libavif and libheif, both loaded at run time.
//!
//! Neither library is linked. On first use the crate opens each one, resolves
//! the entry points it needs, and reports what it found as [`Capabilities`].
//! A missing library is not an error: requests for its format are reported as
//! [`CodecError::UnrecognizedFormat`].
//!
//! With the default `jpeg` feature, [`encode_jpeg`] transcodes JPEG files to
//! AVIF without a round trip through RGB.
//!
//! Library locations can be overridden with the `ZENDYN_AVIF_LIBRARY` and
//! `ZENDYN_HEIF_LIBRARY` environment variables.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use zendyn::{Chroma, YuvImage};
//!
//! let caps = zendyn::load();
//! println!("avif: {}, heif: {}", caps.has_avif(), caps.has_heif());
//!
//! // Encode an 8-bit 4:2:0 frame
//! let (y, c) = (vec![128u8; 64 * 64], vec![128u8; 32 * 32]);
//! let image = YuvImage::from_planes(64, 64, Chroma::Yuv420, [&y, &c, &c], [64, 32, 32])?;
//! let avif = zendyn::encode(&image)?;
//!
//! // Decode it back; the planes borrow backend memory until `decoded` drops
//! let decoded = zendyn::decode(&avif)?;
//! let frame = decoded.image();
//! assert_eq!(frame.width(), 64);
//!
//! // Header only
//! let dims = zendyn::config(&avif)?;
//! assert_eq!((dims.width, dims.height), (64, 64));
//!
//! zendyn::free(decoded);
//! zendyn::free(avif);
//! # Ok::<(), zendyn::CodecError>(())
//! ```

#![deny(unsafe_code)]

pub mod backend;
mod decode;
mod encode;
mod error;
mod format;
mod image;
#[cfg(feature = "jpeg")]
mod jpeg;
mod limits;
mod loader;
mod release;

pub use backend::{Backend, BackendKind};
pub use decode::{DecodeRequest, Decoded, config, decode};
pub use encode::{EncodeRequest, Encoded, encode};
pub use error::{CodecError, LoadError};
pub use format::{ContainerFormat, SIGNATURE_LEN, sniff};
pub use image::{Chroma, Dimensions, YuvImage};
pub use imgref::ImgRef;
#[cfg(feature = "jpeg")]
pub use jpeg::{JpegFrame, encode_jpeg, is_jpeg};
pub use limits::Limits;
pub use loader::{
    AVIF_LIBRARY_ENV, Backends, Capabilities, HEIF_LIBRARY_ENV, LibraryPaths, load,
};
pub use release::{Release, free};
