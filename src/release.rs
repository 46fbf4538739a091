//! Unified release of backend-owned results.
//!
//! A decode or encode result owns exactly one backend resource graph.
//! [`Release`] names which one, and dropping it tears that graph down.

use tracing::trace;

use crate::backend::avif::{AvifData, AvifDecoder};
use crate::backend::heif::HeifContext;
use crate::backend::BackendKind;

/// The backend resource a result owns.
#[derive(Debug)]
pub enum Release<'a> {
    /// A libavif decoder; its current frame holds the decoded planes.
    Decoder(AvifDecoder<'a>),
    /// A libheif context; it keeps the handle, image and planes alive.
    Context(HeifContext<'a>),
    /// Encoded bytes allocated by libavif.
    Bytes(AvifData<'a>),
}

impl Release<'_> {
    /// Which backend allocated the resource.
    pub fn backend(&self) -> BackendKind {
        match self {
            Release::Decoder(_) | Release::Bytes(_) => BackendKind::Avif,
            Release::Context(_) => BackendKind::Heif,
        }
    }

    /// Tear the resource down now.
    pub fn free(self) {
        match self {
            Release::Decoder(decoder) => {
                trace!("releasing libavif decoder");
                drop(decoder);
            }
            Release::Context(context) => {
                trace!("releasing libheif context");
                drop(context);
            }
            Release::Bytes(data) => {
                trace!("releasing libavif output");
                drop(data);
            }
        }
    }
}

/// Release whatever backend resource `result` owns.
///
/// Accepts a [`Decoded`](crate::Decoded), an [`Encoded`](crate::Encoded) or a
/// bare [`Release`]. Dropping the result has the same effect.
pub fn free<'a>(result: impl Into<Release<'a>>) {
    result.into().free();
}
