//! Unified error types for codec operations.

use crate::backend::BackendKind;

/// Unified error type for decode, encode and config operations.
///
/// Backend failures carry the same short diagnostic text regardless of which
/// native library produced them; pixel-geometry failures embed the offending
/// value.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CodecError {
    /// Input shorter than a container header, an unknown signature, or a
    /// signature whose backend is not loaded.
    #[error("unrecognized image format")]
    UnrecognizedFormat,
    /// The operation needs a backend that is not loaded.
    #[error("{0} backend is not loaded")]
    Unavailable(BackendKind),
    /// A backend object (decoder, encoder, image, context) could not be created.
    #[error("{0}")]
    Create(&'static str),
    /// The backend rejected the container.
    #[error("{0}")]
    Parse(&'static str),
    /// The backend could not produce a frame.
    #[error("{0}")]
    Decode(&'static str),
    /// The backend could not encode the frame.
    #[error("failed to encode")]
    Encode,
    /// Decoded frame is not 8 bits per sample.
    #[error("not 8 bit image: {0}")]
    UnsupportedDepth(u32),
    /// Decoded frame uses a chroma layout other than 4:4:4 or 4:2:0.
    #[error("not YUV420 image: {0}")]
    UnsupportedChroma(i32),
    /// A JPEG given for transcoding could not be decoded to YCbCr.
    #[error("failed to decode JPEG: {0}")]
    Jpeg(String),
    /// Caller-supplied planes or dimensions are unusable.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Resource limit exceeded.
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),
}

/// Failure to bind a backend library.
///
/// Never returned from [`load`](crate::load); a backend that fails to load is
/// simply reported as unavailable.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// No candidate path could be opened.
    #[error("no library candidates for {0}")]
    NoCandidates(BackendKind),
    /// The shared library could not be opened.
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: libloading::Error,
    },
    /// The library opened but an entry point is missing.
    #[error("{path}: missing symbol {symbol}: {source}")]
    Symbol {
        path: String,
        symbol: &'static str,
        #[source]
        source: libloading::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_match_native_templates() {
        assert_eq!(CodecError::UnsupportedDepth(10).to_string(), "not 8 bit image: 10");
        assert_eq!(CodecError::UnsupportedChroma(2).to_string(), "not YUV420 image: 2");
        assert_eq!(
            CodecError::Create("failed to create decoder").to_string(),
            "failed to create decoder"
        );
        assert_eq!(CodecError::Encode.to_string(), "failed to encode");
        assert_eq!(
            CodecError::Jpeg("premature end of buffer".into()).to_string(),
            "failed to decode JPEG: premature end of buffer"
        );
    }

    #[test]
    fn unavailable_names_backend() {
        let msg = CodecError::Unavailable(BackendKind::Avif).to_string();
        assert_eq!(msg, "libavif backend is not loaded");
    }
}
