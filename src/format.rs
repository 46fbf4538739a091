//! Container format detection.
//!
//! Both supported families are ISO-BMFF files whose first box is `ftyp`. The
//! box size occupies bytes 0..4, so the `ftyp` tag plus the major brand sit at
//! bytes 4..12.

use tracing::debug;

use crate::backend::BackendKind;
use crate::loader::Capabilities;

/// Minimum number of bytes needed to classify a buffer.
pub const SIGNATURE_LEN: usize = 12;

const SIGNATURE_OFFSET: usize = 4;
const AVIF_SIGNATURE: &[u8; 8] = b"ftypavif";
const HEIC_SIGNATURE: &[u8; 8] = b"ftypheic";

/// Container families routed by this crate.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContainerFormat {
    Avif,
    Heic,
}

impl ContainerFormat {
    pub const ALL: [ContainerFormat; 2] = [ContainerFormat::Avif, ContainerFormat::Heic];

    /// Formats routed to `backend`.
    pub fn handled_by(backend: BackendKind) -> impl Iterator<Item = ContainerFormat> {
        Self::ALL.into_iter().filter(move |f| f.backend() == backend)
    }

    /// Detect format from the signature at byte offset 4.
    ///
    /// Returns `None` for buffers shorter than 12 bytes or with an unknown
    /// signature. Does not consider which backends are loaded; see [`sniff`].
    pub fn detect(data: &[u8]) -> Option<Self> {
        if data.len() < SIGNATURE_LEN {
            return None;
        }

        let signature = &data[SIGNATURE_OFFSET..SIGNATURE_LEN];
        if signature == AVIF_SIGNATURE {
            Some(ContainerFormat::Avif)
        } else if signature == HEIC_SIGNATURE {
            Some(ContainerFormat::Heic)
        } else {
            None
        }
    }

    /// The backend that handles this container.
    pub fn backend(self) -> BackendKind {
        match self {
            ContainerFormat::Avif => BackendKind::Avif,
            ContainerFormat::Heic => BackendKind::Heif,
        }
    }

    /// Detect format from file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "avif" => Some(ContainerFormat::Avif),
            "heic" | "heif" => Some(ContainerFormat::Heic),
            _ => None,
        }
    }

    /// MIME type string.
    pub fn mime_type(self) -> &'static str {
        match self {
            ContainerFormat::Avif => "image/avif",
            ContainerFormat::Heic => "image/heic",
        }
    }

    /// Common file extensions.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            ContainerFormat::Avif => &["avif"],
            ContainerFormat::Heic => &["heic", "heif"],
        }
    }

    /// Whether this crate can encode the format.
    pub fn supports_encode(self) -> bool {
        matches!(self, ContainerFormat::Avif)
    }
}

/// Classify `data`, accepting only formats whose backend is loaded.
///
/// A signature that matches an unloaded backend is reported as unrecognized,
/// the same as a buffer nobody can read.
pub fn sniff(data: &[u8], capabilities: Capabilities) -> Option<ContainerFormat> {
    let format = ContainerFormat::detect(data)?;
    if capabilities.contains(format.backend()) {
        Some(format)
    } else {
        debug!(?format, "signature matched but {} is not loaded", format.backend());
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AVIF_HEADER: &[u8] = b"\x00\x00\x00\x1cftypavif\x00\x00\x00\x00";
    const HEIC_HEADER: &[u8] = b"\x00\x00\x00\x18ftypheic\x00\x00\x00\x00";

    #[test]
    fn detect_avif() {
        assert_eq!(ContainerFormat::detect(AVIF_HEADER), Some(ContainerFormat::Avif));
    }

    #[test]
    fn detect_heic() {
        assert_eq!(ContainerFormat::detect(HEIC_HEADER), Some(ContainerFormat::Heic));
    }

    #[test]
    fn detect_exactly_twelve_bytes() {
        assert_eq!(
            ContainerFormat::detect(&AVIF_HEADER[..12]),
            Some(ContainerFormat::Avif)
        );
    }

    #[test]
    fn detect_too_short() {
        for len in 0..SIGNATURE_LEN {
            assert_eq!(ContainerFormat::detect(&AVIF_HEADER[..len]), None, "len {len}");
        }
    }

    #[test]
    fn detect_other_brands() {
        assert_eq!(ContainerFormat::detect(b"\x00\x00\x00\x18ftypavis"), None);
        assert_eq!(ContainerFormat::detect(b"\x00\x00\x00\x18ftypmif1"), None);
        assert_eq!(ContainerFormat::detect(b"\xFF\xD8\xFF\xE0\x00\x10JFIF\x00\x01"), None);
    }

    #[test]
    fn signature_must_be_at_offset_four() {
        assert_eq!(ContainerFormat::detect(b"ftypavif\x00\x00\x00\x00"), None);
    }

    #[test]
    fn sniff_gated_by_capabilities() {
        assert_eq!(sniff(AVIF_HEADER, Capabilities::AVIF), Some(ContainerFormat::Avif));
        assert_eq!(sniff(AVIF_HEADER, Capabilities::HEIF), None);
        assert_eq!(sniff(HEIC_HEADER, Capabilities::HEIF), Some(ContainerFormat::Heic));
        assert_eq!(sniff(HEIC_HEADER, Capabilities::AVIF), None);
        assert_eq!(sniff(HEIC_HEADER, Capabilities::NONE), None);
        assert_eq!(sniff(AVIF_HEADER, Capabilities::all()), Some(ContainerFormat::Avif));
    }

    #[test]
    fn extensions_map_back() {
        for format in ContainerFormat::ALL {
            assert!(!format.extensions().is_empty());
            for ext in format.extensions() {
                assert_eq!(ContainerFormat::from_extension(ext), Some(format), "{ext}");
            }
        }
        assert_eq!(ContainerFormat::Heic.extensions(), &["heic", "heif"]);
    }

    #[test]
    fn only_avif_encodes() {
        assert!(ContainerFormat::Avif.supports_encode());
        assert!(!ContainerFormat::Heic.supports_encode());
    }

    #[test]
    fn formats_per_backend() {
        let avif: Vec<_> = ContainerFormat::handled_by(BackendKind::Avif).collect();
        assert_eq!(avif, vec![ContainerFormat::Avif]);
        let heif: Vec<_> = ContainerFormat::handled_by(BackendKind::Heif).collect();
        assert_eq!(heif, vec![ContainerFormat::Heic]);
    }

    #[test]
    fn from_extension_case_insensitive() {
        assert_eq!(ContainerFormat::from_extension("AVIF"), Some(ContainerFormat::Avif));
        assert_eq!(ContainerFormat::from_extension("Heif"), Some(ContainerFormat::Heic));
        assert_eq!(ContainerFormat::from_extension("jpg"), None);
    }
}
