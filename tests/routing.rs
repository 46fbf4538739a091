//! Request routing with no native backends loaded.

use zendyn::{
    BackendKind, Backends, Capabilities, Chroma, CodecError, ContainerFormat, DecodeRequest,
    EncodeRequest, LibraryPaths, YuvImage, sniff,
};

const AVIF: &[u8] = b"\x00\x00\x00\x20ftypavif\x00\x00\x00\x00avifmif1miaf";
const HEIC: &[u8] = b"\x00\x00\x00\x18ftypheic\x00\x00\x00\x00mif1heic";

#[test]
fn nothing_routes_without_backends() {
    let backends = Backends::none();
    assert_eq!(backends.capabilities(), Capabilities::NONE);

    for data in [AVIF, HEIC] {
        assert_eq!(sniff(data, backends.capabilities()), None);
        let err = DecodeRequest::new(data)
            .with_backends(&backends)
            .decode()
            .unwrap_err();
        assert!(matches!(err, CodecError::UnrecognizedFormat), "{err}");
        let err = DecodeRequest::new(data)
            .with_backends(&backends)
            .config()
            .unwrap_err();
        assert!(matches!(err, CodecError::UnrecognizedFormat), "{err}");
    }
}

#[test]
fn signature_is_read_at_offset_four() {
    assert_eq!(ContainerFormat::detect(AVIF), Some(ContainerFormat::Avif));
    assert_eq!(ContainerFormat::detect(HEIC), Some(ContainerFormat::Heic));

    // same brand shifted by one byte
    let mut shifted = vec![0u8];
    shifted.extend_from_slice(AVIF);
    assert_eq!(ContainerFormat::detect(&shifted), None);

    // mif1 / avis brands are not routed
    assert_eq!(ContainerFormat::detect(b"\x00\x00\x00\x18ftypmif1\x00\x00\x00\x00"), None);
    assert_eq!(ContainerFormat::detect(b"\x00\x00\x00\x18ftypavis\x00\x00\x00\x00"), None);
}

#[test]
fn capability_gating_is_per_backend() {
    assert_eq!(sniff(AVIF, Capabilities::AVIF), Some(ContainerFormat::Avif));
    assert_eq!(sniff(HEIC, Capabilities::AVIF), None);
    assert_eq!(sniff(HEIC, Capabilities::HEIF), Some(ContainerFormat::Heic));
    assert_eq!(sniff(AVIF, Capabilities::HEIF), None);
    assert_eq!(sniff(&AVIF[..11], Capabilities::all()), None);
}

#[test]
fn encode_needs_libavif() {
    let (y, c) = ([0u8; 16], [128u8; 4]);
    let image = YuvImage::from_planes(4, 4, Chroma::Yuv420, [&y, &c, &c], [4, 2, 2]).unwrap();
    let backends = Backends::none();
    let err = EncodeRequest::new(&image)
        .with_backends(&backends)
        .encode()
        .unwrap_err();
    assert!(matches!(err, CodecError::Unavailable(BackendKind::Avif)));
}

#[test]
fn bad_paths_leave_everything_unloaded() {
    let paths = LibraryPaths {
        avif: vec!["/nonexistent/a/libavif.so".into(), "/nonexistent/b/libavif.so".into()],
        heif: vec![],
    };
    let backends = Backends::discover_with(&paths);
    assert!(backends.avif().is_none());
    assert!(backends.heif().is_none());
    assert!(backends.get(BackendKind::Heif).is_none());
}

#[test]
fn invalid_encode_input_is_rejected_up_front() {
    let y = [0u8; 16];
    let c = [0u8; 3];
    let err = YuvImage::from_planes(4, 4, Chroma::Yuv420, [&y, &c, &c], [4, 2, 2]).unwrap_err();
    assert!(matches!(err, CodecError::InvalidInput(_)), "{err}");
}
