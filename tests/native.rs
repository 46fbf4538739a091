//! Tests against the installed libavif / libheif.
//!
//! Each test returns early when the library it needs did not load, so the
//! suite passes on machines without the native codecs.

use rayon::prelude::*;
use zendyn::{
    BackendKind, Chroma, CodecError, ContainerFormat, DecodeRequest, ImgRef, Limits, Release,
    YuvImage,
};

fn avif_loaded() -> bool {
    let loaded = zendyn::load().has_avif();
    if !loaded {
        eprintln!("libavif not loaded, skipping");
    }
    loaded
}

struct Planes {
    width: u32,
    height: u32,
    chroma: Chroma,
    y: Vec<u8>,
    u: Vec<u8>,
    v: Vec<u8>,
}

impl Planes {
    /// Smooth horizontal luma ramp with flat chroma.
    fn gradient(width: u32, height: u32, chroma: Chroma) -> Self {
        let (cw, ch) = chroma.chroma_size(width, height);
        let y = (0..height)
            .flat_map(|_| (0..width).map(move |x| (32 + x * 160 / width) as u8))
            .collect();
        Self {
            width,
            height,
            chroma,
            y,
            u: vec![110; (cw * ch) as usize],
            v: vec![150; (cw * ch) as usize],
        }
    }

    fn image(&self) -> YuvImage<'_> {
        let (cw, _) = self.chroma.chroma_size(self.width, self.height);
        YuvImage::from_planes(
            self.width,
            self.height,
            self.chroma,
            [&self.y, &self.u, &self.v],
            [self.width as usize, cw as usize, cw as usize],
        )
        .unwrap()
    }
}

fn mean_abs_diff(a: ImgRef<'_, u8>, b: ImgRef<'_, u8>) -> f64 {
    assert_eq!((a.width(), a.height()), (b.width(), b.height()));
    let total: u64 = a
        .rows()
        .zip(b.rows())
        .flat_map(|(ra, rb)| ra.iter().zip(rb))
        .map(|(&x, &y)| u64::from(x.abs_diff(y)))
        .sum();
    total as f64 / (a.width() * a.height()) as f64
}

fn roundtrip(chroma: Chroma, width: u32, height: u32) {
    let source = Planes::gradient(width, height, chroma);
    let encoded = zendyn::encode(&source.image()).unwrap();
    assert!(!encoded.is_empty());
    assert_eq!(ContainerFormat::detect(&encoded), Some(ContainerFormat::Avif));

    let decoded = zendyn::decode(&encoded).unwrap();
    assert_eq!(decoded.width(), width);
    assert_eq!(decoded.height(), height);
    assert_eq!(decoded.format(), chroma);
    assert_eq!(decoded.container(), ContainerFormat::Avif);
    assert_eq!(decoded.backend(), BackendKind::Avif);
    assert!(matches!(decoded.owner(), Release::Decoder(_)));

    let image = decoded.image();
    let (cw, ch) = chroma.chroma_size(width, height);
    assert_eq!((image.u().width(), image.u().height()), (cw as usize, ch as usize));
    let src = source.image();
    let err = mean_abs_diff(src.y(), image.y());
    assert!(err < 8.0, "luma error {err}");
    let err = mean_abs_diff(src.u(), image.u());
    assert!(err < 8.0, "chroma error {err}");

    let dims = zendyn::config(&encoded).unwrap();
    assert_eq!((dims.width, dims.height), (width, height));

    zendyn::free(decoded);
    zendyn::free(encoded);
}

#[test]
fn roundtrip_420() {
    if !avif_loaded() {
        return;
    }
    roundtrip(Chroma::Yuv420, 64, 48);
}

#[test]
fn roundtrip_444() {
    if !avif_loaded() {
        return;
    }
    roundtrip(Chroma::Yuv444, 40, 24);
}

#[test]
fn roundtrip_odd_dimensions() {
    if !avif_loaded() {
        return;
    }
    roundtrip(Chroma::Yuv420, 33, 17);
}

#[test]
fn encoded_bytes_copy_out() {
    if !avif_loaded() {
        return;
    }
    let source = Planes::gradient(16, 16, Chroma::Yuv420);
    let encoded = zendyn::encode(&source.image()).unwrap();
    let copy = encoded.to_vec();
    assert_eq!(copy.as_slice(), &*encoded);
    let owned = encoded.into_vec();
    assert_eq!(owned, copy);

    // the copy decodes after the backend buffer is gone
    let decoded = zendyn::decode(&owned).unwrap();
    assert_eq!(decoded.dimensions().width, 16);
}

#[test]
fn corrupt_payload_fails_after_routing() {
    if !avif_loaded() {
        return;
    }
    let source = Planes::gradient(32, 32, Chroma::Yuv420);
    let encoded = zendyn::encode(&source.image()).unwrap().into_vec();

    let truncated = &encoded[..40.min(encoded.len())];
    let err = zendyn::decode(truncated).unwrap_err();
    assert!(!matches!(err, CodecError::UnrecognizedFormat), "{err}");
    assert!(zendyn::config(truncated).is_err());

    // signature intact, box contents scrambled
    let mut scrambled = encoded.clone();
    for b in &mut scrambled[12..] {
        *b = b.wrapping_mul(31).wrapping_add(7);
    }
    assert!(zendyn::decode(&scrambled).is_err());
}

#[test]
fn limits_reject_large_frames() {
    if !avif_loaded() {
        return;
    }
    let source = Planes::gradient(64, 64, Chroma::Yuv444);
    let encoded = zendyn::encode(&source.image()).unwrap().into_vec();
    let limits = Limits::none().with_max_pixels(1000);
    let err = DecodeRequest::new(&encoded)
        .with_limits(&limits)
        .decode()
        .unwrap_err();
    assert!(matches!(err, CodecError::LimitExceeded(_)), "{err}");
    let err = DecodeRequest::new(&encoded)
        .with_limits(&limits)
        .config()
        .unwrap_err();
    assert!(matches!(err, CodecError::LimitExceeded(_)), "{err}");
}

#[test]
fn concurrent_decodes() {
    if !avif_loaded() {
        return;
    }
    let source = Planes::gradient(48, 32, Chroma::Yuv420);
    let encoded = zendyn::encode(&source.image()).unwrap().into_vec();

    let sums: Vec<u64> = (0..16)
        .into_par_iter()
        .map(|_| {
            let decoded = zendyn::decode(&encoded).unwrap();
            let image = decoded.image();
            image.y().pixels().map(u64::from).sum()
        })
        .collect();
    assert!(sums.windows(2).all(|w| w[0] == w[1]));
}

/// 64x48 HEVC 4:2:0 still, written by libheif's x265 encoder from
/// `Planes::gradient(64, 48, Chroma::Yuv420)`.
const GRADIENT_HEIC: &[u8] = include_bytes!("images/gradient.heic");

fn heif_loaded() -> bool {
    let loaded = zendyn::load().has_heif();
    if !loaded {
        eprintln!("libheif not loaded, skipping");
    }
    loaded
}

#[test]
fn heic_decodes_into_context_owner() {
    if !heif_loaded() {
        return;
    }
    assert_eq!(ContainerFormat::detect(GRADIENT_HEIC), Some(ContainerFormat::Heic));

    let dims = zendyn::config(GRADIENT_HEIC).unwrap();
    assert_eq!((dims.width, dims.height), (64, 48));

    let decoded = zendyn::decode(GRADIENT_HEIC).unwrap();
    assert_eq!(decoded.dimensions(), dims);
    assert_eq!(decoded.format(), Chroma::Yuv420);
    assert_eq!(decoded.container(), ContainerFormat::Heic);
    assert_eq!(decoded.backend(), BackendKind::Heif);
    assert!(matches!(decoded.owner(), Release::Context(_)));

    let source = Planes::gradient(64, 48, Chroma::Yuv420);
    let src = source.image();
    let image = decoded.image();
    assert_eq!((image.u().width(), image.u().height()), (32, 24));
    let err = mean_abs_diff(src.y(), image.y());
    assert!(err < 4.0, "luma error {err}");
    let err = mean_abs_diff(src.v(), image.v());
    assert!(err < 4.0, "chroma error {err}");

    zendyn::free(decoded);
}

#[test]
fn heic_release_through_owner() {
    if !heif_loaded() {
        return;
    }
    // the owner alone releases the context; dropping it early is fine
    let decoded = zendyn::decode(GRADIENT_HEIC).unwrap();
    let owner = Release::from(decoded);
    assert_eq!(owner.backend(), BackendKind::Heif);
    zendyn::free(owner);

    let again = zendyn::decode(GRADIENT_HEIC).unwrap();
    assert_eq!(again.width(), 64);
}

#[test]
fn heic_corrupt_payload_fails_to_parse() {
    if !heif_loaded() {
        return;
    }
    let truncated = &GRADIENT_HEIC[..64];
    let err = zendyn::decode(truncated).unwrap_err();
    assert!(matches!(err, CodecError::Parse(_) | CodecError::Decode(_)), "{err}");
    assert!(zendyn::config(truncated).is_err());
}

#[test]
fn heic_limits_apply() {
    if !heif_loaded() {
        return;
    }
    let limits = Limits::none().with_max_width(32);
    let err = DecodeRequest::new(GRADIENT_HEIC)
        .with_limits(&limits)
        .decode()
        .unwrap_err();
    assert!(matches!(err, CodecError::LimitExceeded(_)), "{err}");
}
