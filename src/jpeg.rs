//! JPEG input for AVIF encoding.
//!
//! A JPEG is decoded to full-resolution YCbCr and split into planes. Chroma
//! is averaged back down when the target layout is 4:2:0. The samples are
//! never converted through RGB.

use tracing::debug;
use zune_jpeg::JpegDecoder;
use zune_jpeg::zune_core::colorspace::ColorSpace;
use zune_jpeg::zune_core::options::DecoderOptions;

use crate::loader;
use crate::{BackendKind, Chroma, CodecError, Dimensions, EncodeRequest, Encoded, Limits, YuvImage};

const SOI: [u8; 3] = [0xFF, 0xD8, 0xFF];
const SOS: u8 = 0xDA;

/// Whether `data` starts with a JPEG start-of-image marker.
pub fn is_jpeg(data: &[u8]) -> bool {
    data.starts_with(&SOI)
}

/// A JPEG decoded into owned YCbCr planes.
#[derive(Clone, Debug)]
pub struct JpegFrame {
    width: u32,
    height: u32,
    format: Chroma,
    planes: [Vec<u8>; 3],
}

impl JpegFrame {
    /// Decode keeping the file's own layout: 4:4:4 files stay 4:4:4, all
    /// others become 4:2:0.
    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        Self::decode_with(data, None, &Limits::none())
    }

    /// Decode into `format` (or the file's own layout when `None`), refusing
    /// frames outside `limits` before any scan data is decoded.
    pub fn decode_with(
        data: &[u8],
        format: Option<Chroma>,
        limits: &Limits,
    ) -> Result<Self, CodecError> {
        let options = DecoderOptions::default().jpeg_set_out_colorspace(ColorSpace::YCbCr);
        let mut decoder = JpegDecoder::new_with_options(data, options);
        decoder.decode_headers().map_err(jpeg_error)?;
        let (width, height) = decoder
            .dimensions()
            .ok_or_else(|| CodecError::Jpeg("missing frame header".into()))?;
        let (Ok(w), Ok(h)) = (u32::try_from(width), u32::try_from(height)) else {
            return Err(CodecError::Jpeg(format!("{width}x{height} out of range")));
        };
        limits.check_dimensions(w, h)?;

        let stored = stored_chroma(data);
        let format = format.or(stored).unwrap_or(Chroma::Yuv420);
        debug!(width, height, ?stored, %format, "decoding JPEG");

        let pixels = decoder.decode().map_err(jpeg_error)?;
        if pixels.len() != width * height * 3 {
            return Err(CodecError::Jpeg(format!(
                "expected 3-channel YCbCr output, got {} bytes for {width}x{height}",
                pixels.len()
            )));
        }

        let mut planes = [
            Vec::with_capacity(width * height),
            Vec::with_capacity(width * height),
            Vec::with_capacity(width * height),
        ];
        for px in pixels.chunks_exact(3) {
            for (plane, &sample) in planes.iter_mut().zip(px) {
                plane.push(sample);
            }
        }
        if format == Chroma::Yuv420 {
            for plane in &mut planes[1..] {
                *plane = halve(plane, width, height);
            }
        }

        Ok(Self {
            width: w,
            height: h,
            format,
            planes,
        })
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

    pub fn format(&self) -> Chroma {
        self.format
    }

    /// Borrow the planes for [`EncodeRequest`].
    pub fn image(&self) -> Result<YuvImage<'_>, CodecError> {
        let (cw, _) = self.format.chroma_size(self.width, self.height);
        let [y, u, v] = &self.planes;
        YuvImage::from_planes(
            self.width,
            self.height,
            self.format,
            [y.as_slice(), u.as_slice(), v.as_slice()],
            [self.width as usize, cw as usize, cw as usize],
        )
    }
}

/// Transcode a JPEG to AVIF with the process-wide libavif, keeping the
/// JPEG's chroma layout where it is 4:2:0 or 4:4:4.
///
/// Fails with [`CodecError::Unavailable`] before touching `data` when libavif
/// is not loaded.
pub fn encode_jpeg(data: &[u8]) -> Result<Encoded<'static>, CodecError> {
    let backends = loader::global();
    if backends.avif().is_none() {
        return Err(CodecError::Unavailable(BackendKind::Avif));
    }
    let frame = JpegFrame::decode(data)?;
    let image = frame.image()?;
    EncodeRequest::new(&image).with_backends(backends).encode()
}

fn jpeg_error(e: impl core::fmt::Display) -> CodecError {
    CodecError::Jpeg(e.to_string())
}

/// Chroma layout declared by the frame header, if it is one of the two that
/// map directly: every component 1x1, or 2x2 luma over 1x1 chroma.
fn stored_chroma(data: &[u8]) -> Option<Chroma> {
    let mut pos = 2;
    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            return None;
        }
        let marker = data[pos + 1];
        if marker == 0xFF {
            pos += 1;
            continue;
        }
        if marker == SOS {
            return None;
        }
        let len = usize::from(u16::from_be_bytes([data[pos + 2], data[pos + 3]]));
        let segment = data.get(pos + 4..pos + 2 + len)?;
        // SOF0..SOF15 minus DHT, JPG and DAC
        if matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC) {
            return frame_chroma(segment);
        }
        pos += 2 + len;
    }
    None
}

fn frame_chroma(sof: &[u8]) -> Option<Chroma> {
    // precision, height, width, component count, then (id, HV, table) each
    let count = usize::from(*sof.get(5)?);
    let components = sof.get(6..6 + 3 * count)?;
    let factors: Vec<u8> = components.chunks_exact(3).map(|c| c[1]).collect();
    match factors.as_slice() {
        [0x11, 0x11, 0x11] => Some(Chroma::Yuv444),
        [0x22, 0x11, 0x11] => Some(Chroma::Yuv420),
        _ => None,
    }
}

/// Average 2x2 blocks, rounding to nearest. Edge blocks of odd-sized planes
/// average the samples they have.
fn halve(plane: &[u8], width: usize, height: usize) -> Vec<u8> {
    let (cw, ch) = (width.div_ceil(2), height.div_ceil(2));
    let mut out = Vec::with_capacity(cw * ch);
    for cy in 0..ch {
        let rows = cy * 2..(cy * 2 + 2).min(height);
        for cx in 0..cw {
            let cols = cx * 2..(cx * 2 + 2).min(width);
            let mut sum = 0u32;
            let mut n = 0u32;
            for y in rows.clone() {
                for &s in &plane[y * width + cols.start..y * width + cols.end] {
                    sum += u32::from(s);
                    n += 1;
                }
            }
            out.push(((sum + n / 2) / n) as u8);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soi_detection() {
        assert!(is_jpeg(b"\xFF\xD8\xFF\xE0\x00\x10JFIF\x00"));
        assert!(!is_jpeg(b"\xFF\xD8"));
        assert!(!is_jpeg(b"\x00\x00\x00\x1cftypavif"));
    }

    #[test]
    fn halve_averages_blocks() {
        #[rustfmt::skip]
        let plane = [
            10, 20, 30, 31,
            30, 40, 30, 31,
        ];
        assert_eq!(halve(&plane, 4, 2), vec![25, 31]);
    }

    #[test]
    fn halve_odd_edges() {
        #[rustfmt::skip]
        let plane = [
            10, 20, 200,
            30, 40, 100,
            50, 60, 7,
        ];
        // right column pairs, bottom row pairs, lone corner
        assert_eq!(halve(&plane, 3, 3), vec![25, 150, 55, 7]);
    }

    #[test]
    fn frame_header_layouts() {
        let sof = |y: u8, c: u8| {
            vec![8, 0, 16, 0, 16, 3, 1, y, 0, 2, c, 1, 3, c, 1]
        };
        assert_eq!(frame_chroma(&sof(0x11, 0x11)), Some(Chroma::Yuv444));
        assert_eq!(frame_chroma(&sof(0x22, 0x11)), Some(Chroma::Yuv420));
        assert_eq!(frame_chroma(&sof(0x21, 0x11)), None); // 4:2:2
        assert_eq!(frame_chroma(&[8, 0, 16, 0, 16, 1, 1, 0x11, 0]), None); // grey
        assert_eq!(frame_chroma(&[8, 0, 16]), None);
    }

    #[test]
    fn header_scan_stops_at_scan_data() {
        // SOI, APP0 (len 4), SOS
        let data = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x04, 0xAA, 0xBB, 0xFF, 0xDA, 0x00, 0x02];
        assert_eq!(stored_chroma(&data), None);

        // SOI, SOF0 with 2x2 luma
        let mut data = vec![0xFF, 0xD8, 0xFF, 0xC0, 0x00, 17];
        data.extend_from_slice(&[8, 0, 16, 0, 16, 3, 1, 0x22, 0, 2, 0x11, 1, 3, 0x11, 1]);
        assert_eq!(stored_chroma(&data), Some(Chroma::Yuv420));
        assert_eq!(stored_chroma(&data[..10]), None);
    }
}
