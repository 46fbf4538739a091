//! Single-frame YUV4MPEG2 reading and writing.
//!
//! Only 8-bit 4:2:0 and 4:4:4 streams are accepted. Frames after the first
//! are ignored.

use std::io::Write;

use anyhow::{Context, bail};
use zendyn::{Chroma, YuvImage};

const MAGIC: &str = "YUV4MPEG2";

/// One frame with tightly packed planes.
#[derive(Debug)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub chroma: Chroma,
    pub planes: [Vec<u8>; 3],
}

impl Frame {
    /// Borrow the frame for encoding.
    pub fn image(&self) -> Result<YuvImage<'_>, zendyn::CodecError> {
        let (cw, _) = self.chroma.chroma_size(self.width, self.height);
        let strides = [self.width as usize, cw as usize, cw as usize];
        let [y, u, v] = &self.planes;
        YuvImage::from_planes(
            self.width,
            self.height,
            self.chroma,
            [y.as_slice(), u.as_slice(), v.as_slice()],
            strides,
        )
    }
}

/// Parse the stream header and the first frame.
pub fn parse(data: &[u8]) -> anyhow::Result<Frame> {
    let (header, rest) = split_line(data).context("missing stream header")?;
    let header = std::str::from_utf8(header).context("stream header is not ASCII")?;
    let mut tokens = header.split(' ');
    if tokens.next() != Some(MAGIC) {
        bail!("not a YUV4MPEG2 stream");
    }

    let (mut width, mut height) = (None, None);
    let mut chroma = Chroma::Yuv420;
    for token in tokens.filter(|t| !t.is_empty()) {
        let Some((tag, value)) = token.split_at_checked(1) else {
            continue;
        };
        match tag {
            "W" => width = Some(value.parse::<u32>().context("bad width")?),
            "H" => height = Some(value.parse::<u32>().context("bad height")?),
            "C" => chroma = parse_colorspace(value)?,
            _ => {}
        }
    }
    let (Some(width), Some(height)) = (width, height) else {
        bail!("stream header lacks W or H");
    };
    if width == 0 || height == 0 {
        bail!("image dimensions must be positive, got {width}x{height}");
    }

    let (frame_header, mut payload) = split_line(rest).context("missing FRAME")?;
    if !frame_header.starts_with(b"FRAME") {
        bail!("expected FRAME, found {:?}", String::from_utf8_lossy(frame_header));
    }

    let (cw, ch) = chroma.chroma_size(width, height);
    let sizes = [
        width as usize * height as usize,
        cw as usize * ch as usize,
        cw as usize * ch as usize,
    ];
    let mut planes: [Vec<u8>; 3] = Default::default();
    for (plane, size) in planes.iter_mut().zip(sizes) {
        if payload.len() < size {
            bail!("truncated frame: need {size} bytes, have {}", payload.len());
        }
        let (head, tail) = payload.split_at(size);
        *plane = head.to_vec();
        payload = tail;
    }

    Ok(Frame {
        width,
        height,
        chroma,
        planes,
    })
}

fn parse_colorspace(value: &str) -> anyhow::Result<Chroma> {
    match value {
        "420" | "420jpeg" | "420paldv" | "420mpeg2" => Ok(Chroma::Yuv420),
        "444" => Ok(Chroma::Yuv444),
        other => bail!("unsupported colorspace C{other}; need 8-bit 420 or 444"),
    }
}

fn split_line(data: &[u8]) -> Option<(&[u8], &[u8])> {
    let end = data.iter().position(|&b| b == b'\n')?;
    Some((&data[..end], &data[end + 1..]))
}

/// Write `image` as a one-frame stream. Row padding is dropped.
pub fn write(image: &YuvImage<'_>, out: &mut impl Write) -> std::io::Result<()> {
    let colorspace = match image.format() {
        Chroma::Yuv420 => "420jpeg",
        Chroma::Yuv444 => "444",
    };
    writeln!(
        out,
        "{MAGIC} W{} H{} F25:1 Ip A1:1 C{colorspace}",
        image.width(),
        image.height()
    )?;
    writeln!(out, "FRAME")?;
    for plane in image.planes() {
        for row in plane.rows() {
            out.write_all(row)?;
        }
    }
    Ok(())
}
