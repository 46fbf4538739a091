//! `decode` and `encode` subcommands.

use std::fs::File;
use std::io::{BufWriter, Write};

use anyhow::Context;
use tracing::info;
use zendyn::{CodecError, DecodeRequest, EncodeRequest, JpegFrame, Limits, YuvImage};

use crate::ConvertArgs;
use crate::{batch, output, y4m};

/// AVIF/HEIC in, YUV4MPEG2 out.
pub fn decode(args: ConvertArgs) -> anyhow::Result<()> {
    output::check_writable(&args.input, &args.output, args.force)?;
    let data = std::fs::read(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;

    let limits = args.limits();
    let decoded = DecodeRequest::new(&data)
        .with_limits(&limits)
        .decode()
        .with_context(|| format!("decoding {}", args.input.display()))?;
    info!(
        container = ?decoded.container(),
        backend = %decoded.backend(),
        "decoded {}x{} {}",
        decoded.width(),
        decoded.height(),
        decoded.format()
    );

    output::ensure_parent(&args.output)?;
    let file = File::create(&args.output)
        .with_context(|| format!("creating {}", args.output.display()))?;
    let mut out = BufWriter::new(file);
    y4m::write(&decoded.image(), &mut out)?;
    out.flush()?;

    eprintln!(
        "{}x{} {} -> {}",
        decoded.width(),
        decoded.height(),
        decoded.format(),
        args.output.display()
    );
    decoded.free();
    Ok(())
}

/// Frame read for encoding.
#[derive(Debug)]
enum Source {
    Jpeg(JpegFrame),
    Y4m(y4m::Frame),
}

impl Source {
    /// JPEG when the data starts with a JPEG marker, YUV4MPEG2 otherwise.
    fn read(data: &[u8], limits: &Limits) -> anyhow::Result<Self> {
        if zendyn::is_jpeg(data) {
            Ok(Source::Jpeg(JpegFrame::decode_with(data, None, limits)?))
        } else {
            Ok(Source::Y4m(y4m::parse(data)?))
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Source::Jpeg(_) => "jpeg",
            Source::Y4m(_) => "y4m",
        }
    }

    fn image(&self) -> Result<YuvImage<'_>, CodecError> {
        match self {
            Source::Jpeg(frame) => frame.image(),
            Source::Y4m(frame) => frame.image(),
        }
    }
}

/// YUV4MPEG2 or JPEG in, AVIF out.
pub fn encode(args: ConvertArgs) -> anyhow::Result<()> {
    output::check_writable(&args.input, &args.output, args.force)?;
    let data = std::fs::read(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;

    let limits = args.limits();
    let source =
        Source::read(&data, &limits).with_context(|| format!("reading {}", args.input.display()))?;
    let image = source.image()?;
    info!(input = source.kind(), "encoding {}x{} {}", image.width(), image.height(), image.format());

    let encoded = EncodeRequest::new(&image)
        .with_limits(&limits)
        .encode()
        .with_context(|| format!("encoding {}", args.input.display()))?;

    output::ensure_parent(&args.output)?;
    std::fs::write(&args.output, encoded.as_bytes())
        .with_context(|| format!("writing {}", args.output.display()))?;

    eprintln!(
        "{}x{} {} -> {} ({})",
        image.width(),
        image.height(),
        image.format(),
        args.output.display(),
        batch::format_size(encoded.len() as u64)
    );
    zendyn::free(encoded);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_follows_magic() {
        let stream = b"YUV4MPEG2 W2 H2 C444\nFRAME\n\x10\x10\x10\x10\x80\x80\x80\x80\x80\x80\x80\x80";
        let source = Source::read(stream, &Limits::none()).unwrap();
        assert_eq!(source.kind(), "y4m");
        assert_eq!(source.image().unwrap().width(), 2);

        // JPEG marker followed by garbage is reported as a JPEG error
        let err = Source::read(b"\xFF\xD8\xFF\xE0\x00\x02", &Limits::none()).unwrap_err();
        assert!(
            matches!(err.downcast_ref::<CodecError>(), Some(CodecError::Jpeg(_))),
            "{err}"
        );
    }
}
