//! Backend report and header inspection.

use std::path::Path;

use serde::Serialize;
use zendyn::{BackendKind, ContainerFormat};

use crate::batch;
use crate::{BackendsArgs, InfoArgs};

#[derive(Debug, Serialize)]
struct BackendDisplay {
    name: &'static str,
    loaded: bool,
    formats: Vec<&'static str>,
    encode: bool,
}

fn describe(kind: BackendKind, loaded: bool) -> BackendDisplay {
    let formats: Vec<ContainerFormat> = ContainerFormat::handled_by(kind).collect();
    BackendDisplay {
        name: kind.library_name(),
        loaded,
        formats: formats
            .iter()
            .flat_map(|f| f.extensions().iter().copied())
            .collect(),
        encode: formats.iter().any(|f| f.supports_encode()),
    }
}

/// Run the `backends` subcommand.
pub fn backends(args: BackendsArgs) -> anyhow::Result<()> {
    let caps = zendyn::load();
    let report: Vec<BackendDisplay> = BackendKind::ALL
        .into_iter()
        .map(|kind| describe(kind, caps.contains(kind)))
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for b in &report {
        println!(
            "{:<8} {:<10} {}{}",
            b.name,
            if b.loaded { "loaded" } else { "missing" },
            b.formats.join(", "),
            if b.encode { " (decode, encode)" } else { " (decode)" }
        );
    }
    if !caps.has_any() {
        eprintln!(
            "no backends found; set {} or {} to a library path",
            zendyn::AVIF_LIBRARY_ENV,
            zendyn::HEIF_LIBRARY_ENV
        );
    }
    Ok(())
}

/// Run the `info` subcommand.
pub fn run(args: InfoArgs) -> anyhow::Result<()> {
    let files = batch::expand_inputs(&args.files)?;

    if files.is_empty() {
        anyhow::bail!("no image files found");
    }

    let multi = files.len() > 1;
    let mut failed = 0usize;

    for (i, path) in files.iter().enumerate() {
        if multi && !args.json {
            if i > 0 {
                println!();
            }
            println!("{}:", path.display());
        }

        match inspect_file(path) {
            Ok(info) => {
                if args.json {
                    println!("{}", serde_json::to_string_pretty(&info)?);
                } else {
                    print_info(&info);
                }
            }
            Err(e) => {
                failed += 1;
                eprintln!("  error: {e}");
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} files could not be read", files.len());
    }
    Ok(())
}

/// Read the header of a single file.
fn inspect_file(path: &Path) -> anyhow::Result<ImageInfoDisplay> {
    let data = std::fs::read(path)?;
    let file_size = data.len() as u64;
    let dims = zendyn::config(&data)?;
    // config succeeded, so the signature is known
    let format = ContainerFormat::detect(&data);

    Ok(ImageInfoDisplay {
        path: path.display().to_string(),
        format: format.map(|f| format!("{f:?}")).unwrap_or_default(),
        mime_type: format.map(|f| f.mime_type().to_string()).unwrap_or_default(),
        backend: format.map(|f| f.backend().library_name()).unwrap_or_default(),
        width: dims.width,
        height: dims.height,
        file_size,
    })
}

#[derive(Debug, Serialize)]
struct ImageInfoDisplay {
    path: String,
    format: String,
    mime_type: String,
    backend: &'static str,
    width: u32,
    height: u32,
    file_size: u64,
}

fn print_info(info: &ImageInfoDisplay) {
    println!("  Format:       {} ({})", info.format, info.mime_type);
    println!("  Dimensions:   {}x{}", info.width, info.height);
    println!("  Backend:      {}", info.backend);
    println!("  File size:    {}", batch::format_size(info.file_size));
}
