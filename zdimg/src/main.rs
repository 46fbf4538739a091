//! zdimg: AVIF/HEIC inspector and converter.
//!
//! Thin front end over zendyn: reports which native backends loaded, reads
//! container headers, converts AVIF/HEIC to single-frame YUV4MPEG2, and
//! encodes YUV4MPEG2 or JPEG input to AVIF.

mod batch;
mod convert;
mod info;
mod output;
mod y4m;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "zdimg", version, about)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). `RUST_LOG` takes priority.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report which native backends loaded.
    Backends(BackendsArgs),

    /// Show container format and dimensions without decoding.
    Info(InfoArgs),

    /// Decode an AVIF or HEIC file to YUV4MPEG2.
    Decode(ConvertArgs),

    /// Encode a YUV4MPEG2 frame or a JPEG to AVIF.
    Encode(ConvertArgs),
}

/// Arguments for the `backends` subcommand.
#[derive(Parser, Debug)]
pub struct BackendsArgs {
    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` subcommand.
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Input files, directories or glob patterns.
    #[arg(required = true)]
    pub files: Vec<String>,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `decode` and `encode`.
#[derive(Parser, Debug)]
pub struct ConvertArgs {
    /// Input file.
    pub input: PathBuf,

    /// Output file.
    #[arg(short, long)]
    pub output: PathBuf,

    /// Allow overwriting an existing output file.
    #[arg(long)]
    pub force: bool,

    /// Reject images wider than this.
    #[arg(long, env = "ZDIMG_MAX_WIDTH")]
    pub max_width: Option<u32>,

    /// Reject images taller than this.
    #[arg(long, env = "ZDIMG_MAX_HEIGHT")]
    pub max_height: Option<u32>,
}

impl ConvertArgs {
    pub fn limits(&self) -> zendyn::Limits {
        let mut limits = zendyn::Limits::none();
        limits.max_width = self.max_width;
        limits.max_height = self.max_height;
        limits
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Backends(args) => info::backends(args),
        Command::Info(args) => info::run(args),
        Command::Decode(args) => convert::decode(args),
        Command::Encode(args) => convert::encode(args),
    }
}
