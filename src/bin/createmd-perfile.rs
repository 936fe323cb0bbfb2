use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use createmd::repodata::perfile;

/// RPM repository metadata creator (per-package shards)
#[derive(Parser)]
#[command(name = "createmd-perfile", version, about)]
struct Args {
    /// Clean up (remove stale metadata files) only
    #[arg(short, long)]
    cleanup: bool,

    /// Origin identifier to be used (only while generating from scratch)
    #[arg(short, long, value_name = "origin", default_value = "openmandriva")]
    origin: String,

    /// Verbose debugging output
    #[arg(short, long)]
    verbose: bool,

    /// Directories containing the RPM files
    #[arg(value_name = "path")]
    paths: Vec<PathBuf>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    if args.paths.is_empty() {
        eprintln!("Usage: createmd-perfile /path/to/rpm/files");
        return ExitCode::from(1);
    }

    for path in &args.paths {
        if let Err(e) = perfile::run(path, args.cleanup, &args.origin) {
            error!("Couldn't generate metadata for {}, ignoring: {e}", path.display());
        }
    }
    ExitCode::SUCCESS
}
