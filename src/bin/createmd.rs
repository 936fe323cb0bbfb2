use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use createmd::repodata;

/// RPM repository metadata creator
#[derive(Parser)]
#[command(name = "createmd", version, about)]
struct Args {
    /// Update metadata instead of regenerating it
    #[arg(short, long)]
    update: bool,

    /// Directories containing the RPM files
    #[arg(value_name = "path")]
    paths: Vec<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if args.paths.is_empty() {
        eprintln!("Usage: createmd /path/to/rpm/files");
        return ExitCode::from(1);
    }

    for path in &args.paths {
        let result = if args.update {
            repodata::update(path)
        } else {
            repodata::create(path)
        };
        if let Err(e) = result {
            error!("Couldn't generate metadata for {}, ignoring: {e}", path.display());
        }
    }
    ExitCode::SUCCESS
}
