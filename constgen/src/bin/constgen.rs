// constgen command-line driver
// Usage: constgen <PATH> <ARCH>

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use constgen::{generate, Request, TargetArch};

#[derive(Parser)]
#[command(name = "constgen")]
#[command(about = "Resolve native platform constants into a generated Rust source file")]
#[command(version)]
struct Args {
    /// Directory holding the platform source files to scan
    #[arg(value_name = "PATH")]
    path: PathBuf,

    /// Target architecture (x86_64/amd64, x86/i686/386, aarch64/arm64)
    #[arg(value_name = "ARCH")]
    arch: TargetArch,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("constgen=info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let args = Args::parse();

    let result = Request::from_dir(&args.path, args.arch).and_then(|request| generate(&request));
    match result {
        Ok(report) => {
            tracing::info!(
                "{}: {} constant(s) written to {}",
                report.package,
                report.constants,
                report.destination.display()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("constgen: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
