//! constgen: resolve native platform constants into generated Rust source.
//!
//! Platform files (`*_windows.rs` and friends) refer to native constants
//! through placeholder identifiers like `_WM_COMMAND`. `constgen` scans a
//! package for them, compiles a small C program against the target's
//! headers that prints each value, and stores the output as
//! `zconstants_<os>_<arch>.rs` next to the scanned sources.
//!
//! The stages run in order and each returns a [`Result`]:
//! [`scanner`] → [`classifier`] → [`resolver`] → [`executor`] → [`output`].

pub mod classifier;
pub mod config;
pub mod error;
pub mod executor;
pub mod output;
pub mod resolver;
pub mod scanner;

use std::path::{Path, PathBuf};

pub use classifier::{classify, Classification, DeclKind, IdentifierClassifier, ResolutionSet};
pub use config::{Config, TargetArch, TargetOs, TargetPlatform};
pub use error::{ConstGenError, Result};
pub use executor::{CrossCompileExecutor, Toolchain};
pub use output::OutputWriter;
pub use resolver::ResolverProgram;
pub use scanner::{scan_package, Package};

/// One generation run
#[derive(Debug, Clone)]
pub struct Request {
    pub dir: PathBuf,
    pub arch: TargetArch,
    pub config: Config,
}

impl Request {
    /// Build a request with `constgen.toml` from `dir` and environment overrides applied
    pub fn from_dir(dir: &Path, arch: TargetArch) -> Result<Self> {
        let config = Config::load(dir)?.with_env_overrides();
        Ok(Self {
            dir: dir.to_path_buf(),
            arch,
            config,
        })
    }

    pub fn platform(&self) -> TargetPlatform {
        TargetPlatform::new(self.config.target_os, self.arch)
    }
}

/// Outcome of a successful run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateReport {
    pub package: String,
    pub destination: PathBuf,
    pub constants: usize,
}

/// Scan, classify, build, execute and write. Nothing is written unless every
/// placeholder in the package resolves.
pub fn generate(request: &Request) -> Result<GenerateReport> {
    let platform = request.platform();
    let config = &request.config;
    tracing::info!(
        "generating constants for {} from {}",
        platform.triple(),
        request.dir.display()
    );

    let package = scan_package(&request.dir, &platform.os.file_suffix())?;
    let classification = classify(&package)?;
    let set = ResolutionSet::from_classification(&classification)?;
    let program = ResolverProgram::build(&set, &config.headers());

    let toolchain = Toolchain::discover(&platform, config)?;
    let executor = CrossCompileExecutor::new(
        platform,
        toolchain,
        config.resolved_include_dirs(&request.dir),
    )?;
    let writer = OutputWriter::create(&request.dir, &config.output_prefix, &platform)?;
    executor.execute(&program, writer.sink()?)?;
    let destination = writer.commit()?;

    Ok(GenerateReport {
        package: package.name,
        destination,
        constants: program.statements(),
    })
}
