use std::path::PathBuf;
use std::process::ExitStatus;

use crate::classifier::DeclKind;

/// Errors that can occur while generating a constants file
#[derive(Debug, thiserror::Error)]
pub enum ConstGenError {
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no files ending in '{suffix}' found under '{}'", dir.display())]
    NoSources { dir: PathBuf, suffix: String },

    #[error("more than one package found under '{}': {}", dir.display(), roots.join(", "))]
    AmbiguousPackage { dir: PathBuf, roots: Vec<String> },

    #[error("parse error in '{}' at {line}:{column}: {message}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        column: usize,
        message: String,
    },

    #[error("{name} ({found}) already known to be a {previous}")]
    ClassificationConflict {
        name: String,
        previous: DeclKind,
        found: DeclKind,
    },

    #[error("the following are still unknown!\n{}", names.join("\n"))]
    UnresolvedIdentifiers { names: Vec<String> },

    #[error("{name} must be declared with a plain integer type path to hold a native value")]
    UnsupportedType { name: String },

    #[error("unsupported target architecture '{0}' (expected x86_64, x86 or aarch64)")]
    UnsupportedArch(String),

    #[error("invalid configuration in '{}': {message}", path.display())]
    Config { path: PathBuf, message: String },

    #[error("'{compiler}' not found on PATH (needed to build and run for {triple})")]
    ToolchainNotFound { compiler: String, triple: String },

    #[error("resolver program failed during {stage}: {status}")]
    ResolverFailed {
        stage: ResolverStage,
        status: ExitStatus,
    },
}

/// Which half of the resolver invocation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverStage {
    Compile,
    Run,
}

impl std::fmt::Display for ResolverStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolverStage::Compile => write!(f, "compilation"),
            ResolverStage::Run => write!(f, "execution"),
        }
    }
}

impl ConstGenError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConstGenError::Io {
            path: path.into(),
            source,
        }
    }

    /// Process exit status for this error. A failing resolver program exits 1
    /// regardless of its own status; every other failure exits 2.
    pub fn exit_code(&self) -> u8 {
        match self {
            ConstGenError::ResolverFailed { .. } => 1,
            _ => 2,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConstGenError>;
