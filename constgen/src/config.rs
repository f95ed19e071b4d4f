//! Target platform selection and the optional `constgen.toml` file.
//!
//! The configuration file lives next to the scanned sources. Every key is
//! optional; a missing file means "Windows target with the Windows headers".

use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{ConstGenError, Result};

/// Name of the configuration file looked up in the scanned directory
pub const CONFIG_FILE_NAME: &str = "constgen.toml";

/// Overrides the C compiler used for the resolver program
pub const CONSTGEN_CC: &str = "CONSTGEN_CC";
/// Overrides the program used to run a resolver built for another platform
pub const CONSTGEN_RUNNER: &str = "CONSTGEN_RUNNER";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetOs {
    #[default]
    Windows,
    Linux,
    Macos,
}

impl TargetOs {
    pub fn name(&self) -> &'static str {
        match self {
            TargetOs::Windows => "windows",
            TargetOs::Linux => "linux",
            TargetOs::Macos => "macos",
        }
    }

    /// Platform files are recognised by this filename suffix
    pub fn file_suffix(&self) -> String {
        format!("_{}.rs", self.name())
    }

    pub fn default_headers(&self) -> Vec<String> {
        match self {
            TargetOs::Windows => vec!["windows.h".to_string(), "commctrl.h".to_string()],
            TargetOs::Linux | TargetOs::Macos => Vec::new(),
        }
    }

    pub fn host() -> Option<TargetOs> {
        match std::env::consts::OS {
            "windows" => Some(TargetOs::Windows),
            "linux" => Some(TargetOs::Linux),
            "macos" => Some(TargetOs::Macos),
            _ => None,
        }
    }
}

impl fmt::Display for TargetOs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetArch {
    X86_64,
    X86,
    Aarch64,
}

impl TargetArch {
    /// Canonical name, also used in the generated file name
    pub fn name(&self) -> &'static str {
        match self {
            TargetArch::X86_64 => "x86_64",
            TargetArch::X86 => "x86",
            TargetArch::Aarch64 => "aarch64",
        }
    }

    /// Architecture component of target triples
    pub fn triple_arch(&self) -> &'static str {
        match self {
            TargetArch::X86_64 => "x86_64",
            TargetArch::X86 => "i686",
            TargetArch::Aarch64 => "aarch64",
        }
    }

    pub fn host() -> Option<TargetArch> {
        std::env::consts::ARCH.parse().ok()
    }
}

impl FromStr for TargetArch {
    type Err = ConstGenError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "x86_64" | "amd64" => Ok(TargetArch::X86_64),
            "x86" | "i686" | "i386" | "386" => Ok(TargetArch::X86),
            "aarch64" | "arm64" => Ok(TargetArch::Aarch64),
            other => Err(ConstGenError::UnsupportedArch(other.to_string())),
        }
    }
}

impl fmt::Display for TargetArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The foreign operating system and architecture the resolver runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetPlatform {
    pub os: TargetOs,
    pub arch: TargetArch,
}

impl TargetPlatform {
    pub fn new(os: TargetOs, arch: TargetArch) -> Self {
        Self { os, arch }
    }

    pub fn triple(&self) -> String {
        let arch = self.arch.triple_arch();
        match self.os {
            TargetOs::Windows => format!("{}-pc-windows-gnu", arch),
            TargetOs::Linux => format!("{}-unknown-linux-gnu", arch),
            TargetOs::Macos => format!("{}-apple-darwin", arch),
        }
    }

    /// Whether binaries built for this platform run directly on the host
    pub fn is_host(&self) -> bool {
        TargetOs::host() == Some(self.os) && TargetArch::host() == Some(self.arch)
    }

    pub fn executable_name(&self, stem: &str) -> String {
        match self.os {
            TargetOs::Windows => format!("{}.exe", stem),
            TargetOs::Linux | TargetOs::Macos => stem.to_string(),
        }
    }
}

impl fmt::Display for TargetPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}

/// Contents of `constgen.toml`
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub target_os: TargetOs,
    /// Native headers included by the resolver; `None` means the target's defaults
    pub headers: Option<Vec<String>>,
    /// Extra include directories, relative to the scanned directory
    pub include_dirs: Vec<PathBuf>,
    pub compiler: Option<String>,
    pub runner: Option<String>,
    pub output_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_os: TargetOs::default(),
            headers: None,
            include_dirs: Vec::new(),
            compiler: None,
            runner: None,
            output_prefix: "zconstants".to_string(),
        }
    }
}

impl Config {
    /// Load `constgen.toml` from `dir`, falling back to defaults when absent
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE_NAME);
        if !path.is_file() {
            tracing::debug!("no {} in {}, using defaults", CONFIG_FILE_NAME, dir.display());
            return Ok(Config::default());
        }
        Self::from_file(&path)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConstGenError::io(path, e))?;
        toml::from_str(&content).map_err(|e| ConstGenError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Apply `CONSTGEN_CC` and `CONSTGEN_RUNNER` from the process environment
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(cc) = lookup(CONSTGEN_CC).filter(|v| !v.trim().is_empty()) {
            self.compiler = Some(cc);
        }
        if let Some(runner) = lookup(CONSTGEN_RUNNER).filter(|v| !v.trim().is_empty()) {
            self.runner = Some(runner);
        }
        self
    }

    pub fn headers(&self) -> Vec<String> {
        self.headers
            .clone()
            .unwrap_or_else(|| self.target_os.default_headers())
    }

    pub fn resolved_include_dirs(&self, base: &Path) -> Vec<PathBuf> {
        self.include_dirs.iter().map(|dir| base.join(dir)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arch_aliases() {
        assert_eq!("amd64".parse::<TargetArch>().unwrap(), TargetArch::X86_64);
        assert_eq!("386".parse::<TargetArch>().unwrap(), TargetArch::X86);
        assert_eq!("i686".parse::<TargetArch>().unwrap(), TargetArch::X86);
        assert_eq!("arm64".parse::<TargetArch>().unwrap(), TargetArch::Aarch64);
        assert!(matches!(
            "mips".parse::<TargetArch>(),
            Err(ConstGenError::UnsupportedArch(a)) if a == "mips"
        ));
    }

    #[test]
    fn test_triples() {
        let win32 = TargetPlatform::new(TargetOs::Windows, TargetArch::X86);
        assert_eq!(win32.triple(), "i686-pc-windows-gnu");
        assert_eq!(win32.executable_name("resolve"), "resolve.exe");

        let linux = TargetPlatform::new(TargetOs::Linux, TargetArch::Aarch64);
        assert_eq!(linux.triple(), "aarch64-unknown-linux-gnu");
        assert_eq!(linux.executable_name("resolve"), "resolve");
    }

    #[test]
    fn test_defaults_target_windows() {
        let config = Config::default();
        assert_eq!(config.target_os, TargetOs::Windows);
        assert_eq!(config.headers(), vec!["windows.h", "commctrl.h"]);
        assert_eq!(config.output_prefix, "zconstants");
        assert_eq!(TargetOs::Windows.file_suffix(), "_windows.rs");
    }

    #[test]
    fn test_parse_config_file() {
        let config: Config = toml::from_str(
            r#"
            target_os = "linux"
            headers = ["fcntl.h"]
            include_dirs = ["include"]
            "#,
        )
        .unwrap();
        assert_eq!(config.target_os, TargetOs::Linux);
        assert_eq!(config.headers(), vec!["fcntl.h"]);
        assert_eq!(
            config.resolved_include_dirs(Path::new("/src")),
            vec![PathBuf::from("/src/include")]
        );
        assert_eq!(config.output_prefix, "zconstants");
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "colour = \"blue\"\n").unwrap();
        assert!(matches!(
            Config::load(dir.path()),
            Err(ConstGenError::Config { .. })
        ));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.target_os, TargetOs::Windows);
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::default().with_overrides(|key| match key {
            CONSTGEN_CC => Some("clang".to_string()),
            CONSTGEN_RUNNER => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(config.compiler.as_deref(), Some("clang"));
        assert_eq!(config.runner, None);
    }
}
