//! The generated `zconstants_<os>_<arch>.rs` file.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::config::TargetPlatform;
use crate::error::{ConstGenError, Result};

/// Path of the generated file for `platform` inside `dir`
pub fn destination_path(dir: &Path, prefix: &str, platform: &TargetPlatform) -> PathBuf {
    dir.join(format!("{}_{}_{}.rs", prefix, platform.os, platform.arch))
}

/// First line of every generated file
pub fn preamble(platform: &TargetPlatform) -> String {
    format!(
        "// autogenerated by constgen for {}; do not edit\n",
        platform.triple()
    )
}

/// Stages the generated file next to its destination and swaps it in on
/// `commit`. Dropping an uncommitted writer deletes the staging file and
/// leaves any previous output untouched.
pub struct OutputWriter {
    destination: PathBuf,
    staging: NamedTempFile,
}

impl OutputWriter {
    pub fn create(dir: &Path, prefix: &str, platform: &TargetPlatform) -> Result<Self> {
        let destination = destination_path(dir, prefix, platform);
        let mut staging = tempfile::Builder::new()
            .prefix(".constgen")
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(|e| ConstGenError::io(dir, e))?;

        staging
            .write_all(preamble(platform).as_bytes())
            .and_then(|_| staging.flush())
            .map_err(|e| ConstGenError::io(staging.path(), e))?;

        tracing::debug!(
            "staging {} at {}",
            destination.display(),
            staging.path().display()
        );
        Ok(Self {
            destination,
            staging,
        })
    }

    /// A handle positioned after the preamble, for the resolver's stdout
    pub fn sink(&self) -> Result<File> {
        self.staging
            .as_file()
            .try_clone()
            .map_err(|e| ConstGenError::io(self.staging.path(), e))
    }

    /// Replace the destination with the staged contents
    pub fn commit(self) -> Result<PathBuf> {
        let Self {
            destination,
            staging,
        } = self;
        staging
            .as_file()
            .sync_all()
            .map_err(|e| ConstGenError::io(staging.path(), e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(staging.path(), std::fs::Permissions::from_mode(0o644))
                .map_err(|e| ConstGenError::io(staging.path(), e))?;
        }

        staging
            .persist(&destination)
            .map_err(|e| ConstGenError::io(&destination, e.error))?;
        tracing::info!("wrote {}", destination.display());
        Ok(destination)
    }
}
