//! Collects and parses the platform files of a package.

use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ConstGenError, Result};

const MANIFEST: &str = "Cargo.toml";

/// One parsed platform file
pub struct SourceFile {
    pub path: PathBuf,
    pub syntax: syn::File,
}

/// Every platform file of a single package, in path order
pub struct Package {
    pub name: String,
    pub root: PathBuf,
    pub files: Vec<SourceFile>,
}

#[derive(Deserialize)]
struct Manifest {
    package: Option<ManifestPackage>,
}

#[derive(Deserialize)]
struct ManifestPackage {
    name: String,
}

/// Parse every file under `dir` whose name ends with `suffix`.
///
/// All matching files must share one package root (the nearest ancestor
/// holding a `Cargo.toml`); a nested crate inside the scanned tree is an error.
pub fn scan_package(dir: &Path, suffix: &str) -> Result<Package> {
    let dir = fs::canonicalize(dir).map_err(|e| ConstGenError::io(dir, e))?;

    let mut paths = Vec::new();
    collect_files(&dir, suffix, &mut paths)?;
    if paths.is_empty() {
        return Err(ConstGenError::NoSources {
            dir,
            suffix: suffix.to_string(),
        });
    }
    paths.sort();

    let roots: BTreeSet<PathBuf> = paths
        .iter()
        .map(|path| package_root(path).unwrap_or_else(|| dir.clone()))
        .collect();
    if roots.len() > 1 {
        return Err(ConstGenError::AmbiguousPackage {
            dir,
            roots: roots.iter().map(|r| r.display().to_string()).collect(),
        });
    }
    let root = roots.into_iter().next().unwrap_or_else(|| dir.clone());
    let name = package_name(&root)?;

    let files = paths
        .into_iter()
        .map(parse_source)
        .collect::<Result<Vec<_>>>()?;

    tracing::info!(
        "scanned package '{}' ({} file(s) matching *{})",
        name,
        files.len(),
        suffix
    );
    Ok(Package { name, root, files })
}

fn collect_files(dir: &Path, suffix: &str, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = fs::read_dir(dir).map_err(|e| ConstGenError::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| ConstGenError::io(dir, e))?;
        let path = entry.path();
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();
        let file_type = entry.file_type().map_err(|e| ConstGenError::io(&path, e))?;

        if file_type.is_dir() {
            if file_name.starts_with('.') || file_name == "target" {
                continue;
            }
            collect_files(&path, suffix, out)?;
        } else if file_type.is_file() && file_name.ends_with(suffix) {
            out.push(path);
        }
    }
    Ok(())
}

fn package_root(file: &Path) -> Option<PathBuf> {
    file.ancestors()
        .skip(1)
        .find(|dir| dir.join(MANIFEST).is_file())
        .map(Path::to_path_buf)
}

fn package_name(root: &Path) -> Result<String> {
    let manifest_path = root.join(MANIFEST);
    if manifest_path.is_file() {
        let content = fs::read_to_string(&manifest_path)
            .map_err(|e| ConstGenError::io(&manifest_path, e))?;
        let manifest: Manifest = toml::from_str(&content).map_err(|e| ConstGenError::Config {
            path: manifest_path.clone(),
            message: e.to_string(),
        })?;
        if let Some(package) = manifest.package {
            return Ok(package.name);
        }
    } else {
        tracing::warn!("no {} above {}, naming package after directory", MANIFEST, root.display());
    }

    Ok(root
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "main".to_string()))
}

fn parse_source(path: PathBuf) -> Result<SourceFile> {
    let content = fs::read_to_string(&path).map_err(|e| ConstGenError::io(&path, e))?;
    match syn::parse_file(&content) {
        Ok(syntax) => Ok(SourceFile { path, syntax }),
        Err(e) => {
            let start = e.span().start();
            Err(ConstGenError::Parse {
                path,
                line: start.line,
                column: start.column + 1,
                message: e.to_string(),
            })
        }
    }
}
