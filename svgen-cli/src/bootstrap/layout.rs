//! Package layout: where the manifest, dependencies and server build live
//!
//! Everything is resolved relative to the package root, which is found from
//! the launcher's own install location.

use snafu::ResultExt;
use std::path::{Path, PathBuf};

use crate::config::{CONFIG_FILE_NAME, DEFAULT_MANIFEST, LauncherConfig};
use crate::error::{PackageRootSnafu, Result};

/// Directory name the server files may be installed under, next to the binary
const RESOURCE_DIR: &str = "svg-generator-mcp";

/// Resolved paths for one launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageLayout {
    pub root: PathBuf,
    pub manifest: PathBuf,
    pub dependency_dir: PathBuf,
    pub entry: PathBuf,
}

impl PackageLayout {
    pub fn new(root: impl Into<PathBuf>, config: &LauncherConfig) -> Self {
        let root = root.into();
        Self {
            manifest: root.join(&config.manifest),
            dependency_dir: root.join(&config.dependency_dir),
            entry: root.join(&config.entry),
            root,
        }
    }

    /// Find the package root from the running executable
    pub fn discover_root() -> Result<PathBuf> {
        let exe = std::env::current_exe().context(PackageRootSnafu)?;
        // Follow symlinks so shims in ~/.local/bin resolve to the real package
        let exe = std::fs::canonicalize(&exe).unwrap_or(exe);
        let exe_dir = exe.parent().map_or_else(|| PathBuf::from("."), Path::to_path_buf);

        let root = find_root(&exe_dir);
        tracing::debug!("package root: {}", root.display());
        Ok(root)
    }
}

/// Places the package may live relative to the executable's directory
fn candidate_roots(exe_dir: &Path) -> Vec<PathBuf> {
    let mut candidates = vec![exe_dir.to_path_buf(), exe_dir.join(RESOURCE_DIR)];

    if exe_dir.file_name().is_some_and(|name| name == "bin") {
        if let Some(prefix) = exe_dir.parent() {
            candidates.push(prefix.to_path_buf());
            candidates.push(prefix.join("share").join(RESOURCE_DIR));
        }
    }

    candidates
}

/// First candidate holding a manifest or launcher config, else `exe_dir`
fn find_root(exe_dir: &Path) -> PathBuf {
    candidate_roots(exe_dir)
        .into_iter()
        .find(|dir| dir.join(DEFAULT_MANIFEST).is_file() || dir.join(CONFIG_FILE_NAME).is_file())
        .unwrap_or_else(|| exe_dir.to_path_buf())
}
