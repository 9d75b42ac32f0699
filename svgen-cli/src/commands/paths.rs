//! `--debug-paths`: show where the launcher looks for the server files

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::bootstrap::PackageLayout;
use crate::config::LauncherConfig;
use crate::error::Result;

fn status(path: &Path) -> &'static str {
    if path.exists() { "exists" } else { "missing" }
}

/// Sorted entry names of `dir`, empty when it cannot be read
fn contents(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

/// Report every resolved layout path and whether it is on disk
pub fn describe_layout(layout: &PackageLayout) -> String {
    let mut out = String::from("🔍 svg-generator-mcp package paths\n");

    let _ = writeln!(out, "Package root: {} ({})", layout.root.display(), status(&layout.root));
    if layout.root.is_dir() {
        let _ = writeln!(out, "Contents: [{}]", contents(&layout.root).join(", "));
    }
    let _ = writeln!(out, "Manifest: {} ({})", layout.manifest.display(), status(&layout.manifest));
    let _ = writeln!(
        out,
        "Dependencies: {} ({})",
        layout.dependency_dir.display(),
        status(&layout.dependency_dir)
    );

    if let Some(build_dir) = layout.entry.parent() {
        let _ = writeln!(out, "Build dir: {} ({})", build_dir.display(), status(build_dir));
        if build_dir.is_dir() {
            let _ = writeln!(out, "Build contents: [{}]", contents(build_dir).join(", "));
        }
    }
    let _ = writeln!(out, "Server entry: {} ({})", layout.entry.display(), status(&layout.entry));
    out
}

/// Resolve the package the way a launch would and print its paths
pub fn print_package_paths(package_root: Option<PathBuf>) -> Result<()> {
    let root = match package_root {
        Some(root) => root,
        None => PackageLayout::discover_root()?,
    };
    let config = LauncherConfig::load(&root)?;
    print!("{}", describe_layout(&PackageLayout::new(root, &config)));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_missing_build() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("package.json"), "{}").unwrap();
        std::fs::create_dir(dir.path().join("node_modules")).unwrap();

        let layout = PackageLayout::new(dir.path(), &LauncherConfig::default());
        let text = describe_layout(&layout);

        assert!(text.contains("Contents: [node_modules, package.json]"));
        assert!(text.contains(&format!("Manifest: {} (exists)", layout.manifest.display())));
        let deps = layout.dependency_dir.display();
        assert!(text.contains(&format!("Dependencies: {deps} (exists)")));
        let build_dir = dir.path().join("dist");
        assert!(text.contains(&format!("Build dir: {} (missing)", build_dir.display())));
        assert!(text.contains(&format!("Server entry: {} (missing)", layout.entry.display())));
        assert!(!text.contains("Build contents"));
    }

    #[test]
    fn test_describe_lists_build_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("dist")).unwrap();
        std::fs::write(dir.path().join("dist/index.js"), "").unwrap();

        let layout = PackageLayout::new(dir.path(), &LauncherConfig::default());
        let text = describe_layout(&layout);

        assert!(text.contains("Build contents: [index.js]"));
        assert!(text.contains(&format!("Server entry: {} (exists)", layout.entry.display())));
        assert!(text.contains(&format!("Manifest: {} (missing)", layout.manifest.display())));
    }
}
