//! Flags that short-circuit the launch pipeline

use assert_cmd::Command;

fn launcher() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_svg-generator-mcp"));
    // An empty PATH proves the flags never look for node or npm
    cmd.env("PATH", "");
    cmd
}

#[test]
fn test_version_flag() {
    let output = launcher().arg("--version").output().unwrap();

    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        format!("svg-generator-mcp {}", env!("CARGO_PKG_VERSION"))
    );
}

#[test]
fn test_help_setup_prints_client_config() {
    let output = launcher().arg("--help-setup").output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("MCP Client Setup Instructions:"));
    assert!(stdout.contains("\"mcpServers\""));
    assert!(stdout.contains("\"command\": \"uvx\""));
    assert!(stdout.contains("\"svg-generator-mcp\""));
    assert!(output.stderr.is_empty());
}

#[test]
fn test_help_setup_ignores_missing_package() {
    let dir = tempfile::tempdir().unwrap();
    launcher()
        .arg("--help-setup")
        .arg("--package-root")
        .arg(dir.path())
        .assert()
        .success();
}

#[test]
fn test_debug_paths_reports_each_path() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("package.json"), "{}").unwrap();
    std::fs::create_dir_all(dir.path().join("dist")).unwrap();
    std::fs::write(dir.path().join("dist/index.js"), "").unwrap();

    let output = launcher()
        .arg("--debug-paths")
        .arg("--package-root")
        .arg(dir.path())
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let root = dir.path().display();
    assert!(stdout.contains(&format!("Package root: {root} (exists)")));
    assert!(stdout.contains("Contents: [dist, package.json]"));
    assert!(stdout.contains(&format!("Manifest: {root}/package.json (exists)")));
    assert!(stdout.contains(&format!("Dependencies: {root}/node_modules (missing)")));
    assert!(stdout.contains(&format!("Server entry: {root}/dist/index.js (exists)")));
}

#[test]
fn test_debug_paths_rejects_bad_launcher_config() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("launcher.toml"), "entry = [").unwrap();

    let output = launcher()
        .arg("--debug-paths")
        .arg("--package-root")
        .arg(dir.path())
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Error: failed to parse"));
}
