//! Bootstrap pipeline for the packaged MCP server
//!
//! Runs the pre-spawn stages in a fixed order:
//! - Prerequisite checking (required runtimes on PATH)
//! - Dependency install, memoized on the dependency directory
//! - Best-effort acceleration installs
//! - Locating the prebuilt server entry point
//!
//! and hands back the [`ServerCommand`] to run. Any stage failure stops the
//! pipeline with a stage-specific [`LaunchError`](crate::error::LaunchError).

pub mod handoff;
pub mod host;
pub mod installer;
pub mod layout;
pub mod prereq;

use snafu::ensure;
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::config::LauncherConfig;
use crate::error::{MissingBuildSnafu, MissingManifestSnafu, Result};

pub use handoff::{HandoffOutcome, ServerCommand, launch_server};
pub use host::{Host, SystemHost};
pub use installer::{BestEffort, InstallStep, Platform};
pub use layout::PackageLayout;
pub use prereq::{BinaryCheck, check_prerequisites};

/// What `ensure_dependencies` found or did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyState {
    AlreadyInstalled,
    Installed,
}

/// The pre-spawn half of a launch
pub struct Bootstrap<'a, H: Host> {
    host: &'a H,
    config: &'a LauncherConfig,
    layout: PackageLayout,
    resolved: HashMap<String, PathBuf>,
}

impl<'a, H: Host> Bootstrap<'a, H> {
    pub fn new(host: &'a H, config: &'a LauncherConfig, root: impl Into<PathBuf>) -> Self {
        Self {
            host,
            config,
            layout: PackageLayout::new(root, config),
            resolved: HashMap::new(),
        }
    }

    pub fn layout(&self) -> &PackageLayout {
        &self.layout
    }

    /// Run every stage in order and return the server invocation
    pub fn prepare(&mut self) -> Result<ServerCommand> {
        self.check_prerequisites()?;
        self.ensure_dependencies()?;
        // Never observable: the outcome is only logged
        let _ = self.ensure_optional_dependencies(Platform::current());
        let entry = self.locate_server_entry()?.to_path_buf();

        Ok(ServerCommand {
            program: self.program(&self.config.runtime),
            args: vec![OsString::from(entry)],
            cwd: self.layout.root.clone(),
        })
    }

    /// Resolve every configured runtime against PATH, in order
    pub fn check_prerequisites(&mut self) -> Result<Vec<BinaryCheck>> {
        let checks = check_prerequisites(self.host, &self.config.prerequisites)?;
        self.resolved = checks
            .iter()
            .map(|check| (check.name.clone(), check.path.clone()))
            .collect();
        Ok(checks)
    }

    /// Install dependencies unless the dependency directory already exists
    pub fn ensure_dependencies(&self) -> Result<DependencyState> {
        ensure!(
            self.host.exists(&self.layout.manifest),
            MissingManifestSnafu {
                file_name: file_name(&self.layout.manifest),
                path: &self.layout.manifest,
            }
        );

        if self.host.exists(&self.layout.dependency_dir) {
            tracing::debug!(
                "{} present, skipping install",
                self.layout.dependency_dir.display()
            );
            return Ok(DependencyState::AlreadyInstalled);
        }

        eprintln!("Installing Node.js dependencies...");
        let step = InstallStep {
            program: self.program(&self.config.install.program),
            args: self.config.install.args.clone(),
            cwd: self.layout.root.clone(),
        };
        installer::run_required(self.host, &step)?;

        Ok(DependencyState::Installed)
    }

    /// Try to install acceleration packages for `platform`; never fails
    pub fn ensure_optional_dependencies(&self, platform: Platform) -> BestEffort {
        let optional = &self.config.optional;
        if !optional.enabled {
            return BestEffort::skipped(installer::DisabledSnafu.build());
        }

        let spec = match platform {
            Platform::AppleSilicon => optional.apple_silicon.as_ref(),
            Platform::Other => optional.other.as_ref(),
        };
        let Some(spec) = spec else {
            return BestEffort::skipped(installer::UnsupportedSnafu { platform }.build());
        };

        // A missing tool is not worth a spawn attempt
        let Some(program) = self.host.which(&spec.program) else {
            return BestEffort::skipped(
                installer::ToolMissingSnafu {
                    program: &spec.program,
                }
                .build(),
            );
        };

        let step = InstallStep {
            program,
            args: spec.args.clone(),
            cwd: self.layout.root.clone(),
        };
        installer::run_best_effort(self.host, &step)
    }

    /// The server entry point, which must exist before spawn
    pub fn locate_server_entry(&self) -> Result<&Path> {
        ensure!(
            self.host.exists(&self.layout.entry),
            MissingBuildSnafu {
                path: &self.layout.entry,
            }
        );
        Ok(&self.layout.entry)
    }

    /// Path found during the prerequisite check, or the bare name
    fn program(&self, name: &str) -> PathBuf {
        self.resolved
            .get(name)
            .cloned()
            .unwrap_or_else(|| PathBuf::from(name))
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::host::StepOutput;
    use super::host::fake::{FakeHost, Reply};
    use super::installer::OptionalInstallError;
    use super::*;
    use crate::error::LaunchError;
    use std::io;

    const ROOT: &str = "/pkg";

    /// Host with node, npm and python3 on PATH and a complete package
    fn ready_host() -> FakeHost {
        let host = FakeHost::with_binaries(&["node", "npm", "python3"]);
        host.touch("/pkg/package.json");
        host.touch("/pkg/node_modules");
        host.touch("/pkg/dist/index.js");
        host
    }

    #[test]
    fn test_prepare_builds_server_command() {
        let host = ready_host();
        let config = LauncherConfig::default();

        let command = Bootstrap::new(&host, &config, ROOT).prepare().unwrap();
        assert_eq!(command.program, PathBuf::from("/fake/bin/node"));
        assert_eq!(command.args, vec![OsString::from("/pkg/dist/index.js")]);
        assert_eq!(command.cwd, PathBuf::from(ROOT));
    }

    #[test]
    fn test_missing_runtime_stops_before_install() {
        let host = FakeHost::with_binaries(&["npm"]);
        host.touch("/pkg/package.json");
        let config = LauncherConfig::default();

        let err = Bootstrap::new(&host, &config, ROOT).prepare().unwrap_err();
        assert!(matches!(err, LaunchError::MissingRuntime { .. }));
        assert!(host.runs.borrow().is_empty());
    }

    #[test]
    fn test_missing_npm_stops_before_install() {
        let host = FakeHost::with_binaries(&["node"]);
        host.touch("/pkg/package.json");
        let config = LauncherConfig::default();

        let err = Bootstrap::new(&host, &config, ROOT).prepare().unwrap_err();
        assert!(matches!(err, LaunchError::MissingRuntime { ref name, .. } if name == "npm"));
        assert!(!host.ran("npm"));
    }

    #[test]
    fn test_existing_dependency_dir_skips_install() {
        let host = ready_host();
        let config = LauncherConfig::default();
        let mut bootstrap = Bootstrap::new(&host, &config, ROOT);
        bootstrap.check_prerequisites().unwrap();

        assert_eq!(
            bootstrap.ensure_dependencies().unwrap(),
            DependencyState::AlreadyInstalled
        );
        assert!(!host.ran("npm"));
    }

    #[test]
    fn test_install_runs_once_across_launches() {
        let mut host = FakeHost::with_binaries(&["node", "npm"]);
        host.creates
            .insert("npm".to_string(), PathBuf::from("/pkg/node_modules"));
        host.touch("/pkg/package.json");
        let config = LauncherConfig::default();

        let mut first = Bootstrap::new(&host, &config, ROOT);
        first.check_prerequisites().unwrap();
        assert_eq!(
            first.ensure_dependencies().unwrap(),
            DependencyState::Installed
        );

        let mut second = Bootstrap::new(&host, &config, ROOT);
        second.check_prerequisites().unwrap();
        assert_eq!(
            second.ensure_dependencies().unwrap(),
            DependencyState::AlreadyInstalled
        );

        let npm_runs: Vec<_> = host
            .runs
            .borrow()
            .iter()
            .filter(|line| line.starts_with("npm"))
            .cloned()
            .collect();
        assert_eq!(npm_runs, ["npm install --production"]);
    }

    #[test]
    fn test_missing_manifest_is_distinct() {
        let host = FakeHost::with_binaries(&["node", "npm"]);
        let config = LauncherConfig::default();

        let err = Bootstrap::new(&host, &config, ROOT).prepare().unwrap_err();
        assert_eq!(err.to_string(), "package.json not found in package");
        assert!(host.runs.borrow().is_empty());
    }

    #[test]
    fn test_install_failure_is_fatal() {
        let mut host = FakeHost::with_binaries(&["node", "npm"]);
        host.touch("/pkg/package.json");
        host.touch("/pkg/dist/index.js");
        host.reply(
            "npm",
            Reply::Output(StepOutput {
                code: Some(1),
                stdout: String::new(),
                stderr: "npm ERR! 404".to_string(),
            }),
        );
        let config = LauncherConfig::default();

        let err = Bootstrap::new(&host, &config, ROOT).prepare().unwrap_err();
        assert!(matches!(err, LaunchError::InstallFailure { .. }));
        assert_eq!(err.hint().as_deref(), Some("npm ERR! 404"));
    }

    #[test]
    fn test_optional_failures_never_change_outcome() {
        let replies = [
            Reply::SpawnError(io::ErrorKind::NotFound),
            Reply::Output(StepOutput {
                code: Some(2),
                ..StepOutput::default()
            }),
            Reply::Output(StepOutput::default()),
        ];

        for reply in replies {
            let mut host = ready_host();
            host.reply("python3", reply);
            let config = LauncherConfig::default();

            let command = Bootstrap::new(&host, &config, ROOT).prepare();
            assert!(command.is_ok());
            assert!(host.ran("python3"));
        }
    }

    #[test]
    fn test_optional_tool_missing_is_skipped() {
        let host = FakeHost::with_binaries(&["node", "npm"]);
        let config = LauncherConfig::default();
        let bootstrap = Bootstrap::new(&host, &config, ROOT);

        let outcome = bootstrap.ensure_optional_dependencies(Platform::Other);
        assert!(matches!(
            outcome.failure(),
            Some(OptionalInstallError::ToolMissing { .. })
        ));
        assert!(host.runs.borrow().is_empty());
    }

    #[test]
    fn test_optional_command_depends_on_platform() {
        let host = ready_host();
        let config = LauncherConfig::default();
        let bootstrap = Bootstrap::new(&host, &config, ROOT);

        assert!(bootstrap.ensure_optional_dependencies(Platform::AppleSilicon).installed());
        assert!(bootstrap.ensure_optional_dependencies(Platform::Other).installed());

        let runs = host.runs.borrow();
        assert_eq!(runs[0], "python3 -m pip install --quiet mflux");
        assert!(runs[1].ends_with("torch torchvision diffusers transformers accelerate"));
    }

    #[test]
    fn test_optional_disabled() {
        let host = ready_host();
        let mut config = LauncherConfig::default();
        config.optional.enabled = false;
        let bootstrap = Bootstrap::new(&host, &config, ROOT);

        let outcome = bootstrap.ensure_optional_dependencies(Platform::Other);
        assert!(matches!(
            outcome.failure(),
            Some(OptionalInstallError::Disabled)
        ));
        assert!(!host.ran("python3"));
    }

    #[test]
    fn test_missing_build_stops_before_spawn() {
        let host = FakeHost::with_binaries(&["node", "npm"]);
        host.touch("/pkg/package.json");
        host.touch("/pkg/node_modules");
        let config = LauncherConfig::default();

        let err = Bootstrap::new(&host, &config, ROOT).prepare().unwrap_err();
        assert!(matches!(err, LaunchError::MissingBuild { .. }));
        assert_eq!(
            err.to_string(),
            "Server build not found. Please report this issue."
        );
    }
}
