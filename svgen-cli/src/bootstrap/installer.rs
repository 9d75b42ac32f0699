//! Dependency installers
//!
//! Required installs abort the launcher on failure. Optional installs return a
//! [`BestEffort`], which has no path into [`LaunchError`].

use snafu::{ResultExt, Snafu, ensure};
use std::fmt;
use std::path::PathBuf;

use crate::bootstrap::host::Host;
use crate::error::{InstallFailureSnafu, InstallSpawnSnafu, Result};

/// An external command to run from the package root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallStep {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

impl fmt::Display for InstallStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let program = self
            .program
            .file_name()
            .map_or_else(|| self.program.to_string_lossy(), |name| name.to_string_lossy());
        write!(f, "{program}")?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Run a required install step; any failure is fatal
pub fn run_required(host: &impl Host, step: &InstallStep) -> Result<()> {
    tracing::info!("running `{step}` in {}", step.cwd.display());

    let output = host
        .run_captured(&step.program, &step.args, &step.cwd)
        .context(InstallSpawnSnafu {
            command: step.to_string(),
        })?;

    ensure!(
        output.success(),
        InstallFailureSnafu {
            command: step.to_string(),
            status: output.status_text(),
            output: output.diagnostic(),
        }
    );

    Ok(())
}

/// Platform families that get different acceleration packages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    AppleSilicon,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(all(target_os = "macos", target_arch = "aarch64")) {
            Self::AppleSilicon
        } else {
            Self::Other
        }
    }
}

/// Why an optional install did not happen; never surfaced to the user
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum OptionalInstallError {
    #[snafu(display("optional installs are disabled"))]
    Disabled,

    #[snafu(display("no optional install configured for {platform:?}"))]
    Unsupported { platform: Platform },

    #[snafu(display("`{program}` is not on PATH"))]
    ToolMissing { program: String },

    #[snafu(display("could not run `{command}`: {source}"))]
    Unavailable {
        command: String,
        source: std::io::Error,
    },

    #[snafu(display("`{command}` {status}"))]
    Failed { command: String, status: String },
}

/// Outcome of an opportunistic step
///
/// The error is readable for logging and tests, but there is no `?` path from
/// here into the launcher's fatal errors.
#[derive(Debug)]
pub struct BestEffort(std::result::Result<(), OptionalInstallError>);

impl BestEffort {
    /// A step that was not attempted
    pub(crate) fn skipped(error: OptionalInstallError) -> Self {
        let outcome: std::result::Result<(), _> = Err(error);
        outcome.into()
    }

    pub fn installed(&self) -> bool {
        self.0.is_ok()
    }

    pub fn failure(&self) -> Option<&OptionalInstallError> {
        self.0.as_ref().err()
    }
}

impl From<std::result::Result<(), OptionalInstallError>> for BestEffort {
    fn from(outcome: std::result::Result<(), OptionalInstallError>) -> Self {
        if let Err(e) = &outcome {
            tracing::debug!("optional dependencies not installed: {e}");
        }
        Self(outcome)
    }
}

/// Run an optional install step, capturing every failure into the result
pub fn run_best_effort(host: &impl Host, step: &InstallStep) -> BestEffort {
    let command = step.to_string();
    let outcome = host
        .run_captured(&step.program, &step.args, &step.cwd)
        .context(UnavailableSnafu { command: &command })
        .and_then(|output| {
            ensure!(
                output.success(),
                FailedSnafu {
                    command: &command,
                    status: output.status_text(),
                }
            );
            Ok(())
        });
    outcome.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::host::StepOutput;
    use crate::bootstrap::host::fake::{FakeHost, Reply};
    use crate::error::LaunchError;
    use std::io;

    fn npm_install() -> InstallStep {
        InstallStep {
            program: PathBuf::from("/fake/bin/npm"),
            args: vec!["install".to_string(), "--production".to_string()],
            cwd: PathBuf::from("/pkg"),
        }
    }

    #[test]
    fn test_step_display_uses_file_name() {
        assert_eq!(npm_install().to_string(), "npm install --production");
    }

    #[test]
    fn test_required_failure_surfaces_output() {
        let mut host = FakeHost::default();
        host.reply(
            "npm",
            Reply::Output(StepOutput {
                code: Some(1),
                stdout: String::new(),
                stderr: "npm ERR! code ENOTFOUND\n".to_string(),
            }),
        );

        let err = run_required(&host, &npm_install()).unwrap_err();
        match err {
            LaunchError::InstallFailure {
                command,
                status,
                output,
            } => {
                assert_eq!(command, "npm install --production");
                assert_eq!(status, "exited with status 1");
                assert!(output.contains("ENOTFOUND"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_required_spawn_error() {
        let mut host = FakeHost::default();
        host.reply("npm", Reply::SpawnError(io::ErrorKind::NotFound));

        let err = run_required(&host, &npm_install()).unwrap_err();
        assert!(matches!(err, LaunchError::InstallSpawn { .. }));
    }

    #[test]
    fn test_best_effort_swallows_failures() {
        let step = InstallStep {
            program: PathBuf::from("python3"),
            args: vec!["-m".to_string(), "pip".to_string()],
            cwd: PathBuf::from("/pkg"),
        };

        let mut host = FakeHost::default();
        host.reply(
            "python3",
            Reply::Output(StepOutput {
                code: Some(1),
                ..StepOutput::default()
            }),
        );
        let outcome = run_best_effort(&host, &step);
        assert!(!outcome.installed());
        assert!(matches!(
            outcome.failure(),
            Some(OptionalInstallError::Failed { .. })
        ));

        host.reply("python3", Reply::SpawnError(io::ErrorKind::PermissionDenied));
        let outcome = run_best_effort(&host, &step);
        assert!(matches!(
            outcome.failure(),
            Some(OptionalInstallError::Unavailable { .. })
        ));
    }
}
