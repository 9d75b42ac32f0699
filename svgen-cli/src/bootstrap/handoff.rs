//! Server handoff: spawn the server with our own stdio and wait on it
//!
//! The child inherits stdin, stdout and stderr directly, so JSON-RPC traffic
//! never passes through a buffer owned by the launcher.

use snafu::ResultExt;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};

use crate::error::{Result, SignalSnafu, SpawnSnafu, WaitSnafu};

/// How long the server gets to exit after an interrupt before it is killed
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// Fully resolved server invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub cwd: PathBuf,
}

/// How the handoff ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffOutcome {
    /// The server exited on its own; `None` means it was killed by a signal
    Exited(Option<i32>),
    /// The launcher was interrupted while waiting
    Interrupted,
}

impl HandoffOutcome {
    /// Exit status the launcher should report for this outcome
    pub fn exit_code(self) -> u8 {
        match self {
            Self::Interrupted | Self::Exited(Some(0)) => 0,
            Self::Exited(Some(code)) => u8::try_from(code).ok().filter(|c| *c != 0).unwrap_or(1),
            Self::Exited(None) => 1,
        }
    }
}

/// Spawn the server and block until it exits or the launcher is interrupted
pub async fn launch_server(command: &ServerCommand) -> Result<HandoffOutcome> {
    // Registered before spawn so an early Ctrl-C is not lost
    let mut interrupt = Interrupt::register().context(SignalSnafu)?;

    tracing::debug!(
        "spawning {} {:?} in {}",
        command.program.display(),
        command.args,
        command.cwd.display()
    );

    let mut child = Command::new(&command.program)
        .args(&command.args)
        .current_dir(&command.cwd)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .context(SpawnSnafu {
            program: command.program.display().to_string(),
        })?;

    tokio::select! {
        status = child.wait() => {
            let status = status.context(WaitSnafu)?;
            Ok(HandoffOutcome::Exited(status.code()))
        }
        () = interrupt.recv() => {
            shutdown(&mut child).await;
            Ok(HandoffOutcome::Interrupted)
        }
    }
}

/// Ask the server to stop, then kill it if it does not, and reap it
async fn shutdown(child: &mut Child) {
    terminate(child);
    if tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await.is_err() {
        tracing::debug!("server ignored SIGTERM, killing it");
        if let Err(e) = child.kill().await {
            tracing::debug!("failed to kill server: {e}");
        }
    }
}

#[cfg(unix)]
fn terminate(child: &Child) {
    let Some(pid) = child.id().and_then(|pid| libc::pid_t::try_from(pid).ok()) else {
        return;
    };
    // SAFETY: `pid` belongs to a child we have not reaped yet
    unsafe {
        libc::kill(pid, libc::SIGTERM);
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    let _ = child.start_kill();
}

/// Interrupt listener that never resolves spuriously
struct Interrupt {
    #[cfg(unix)]
    signal: tokio::signal::unix::Signal,
}

impl Interrupt {
    #[cfg(unix)]
    fn register() -> std::io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        Ok(Self {
            signal: signal(SignalKind::interrupt())?,
        })
    }

    #[cfg(not(unix))]
    fn register() -> std::io::Result<Self> {
        Ok(Self {})
    }

    #[cfg(unix)]
    async fn recv(&mut self) {
        if self.signal.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    }

    #[cfg(not(unix))]
    async fn recv(&mut self) {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_mapping() {
        assert_eq!(HandoffOutcome::Exited(Some(0)).exit_code(), 0);
        assert_eq!(HandoffOutcome::Exited(Some(3)).exit_code(), 3);
        assert_eq!(HandoffOutcome::Exited(None).exit_code(), 1);
        assert_eq!(HandoffOutcome::Interrupted.exit_code(), 0);
        // Codes that do not fit a process exit status still report failure
        assert_eq!(HandoffOutcome::Exited(Some(256)).exit_code(), 1);
        assert_eq!(HandoffOutcome::Exited(Some(-1)).exit_code(), 1);
    }

    #[cfg(unix)]
    fn sh(script: &str) -> ServerCommand {
        ServerCommand {
            program: PathBuf::from("/bin/sh"),
            args: vec![OsString::from("-c"), OsString::from(script)],
            cwd: std::env::temp_dir(),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_child_exit_code_is_mirrored() {
        let outcome = launch_server(&sh("exit 3")).await.unwrap();
        assert_eq!(outcome, HandoffOutcome::Exited(Some(3)));
        assert_eq!(outcome.exit_code(), 3);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_child_runs_in_package_root() {
        let root = tempfile::tempdir().unwrap();
        let mut command = sh("test -f marker");
        command.cwd = root.path().to_path_buf();

        assert_eq!(
            launch_server(&command).await.unwrap(),
            HandoffOutcome::Exited(Some(1))
        );

        std::fs::write(root.path().join("marker"), "").unwrap();
        assert_eq!(
            launch_server(&command).await.unwrap(),
            HandoffOutcome::Exited(Some(0))
        );
    }

    #[tokio::test]
    async fn test_spawn_failure_is_reported() {
        let command = ServerCommand {
            program: PathBuf::from("/definitely/not/a/runtime"),
            args: vec![],
            cwd: std::env::temp_dir(),
        };

        let err = launch_server(&command).await.unwrap_err();
        assert!(err.to_string().contains("failed to start"));
    }
}
