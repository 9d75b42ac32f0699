//! Launch command: bootstrap the package and hand off to the server
//!
//! Stages: Start → CheckPrerequisites → EnsureDependencies →
//! EnsureOptionalDependencies → LocateEntry → Spawn → WaitChild → Exit

use std::path::PathBuf;

use crate::bootstrap::{Bootstrap, HandoffOutcome, PackageLayout, SystemHost, launch_server};
use crate::config::LauncherConfig;
use crate::error::{LaunchError, Result};

/// Run the full pipeline and return the launcher's exit status
pub async fn run_launch(package_root: Option<PathBuf>) -> Result<u8> {
    let root = match package_root {
        Some(root) => root,
        None => PackageLayout::discover_root()?,
    };
    let config = LauncherConfig::load(&root)?;
    let host = SystemHost::new();

    let command = Bootstrap::new(&host, &config, root).prepare()?;
    let outcome = launch_server(&command).await?;

    match outcome {
        HandoffOutcome::Interrupted => {
            eprintln!("\nShutting down MCP server...");
        }
        HandoffOutcome::Exited(Some(0)) => {
            tracing::debug!("MCP server exited cleanly");
        }
        HandoffOutcome::Exited(Some(code)) => {
            eprintln!("Error running MCP server: exited with status {code}");
        }
        HandoffOutcome::Exited(None) => {
            eprintln!("Error running MCP server: terminated by a signal");
        }
    }

    Ok(outcome.exit_code())
}

/// Print a fatal launcher error to stderr the way users see it
pub fn report_failure(err: &LaunchError) {
    eprintln!("Error: {err}");
    if let Some(hint) = err.hint() {
        eprintln!("{hint}");
    }
}
