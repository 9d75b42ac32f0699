//! Error types for the launcher pipeline
//!
//! Every variant is fatal and maps to exit status 1. A child server that exits
//! non-zero is not an error here: its status is propagated as an outcome by
//! [`crate::bootstrap::handoff`]. Optional installs have their own error type in
//! [`crate::bootstrap::installer`] with no conversion into [`LaunchError`].

use snafu::Snafu;
use std::path::PathBuf;

/// Fatal launcher failures, one per pipeline stage
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum LaunchError {
    /// A required runtime is absent from PATH
    #[snafu(display("{label} is not installed or not in PATH"))]
    MissingRuntime {
        name: String,
        label: String,
        hint: String,
    },

    /// The dependency manifest is not part of the package (packaging defect)
    #[snafu(display("{file_name} not found in package"))]
    MissingManifest { file_name: String, path: PathBuf },

    /// The dependency install command ran and reported failure
    #[snafu(display("installing Node.js dependencies failed: `{command}` {status}"))]
    InstallFailure {
        command: String,
        status: String,
        output: String,
    },

    /// The dependency install command could not be started
    #[snafu(display(
        "installing Node.js dependencies failed: could not run `{command}`: {source}"
    ))]
    InstallSpawn {
        command: String,
        source: std::io::Error,
    },

    /// The prebuilt server entry point is absent (packaging defect)
    #[snafu(display("Server build not found. Please report this issue."))]
    MissingBuild { path: PathBuf },

    /// The server process could not be started
    #[snafu(display("failed to start the MCP server `{program}`: {source}"))]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    /// Waiting on the server process failed
    #[snafu(display("failed to wait for the MCP server process: {source}"))]
    Wait { source: std::io::Error },

    /// The interrupt listener could not be installed
    #[snafu(display("failed to install the interrupt handler: {source}"))]
    Signal { source: std::io::Error },

    /// The launcher's own location could not be determined
    #[snafu(display("failed to locate the launcher executable: {source}"))]
    PackageRoot { source: std::io::Error },

    /// `launcher.toml` exists but could not be read
    #[snafu(display("failed to read {}: {source}", path.display()))]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// `launcher.toml` is not valid
    #[snafu(display("failed to parse {}: {source}", path.display()))]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl LaunchError {
    /// Remediation printed on the line after the error, if there is one
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::MissingRuntime { hint, .. } => Some(hint.clone()),
            Self::MissingManifest { path, .. } => Some(format!(
                "Looked for {}. Please report this issue.",
                path.display()
            )),
            Self::InstallFailure { output, .. } if !output.trim().is_empty() => {
                Some(output.trim_end().to_string())
            }
            Self::MissingBuild { path } => Some(format!("Expected {}", path.display())),
            _ => None,
        }
    }

    /// Process exit status for this failure
    pub fn exit_code(&self) -> u8 {
        1
    }
}

/// Result type alias for launcher operations
pub type Result<T, E = LaunchError> = std::result::Result<T, E>;
