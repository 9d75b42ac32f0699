//! Probe error types
//!
//! These never reach the user as raw errors: [`crate::runner::run_probe`]
//! turns anything that goes wrong mid-session into a failed verdict.

use snafu::Snafu;
use std::path::PathBuf;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ProbeError {
    #[snafu(display("failed to start `{program}`: {source}"))]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[snafu(display("failed to encode `{method}` request: {source}"))]
    Encode {
        method: String,
        source: serde_json::Error,
    },

    #[snafu(display("failed to send `{method}` to the server: {source}"))]
    Send {
        method: String,
        source: std::io::Error,
    },

    #[snafu(display("failed to read server output: {source}"))]
    Read { source: std::io::Error },

    #[snafu(display("failed to check the server process: {source}"))]
    Wait { source: std::io::Error },

    #[snafu(display("failed to read probe plan {}: {source}", path.display()))]
    PlanRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("invalid probe plan {}: {source}", path.display()))]
    PlanParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[snafu(display("`{field}` must be a non-negative number of seconds, got {value}"))]
    InvalidDuration { field: String, value: f64 },
}

pub type Result<T, E = ProbeError> = std::result::Result<T, E>;
