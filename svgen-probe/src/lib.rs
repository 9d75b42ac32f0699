//! Startup probe for the packaged svg-generator MCP server
//!
//! Starts the server the way an MCP client would (by default through
//! `uvx --from <wheel>`), talks line-delimited JSON-RPC to it, and reports
//! whether it came up and listed its tools. The server process is always
//! terminated and reaped, whatever the outcome.

pub mod error;
pub mod jsonrpc;
pub mod plan;
pub mod report;
pub mod runner;
pub mod session;

pub use error::{ProbeError, Result};
pub use plan::{PlanOverrides, ProbePlan};
pub use report::{ProbeReport, Verdict};
pub use runner::run_probe;
