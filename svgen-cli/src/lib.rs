//! svg-generator-mcp launcher
//!
//! Checks that Node.js and npm are available, installs the bundled server's
//! dependencies on first run, then runs `dist/index.js` with the launcher's
//! own stdio so MCP clients talk to the server directly.

pub mod bootstrap;
pub mod commands;
pub mod config;
pub mod error;

pub use error::{LaunchError, Result};
