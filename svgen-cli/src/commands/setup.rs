//! `--help-setup`: client configuration snippet

use anyhow::{Context, Result};
use serde_json::json;

/// Isolated-execution wrapper clients use to start the launcher
const LAUNCH_COMMAND: &str = "uvx";

/// Name the launcher is published under
pub const PACKAGE_NAME: &str = "svg-generator-mcp";

/// The JSON block a client needs to start this server
pub fn client_config() -> serde_json::Value {
    json!({
        "mcpServers": {
            "svg-generator": {
                "command": LAUNCH_COMMAND,
                "args": [PACKAGE_NAME]
            }
        }
    })
}

/// Full setup instructions text
pub fn setup_instructions() -> Result<String> {
    let snippet =
        serde_json::to_string_pretty(&client_config()).context("Failed to render client config")?;

    Ok(format!(
        "MCP Client Setup Instructions:\n\
         Add this to your Claude Desktop configuration:\n\
         \n\
         {snippet}\n"
    ))
}

pub fn print_setup_instructions() -> Result<()> {
    print!("{}", setup_instructions()?);
    Ok(())
}
