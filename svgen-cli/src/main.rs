//! svg-generator-mcp - launcher for the SVG Generator MCP server
//!
//! stdout belongs to the MCP stream once the server starts, so everything the
//! launcher says goes to stderr.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use svgen_cli::commands::{
    print_package_paths, print_setup_instructions, report_failure, run_launch,
};

/// SVG Generator MCP Server - AI-powered SVG illustration generation
#[derive(Parser)]
#[command(name = "svg-generator-mcp")]
#[command(version)]
struct Cli {
    /// Show MCP client setup instructions
    #[arg(long)]
    help_setup: bool,

    /// Use this directory as the package root instead of the executable's
    #[arg(long, hide = true, value_name = "DIR")]
    package_root: Option<PathBuf>,

    /// Print the resolved package paths and whether each exists, then exit
    #[arg(long, hide = true)]
    debug_paths: bool,
}

fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    if cli.help_setup {
        return match print_setup_instructions() {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Error: {e:#}");
                ExitCode::FAILURE
            }
        };
    }

    if cli.debug_paths {
        return match print_package_paths(cli.package_root) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                report_failure(&e);
                ExitCode::from(e.exit_code())
            }
        };
    }

    match run_launch(cli.package_root).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            report_failure(&e);
            ExitCode::from(e.exit_code())
        }
    }
}
