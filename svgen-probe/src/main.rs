//! svgen-probe - check that the packaged MCP server starts and lists its tools

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use svgen_probe::report::print_summary;
use svgen_probe::{PlanOverrides, ProbePlan, run_probe};

/// Start the svg-generator MCP server and probe it over stdio
#[derive(Parser)]
#[command(name = "svgen-probe", version)]
struct Cli {
    /// TOML file with plan settings; flags given here take precedence
    #[arg(long, value_name = "FILE")]
    plan: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    overrides: PlanOverrides,

    /// Command to probe instead of the uvx invocation, e.g. `-- node dist/index.js`
    #[arg(last = true, value_name = "COMMAND")]
    command: Vec<String>,
}

impl Cli {
    fn resolve_plan(&self) -> Result<ProbePlan> {
        let file = match &self.plan {
            Some(path) => PlanOverrides::load(path)?,
            None => PlanOverrides::default(),
        };

        let mut cli = self.overrides.clone();
        if let Some((program, args)) = self.command.split_first() {
            cli.program = Some(program.clone());
            cli.args = Some(args.to_vec());
        }

        Ok(ProbePlan::resolve(&file, &cli)?)
    }
}

fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match probe(&cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("❌ Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn probe(cli: &Cli) -> Result<u8> {
    let plan = cli.resolve_plan()?;
    tracing::debug!("plan: {plan:?}");

    let report = run_probe(&plan).await;
    if cli.json {
        println!("{}", report.to_json().context("Failed to encode report")?);
    } else {
        print_summary(&report);
    }
    Ok(report.exit_code())
}
