//! What a probe run does: which command to start, how to decide it is ready,
//! what to send, how to read, and what counts as success.
//!
//! A plan starts from [`ProbePlan::default`] or a [`Preset`] and is then
//! refined by [`PlanOverrides`], which come from a TOML plan file and from
//! the command line (in that order).

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, ensure};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{InvalidDurationSnafu, PlanParseSnafu, PlanReadSnafu, Result};
use crate::jsonrpc::Method;

/// Wheel built by the Python packaging step
pub const DEFAULT_ARTIFACT: &str = "./dist/svg_generator_mcp-1.0.0-py3-none-any.whl";

/// Console script the wheel installs
pub const DEFAULT_ENTRY_POINT: &str = "svg-generator-mcp";

pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(3);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_POLL_ATTEMPTS: u32 = 10;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// The process under test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl Target {
    /// `uvx --from <artifact> svg-generator-mcp`
    pub fn uvx(artifact: &str) -> Self {
        Self {
            program: "uvx".to_string(),
            args: vec![
                "--from".to_string(),
                expand(artifact),
                DEFAULT_ENTRY_POINT.to_string(),
            ],
            cwd: None,
        }
    }

    /// The command line as a user would type it
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Default for Target {
    fn default() -> Self {
        Self::uvx(DEFAULT_ARTIFACT)
    }
}

/// How the probe decides the server has finished starting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Send `initialize` and wait for its response
    Handshake {
        timeout: Duration,
    },
    /// Sleep for a fixed time
    Settle {
        delay: Duration,
    },
}

impl Readiness {
    fn kind(self) -> ReadinessKind {
        match self {
            Self::Handshake { .. } => ReadinessKind::Handshake,
            Self::Settle { .. } => ReadinessKind::Settle,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ReadinessKind {
    Handshake,
    Settle,
}

/// Requests sent once the server is ready
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum RequestSequence {
    /// `initialize`, then `tools/list`
    Handshake,
    /// `initialize` only
    Initialize,
    /// `tools/list` only
    ToolsList,
}

impl RequestSequence {
    pub fn methods(self) -> &'static [Method] {
        match self {
            Self::Handshake => &[Method::Initialize, Method::ToolsList],
            Self::Initialize => &[Method::Initialize],
            Self::ToolsList => &[Method::ToolsList],
        }
    }
}

/// How responses are collected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStrategy {
    /// Read lines until a tool list arrives, the stream closes, or `timeout`
    Blocking {
        timeout: Duration,
    },
    /// Up to `attempts` reads, each waiting at most `interval`
    Polling {
        attempts: u32,
        interval: Duration,
    },
}

impl ReadStrategy {
    fn kind(self) -> ReadKind {
        match self {
            Self::Blocking { .. } => ReadKind::Blocking,
            Self::Polling { .. } => ReadKind::Polling,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ReadKind {
    Blocking,
    Polling,
}

/// What counts as a passing run, strongest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Expectation {
    /// A `tools/list` result with a `tools` array
    Tools,
    /// Any line on stdout
    Output,
    /// The server is still running, even if silent
    Alive,
}

/// Canned plans matching the historical startup checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Preset {
    /// Wait, send `initialize`, poll for any output
    Startup,
    /// Wait, send `initialize` then `tools/list`, poll for the tool list
    Protocol,
    /// Wait longer, send `tools/list`, block for the tool list
    Final,
    /// Wait, send `tools/list`, pass as long as the server stays up
    Smoke,
}

impl Preset {
    pub fn plan(self) -> ProbePlan {
        let polling = ReadStrategy::Polling {
            attempts: DEFAULT_POLL_ATTEMPTS,
            interval: DEFAULT_POLL_INTERVAL,
        };
        let settle = |secs| Readiness::Settle {
            delay: Duration::from_secs(secs),
        };

        let (readiness, requests, read, expect) = match self {
            Self::Startup => (settle(3), RequestSequence::Initialize, polling, Expectation::Output),
            Self::Protocol => (settle(3), RequestSequence::Handshake, polling, Expectation::Tools),
            Self::Final => (
                settle(5),
                RequestSequence::ToolsList,
                ReadStrategy::Blocking {
                    timeout: Duration::from_secs(2),
                },
                Expectation::Tools,
            ),
            Self::Smoke => (
                settle(3),
                RequestSequence::ToolsList,
                ReadStrategy::Blocking {
                    timeout: Duration::from_secs(5),
                },
                Expectation::Alive,
            ),
        };

        ProbePlan {
            readiness,
            requests,
            read,
            expect,
            ..ProbePlan::default()
        }
    }
}

/// A complete probe run description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbePlan {
    pub target: Target,
    pub readiness: Readiness,
    pub requests: RequestSequence,
    pub read: ReadStrategy,
    pub expect: Expectation,
    pub shutdown_grace: Duration,
}

impl Default for ProbePlan {
    fn default() -> Self {
        Self {
            target: Target::default(),
            readiness: Readiness::Handshake {
                timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            },
            requests: RequestSequence::Handshake,
            read: ReadStrategy::Blocking {
                timeout: DEFAULT_READ_TIMEOUT,
            },
            expect: Expectation::Tools,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

impl ProbePlan {
    /// Build a plan from a plan file's overrides and then the command line's
    pub fn resolve(file: &PlanOverrides, cli: &PlanOverrides) -> Result<Self> {
        let preset = cli.preset.or(file.preset);
        let mut plan = preset.map_or_else(Self::default, Preset::plan);
        plan.apply(file)?;
        plan.apply(cli)?;
        Ok(plan)
    }

    /// Layer `overrides` on top of this plan
    pub fn apply(&mut self, overrides: &PlanOverrides) -> Result<()> {
        if let Some(artifact) = &overrides.artifact {
            self.target = Target {
                cwd: self.target.cwd.take(),
                ..Target::uvx(artifact)
            };
        }
        if let Some(program) = &overrides.program {
            self.target.program.clone_from(program);
        }
        if let Some(args) = &overrides.args {
            self.target.args.clone_from(args);
        }
        if let Some(cwd) = &overrides.cwd {
            self.target.cwd = Some(PathBuf::from(expand(cwd)));
        }

        let handshake_timeout = seconds("handshake-timeout", overrides.handshake_timeout)?;
        let settle = seconds("settle", overrides.settle)?;
        self.readiness = match overrides.readiness.unwrap_or(self.readiness.kind()) {
            ReadinessKind::Handshake => Readiness::Handshake {
                timeout: handshake_timeout
                    .or(match self.readiness {
                        Readiness::Handshake { timeout } => Some(timeout),
                        Readiness::Settle { .. } => None,
                    })
                    .unwrap_or(DEFAULT_HANDSHAKE_TIMEOUT),
            },
            ReadinessKind::Settle => Readiness::Settle {
                delay: settle
                    .or(match self.readiness {
                        Readiness::Settle { delay } => Some(delay),
                        Readiness::Handshake { .. } => None,
                    })
                    .unwrap_or(DEFAULT_SETTLE_DELAY),
            },
        };

        let read_timeout = seconds("read-timeout", overrides.read_timeout)?;
        let poll_interval = seconds("poll-interval", overrides.poll_interval)?;
        self.read = match overrides.read.unwrap_or(self.read.kind()) {
            ReadKind::Blocking => ReadStrategy::Blocking {
                timeout: read_timeout
                    .or(match self.read {
                        ReadStrategy::Blocking { timeout } => Some(timeout),
                        ReadStrategy::Polling { .. } => None,
                    })
                    .unwrap_or(DEFAULT_READ_TIMEOUT),
            },
            ReadKind::Polling => {
                let (attempts, interval) = match self.read {
                    ReadStrategy::Polling { attempts, interval } => (attempts, interval),
                    ReadStrategy::Blocking { .. } => (DEFAULT_POLL_ATTEMPTS, DEFAULT_POLL_INTERVAL),
                };
                ReadStrategy::Polling {
                    attempts: overrides.poll_attempts.unwrap_or(attempts),
                    interval: poll_interval.unwrap_or(interval),
                }
            }
        };

        if let Some(requests) = overrides.requests {
            self.requests = requests;
        }
        if let Some(expect) = overrides.expect {
            self.expect = expect;
        }
        if let Some(grace) = seconds("shutdown-grace", overrides.shutdown_grace)? {
            self.shutdown_grace = grace;
        }
        Ok(())
    }
}

/// Optional plan fields, shared by `--plan` files and command-line flags
#[derive(Debug, Clone, Default, PartialEq, Deserialize, clap::Args)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct PlanOverrides {
    /// Start from a canned plan
    #[arg(long, value_enum)]
    pub preset: Option<Preset>,

    /// Wheel to run with `uvx --from`
    #[arg(long, value_name = "PATH")]
    pub artifact: Option<String>,

    /// Program to start instead of `uvx`
    #[arg(long)]
    pub program: Option<String>,

    /// Arguments for the program (repeatable)
    #[arg(long = "arg", value_name = "ARG", allow_hyphen_values = true)]
    pub args: Option<Vec<String>>,

    /// Working directory for the program
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<String>,

    /// How to decide the server is ready
    #[arg(long, value_enum)]
    pub readiness: Option<ReadinessKind>,

    /// Seconds to wait for the `initialize` response
    #[arg(long, value_name = "SECS")]
    pub handshake_timeout: Option<f64>,

    /// Seconds to wait before talking to the server
    #[arg(long, value_name = "SECS")]
    pub settle: Option<f64>,

    /// Requests to send once ready
    #[arg(long, value_enum)]
    pub requests: Option<RequestSequence>,

    /// How to read responses
    #[arg(long, value_enum)]
    pub read: Option<ReadKind>,

    /// Seconds a blocking read may take in total
    #[arg(long, value_name = "SECS")]
    pub read_timeout: Option<f64>,

    /// Number of polling reads
    #[arg(long, value_name = "N")]
    pub poll_attempts: Option<u32>,

    /// Seconds each polling read waits
    #[arg(long, value_name = "SECS")]
    pub poll_interval: Option<f64>,

    /// What counts as success
    #[arg(long, value_enum)]
    pub expect: Option<Expectation>,

    /// Seconds the server gets to exit after SIGTERM
    #[arg(long, value_name = "SECS")]
    pub shutdown_grace: Option<f64>,
}

impl PlanOverrides {
    /// Read a TOML plan file
    pub fn load(path: &Path) -> Result<Self> {
        let expanded = PathBuf::from(expand(&path.to_string_lossy()));
        let contents = std::fs::read_to_string(&expanded).context(PlanReadSnafu {
            path: expanded.clone(),
        })?;
        Self::parse(&contents).context(PlanParseSnafu { path: expanded })
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }
}

fn expand(path: &str) -> String {
    shellexpand::tilde(path).into_owned()
}

fn seconds(field: &str, value: Option<f64>) -> Result<Option<Duration>> {
    let Some(value) = value else {
        return Ok(None);
    };
    let duration = Duration::try_from_secs_f64(value).ok();
    ensure!(duration.is_some(), InvalidDurationSnafu { field, value });
    Ok(duration)
}
