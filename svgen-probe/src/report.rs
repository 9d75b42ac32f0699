//! Probe verdicts and their human and JSON renderings

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

use crate::jsonrpc::ToolInfo;
use crate::plan::Expectation;

/// Lines of stderr kept in a report
pub const STDERR_TAIL_LINES: usize = 20;

/// What the probe observed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Verdict {
    /// A `tools/list` result arrived
    ToolsListed,
    /// Output arrived, but no tool list
    AnyOutput,
    /// Nothing on stdout; the server is still running
    AliveNoOutput,
    /// Nothing on stdout; the server closed it or exited
    NoResponse,
    /// The `initialize` handshake did not complete in time
    Timeout,
    /// The server exited before it was ready
    StartupFailed,
    /// The probe itself failed
    Error { message: String },
}

impl Verdict {
    pub fn satisfies(&self, expect: Expectation) -> bool {
        match self {
            Self::ToolsListed => true,
            Self::AnyOutput => matches!(expect, Expectation::Output | Expectation::Alive),
            Self::AliveNoOutput => expect == Expectation::Alive,
            Self::NoResponse | Self::Timeout | Self::StartupFailed | Self::Error { .. } => false,
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::ToolsListed => "server listed its tools".to_string(),
            Self::AnyOutput => "server responded without a tool list".to_string(),
            Self::AliveNoOutput => "server is running but sent nothing".to_string(),
            Self::NoResponse => "server closed its output without responding".to_string(),
            Self::Timeout => "server did not answer `initialize` in time".to_string(),
            Self::StartupFailed => "server exited during startup".to_string(),
            Self::Error { message } => format!("probe error: {message}"),
        }
    }
}

/// Outcome of one probe run
#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub timestamp: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub target: String,
    pub expect: Expectation,
    pub verdict: Verdict,
    pub passed: bool,
    pub tools: Vec<ToolInfo>,
    pub lines_received: usize,
    pub exit_code: Option<i32>,
    /// Only set when the server exited during startup
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stdout: Vec<String>,
    pub stderr_tail: Vec<String>,
}

impl ProbeReport {
    pub fn new(
        timestamp: DateTime<Utc>,
        elapsed: Duration,
        target: String,
        expect: Expectation,
        verdict: Verdict,
    ) -> Self {
        Self {
            timestamp,
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            target,
            expect,
            passed: verdict.satisfies(expect),
            verdict,
            tools: Vec::new(),
            lines_received: 0,
            exit_code: None,
            stdout: Vec::new(),
            stderr_tail: Vec::new(),
        }
    }

    /// Keep the last [`STDERR_TAIL_LINES`] lines of `stderr`
    pub fn with_stderr(mut self, stderr: Vec<String>) -> Self {
        let skip = stderr.len().saturating_sub(STDERR_TAIL_LINES);
        self.stderr_tail = stderr.into_iter().skip(skip).collect();
        self
    }

    pub fn exit_code(&self) -> u8 {
        u8::from(!self.passed)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Print a human readable summary to stdout
pub fn print_summary(report: &ProbeReport) {
    println!("🧪 svg-generator-mcp startup probe");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Target:    {}", report.target);
    println!("Generated: {}", report.timestamp.to_rfc3339());
    println!("Elapsed:   {} ms", report.elapsed_ms);
    println!();

    let icon = if report.passed { "✅" } else { "❌" };
    println!("{icon} {}", report.verdict.describe());

    if !report.tools.is_empty() {
        println!();
        println!("🔧 Found {} MCP tools:", report.tools.len());
        for tool in &report.tools {
            match &tool.description {
                Some(description) => println!("   - {}: {description}", tool.name),
                None => println!("   - {}", tool.name),
            }
        }
    } else if report.lines_received > 0 {
        println!("📥 {} lines received", report.lines_received);
    }

    if let Some(code) = report.exit_code.filter(|_| report.verdict == Verdict::StartupFailed) {
        println!("   exit code: {code}");
    }

    if !report.stdout.is_empty() {
        println!();
        println!("STDOUT:");
        for line in &report.stdout {
            println!("  {line}");
        }
    }

    if !report.passed && !report.stderr_tail.is_empty() {
        println!();
        println!("STDERR (last {} lines):", report.stderr_tail.len());
        for line in &report.stderr_tail {
            println!("  {line}");
        }
    }

    println!();
    if report.passed {
        println!("🎉 SUCCESS!");
    } else {
        println!("❌ FAILED (expected: {:?})", report.expect);
    }
}
