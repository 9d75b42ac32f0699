//! Drive one probe run from spawn to verdict

use std::time::{Duration, Instant};
use tokio::time::sleep;

use crate::error::Result;
use crate::jsonrpc::{JsonRpcResponse, Method, RequestId, ToolInfo};
use crate::plan::{ProbePlan, ReadStrategy, Readiness};
use crate::report::{ProbeReport, Verdict};
use crate::session::{LineRead, ServerSession};

/// Per-line wait while collecting the output of an exited server
const DRAIN_WAIT: Duration = Duration::from_millis(200);

/// Raw stdout lines kept for a startup failure report
const OUTPUT_LINES: usize = 50;

/// Everything read from stdout so far
#[derive(Debug, Default)]
struct Observed {
    lines: usize,
    tools: Option<Vec<ToolInfo>>,
    output: Vec<String>,
}

impl Observed {
    /// Record one line and return its parsed form, if it was JSON-RPC
    fn record(&mut self, line: &str) -> Option<JsonRpcResponse> {
        self.lines += 1;
        tracing::debug!("received {line}");
        if self.output.len() < OUTPUT_LINES {
            self.output.push(line.to_string());
        }

        let response = JsonRpcResponse::parse_line(line)?;
        if self.tools.is_none() {
            self.tools = response.tools();
        }
        Some(response)
    }
}

/// How reading responses ended
enum ReadEnd {
    ToolsFound,
    Closed,
    Exhausted,
}

/// Run `plan` to completion. Never fails: problems become the verdict.
pub async fn run_probe(plan: &ProbePlan) -> ProbeReport {
    let timestamp = chrono::Utc::now();
    let started = Instant::now();
    let target = plan.target.display();
    tracing::info!("probing `{target}`");

    let mut session = match ServerSession::spawn(&plan.target) {
        Ok(session) => session,
        Err(e) => {
            return ProbeReport::new(
                timestamp,
                started.elapsed(),
                target,
                plan.expect,
                Verdict::Error {
                    message: e.to_string(),
                },
            );
        }
    };

    let mut observed = Observed::default();
    let verdict = match drive(&mut session, plan, &mut observed).await {
        Ok(verdict) => verdict,
        Err(e) => Verdict::Error {
            message: e.to_string(),
        },
    };

    let finished = session.shutdown(plan.shutdown_grace).await;

    let mut report = ProbeReport::new(timestamp, started.elapsed(), target, plan.expect, verdict)
        .with_stderr(finished.stderr);
    report.tools = observed.tools.unwrap_or_default();
    report.lines_received = observed.lines;
    report.exit_code = finished.exit_code;
    if report.verdict == Verdict::StartupFailed {
        report.stdout = observed.output;
    }
    report
}

async fn drive(
    session: &mut ServerSession,
    plan: &ProbePlan,
    observed: &mut Observed,
) -> Result<Verdict> {
    let mut initialized = false;

    match plan.readiness {
        Readiness::Handshake { timeout } => {
            let id = match session.send(Method::Initialize).await {
                Ok(id) => id,
                // a server that died at once has closed its stdin
                Err(e) => {
                    if session.wait_exit(DRAIN_WAIT).await?.is_some() {
                        return startup_failed(session, observed).await;
                    }
                    return Err(e);
                }
            };
            match await_response(session, &id, timeout, observed).await? {
                LineRead::Line(_) => initialized = true,
                LineRead::Closed => return startup_failed(session, observed).await,
                LineRead::TimedOut => {
                    if session.exit_status()?.is_some() {
                        return startup_failed(session, observed).await;
                    }
                    return Ok(Verdict::Timeout);
                }
            }
        }
        Readiness::Settle { delay } => {
            sleep(delay).await;
            if session.exit_status()?.is_some() {
                return startup_failed(session, observed).await;
            }
        }
    }

    for &method in plan.requests.methods() {
        if method == Method::Initialize && initialized {
            continue;
        }
        session.send(method).await?;
    }

    let end = if observed.tools.is_some() {
        ReadEnd::ToolsFound
    } else {
        read_responses(session, plan.read, observed).await?
    };

    Ok(match end {
        _ if observed.tools.is_some() => Verdict::ToolsListed,
        _ if observed.lines > 0 => Verdict::AnyOutput,
        ReadEnd::Closed => Verdict::NoResponse,
        ReadEnd::ToolsFound | ReadEnd::Exhausted => {
            if session.exit_status()?.is_some() {
                Verdict::NoResponse
            } else {
                Verdict::AliveNoOutput
            }
        }
    })
}

/// Read until the response to `id` arrives; `Line` carries nothing useful
async fn await_response(
    session: &mut ServerSession,
    id: &RequestId,
    timeout: Duration,
    observed: &mut Observed,
) -> Result<LineRead> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match session.read_line(remaining).await? {
            LineRead::Line(line) => {
                if observed
                    .record(&line)
                    .is_some_and(|response| &response.id == id)
                {
                    return Ok(LineRead::Line(line));
                }
            }
            end => return Ok(end),
        }
    }
}

async fn read_responses(
    session: &mut ServerSession,
    strategy: ReadStrategy,
    observed: &mut Observed,
) -> Result<ReadEnd> {
    match strategy {
        ReadStrategy::Blocking { timeout } => {
            let deadline = Instant::now() + timeout;
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                match session.read_line(remaining).await? {
                    LineRead::Line(line) => {
                        observed.record(&line);
                        if observed.tools.is_some() {
                            return Ok(ReadEnd::ToolsFound);
                        }
                    }
                    LineRead::Closed => return Ok(ReadEnd::Closed),
                    LineRead::TimedOut => return Ok(ReadEnd::Exhausted),
                }
            }
        }
        ReadStrategy::Polling { attempts, interval } => {
            for _ in 0..attempts {
                match session.read_line(interval).await? {
                    LineRead::Line(line) => {
                        observed.record(&line);
                        if observed.tools.is_some() {
                            return Ok(ReadEnd::ToolsFound);
                        }
                    }
                    LineRead::Closed => return Ok(ReadEnd::Closed),
                    LineRead::TimedOut => {}
                }
            }
            Ok(ReadEnd::Exhausted)
        }
    }
}

/// Collect what an exited server printed so the report can show it
async fn startup_failed(session: &mut ServerSession, observed: &mut Observed) -> Result<Verdict> {
    for line in session.drain_stdout(DRAIN_WAIT).await? {
        observed.record(&line);
    }
    Ok(Verdict::StartupFailed)
}
