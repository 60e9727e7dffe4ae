use std::fmt;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use log::{debug, error, info, warn};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::core::store::TaskStore;
use crate::modules::options::{EngineCommand, ScanOptions};
use crate::utils::parser::{positional_vulnerability, Finding, OutputParser};
use crate::EngineConfig;

/// How a batch run ended. `Display` gives the text handed back to callers.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    Success(String),
    Failed { code: i32, stderr: String },
    TimedOut(Duration),
    Error(String),
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, BatchOutcome::Success(_))
    }
}

impl fmt::Display for BatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchOutcome::Success(output) => write!(f, "{}", output),
            BatchOutcome::Failed { code, stderr } => {
                write!(f, "sqlmap failed (exit code {})\n{}", code, stderr)
            }
            BatchOutcome::TimedOut(limit) => {
                write!(f, "sqlmap timed out after {} seconds", limit.as_secs())
            }
            BatchOutcome::Error(e) => write!(f, "execution error: {}", e),
        }
    }
}

/// Runs sqlmap to completion and captures everything at once.
///
/// The child is killed if it outlives `config.timeout()`.
pub async fn run_batch(config: &EngineConfig, target: &str, extra_args: &[String]) -> BatchOutcome {
    let command = EngineCommand::build(config, target, extra_args);
    info!("[*] Launching sqlmap on: {}", target);
    debug!("command: {}", command.display());

    let child = match Command::new(&command.program)
        .args(&command.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(c) => c,
        Err(e) => {
            error!("failed to start sqlmap ({}): {}", command.program, e);
            return BatchOutcome::Error(e.to_string());
        }
    };

    let limit = config.timeout();
    let output = match tokio::time::timeout(limit, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            error!("sqlmap I/O error: {}", e);
            return BatchOutcome::Error(e.to_string());
        }
        Err(_) => {
            warn!("sqlmap exceeded {}s on {}, killing it", limit.as_secs(), target);
            return BatchOutcome::TimedOut(limit);
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    if output.status.success() {
        info!("[*] sqlmap finished on {}", target);
        if stdout.is_empty() {
            BatchOutcome::Success(stderr)
        } else {
            BatchOutcome::Success(stdout)
        }
    } else {
        let code = output.status.code().unwrap_or(-1);
        warn!("sqlmap exited with code {} on {}", code, target);
        BatchOutcome::Failed { code, stderr }
    }
}

/// Drives one task: streams the engine's output into the store as it
/// arrives and parses the result once the process exits.
///
/// Never returns an error. Whatever goes wrong ends up as a failed task.
pub async fn run_streaming(
    store: Arc<dyn TaskStore>,
    config: Arc<EngineConfig>,
    task_id: String,
    target: String,
    options: ScanOptions,
) {
    if let Err(e) = stream_task(&store, &config, &task_id, &target, &options).await {
        error!("[{}] scan failed: {:#}", task_id, e);
        let message = format!("{:#}", e);
        if let Err(e) = store.update(&task_id, Box::new(move |t| t.fail(message))).await {
            warn!("[{}] could not record failure: {}", task_id, e);
        }
    }
}

async fn stream_task(
    store: &Arc<dyn TaskStore>,
    config: &EngineConfig,
    task_id: &str,
    target: &str,
    options: &ScanOptions,
) -> anyhow::Result<()> {
    let command = EngineCommand::with_options(config, target, options);
    let display = command.display();
    info!("[{}] Launching sqlmap on: {}", task_id, target);
    debug!("[{}] command: {}", task_id, display);

    store
        .update(task_id, Box::new(move |t| t.start(display)))
        .await?;

    let mut child = Command::new(&command.program)
        .args(&command.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to start {}", command.program))?;

    let stdout = child.stdout.take().ok_or_else(|| anyhow::anyhow!("Failed to capture stdout from sqlmap"))?;
    let stderr = child.stderr.take().ok_or_else(|| anyhow::anyhow!("Failed to capture stderr from sqlmap"))?;
    let mut stdout = BufReader::new(stdout);
    let mut stderr = BufReader::new(stderr);
    let (mut out_buf, mut err_buf) = (Vec::new(), Vec::new());
    let (mut out_done, mut err_done) = (false, false);

    while !(out_done && err_done) {
        tokio::select! {
            // stdout first, so a stderr line never lands inside a run of
            // stdout lines that were already written
            biased;

            line = read_lossy_line(&mut stdout, &mut out_buf), if !out_done => match line? {
                Some(line) => {
                    let live = detect_live(&line);
                    if let Some(ref finding) = live {
                        info!("[{}] live finding: {} ({})", task_id, finding.parameter.as_deref().unwrap_or("?"), finding.kind);
                    }
                    store.update(task_id, Box::new(move |t| {
                        t.push_stdout(&line, live);
                        Ok(())
                    })).await?;
                }
                None => out_done = true,
            },
            line = read_lossy_line(&mut stderr, &mut err_buf), if !err_done => match line? {
                Some(line) => {
                    store.update(task_id, Box::new(move |t| {
                        t.push_stderr(&line);
                        Ok(())
                    })).await?;
                }
                None => err_done = true,
            },
        }
    }

    let status = child.wait().await.context("failed waiting for sqlmap")?;
    let code = status.code().unwrap_or(-1);
    info!("[{}] sqlmap exited with code {}", task_id, code);

    store
        .update(task_id, Box::new(move |t| {
            t.finish(code)?;
            if code == 0 {
                t.record_findings(OutputParser::shared());
                if let Some(ref e) = t.parse_error {
                    warn!("[{}] output parsing failed: {}", t.id, e);
                }
            }
            Ok(())
        }))
        .await?;

    Ok(())
}

fn detect_live(line: &str) -> Option<Finding> {
    match OutputParser::shared() {
        Ok(parser) => parser.detect_live(line),
        Err(_) => positional_vulnerability(line),
    }
}

/// Reads one line, replacing invalid UTF-8. `buf` must persist between
/// calls so a read cancelled by `select!` loses nothing.
async fn read_lossy_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let read = reader.read_until(b'\n', buf).await?;
    if read == 0 && buf.is_empty() {
        return Ok(None);
    }
    let line = String::from_utf8_lossy(buf)
        .trim_end_matches(|c| c == '\n' || c == '\r')
        .to_string();
    buf.clear();
    Ok(Some(line))
}
