use std::time::{Duration, SystemTime};

use crate::core::TaskStatus;
use crate::errors::TaskError;
use crate::modules::options::ScanOptions;
use crate::utils::parser::{is_critical_line, Finding, OutputParser};

/// Prefix given to stderr lines when they are folded into the output buffer.
pub const STDERR_PREFIX: &str = "[ERROR] ";

/// Full lifecycle record of one submitted scan.
///
/// Only the runner that owns the task mutates it; everything else reads
/// snapshots through the store.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: String,
    pub target_url: String,
    pub options: ScanOptions,
    pub status: TaskStatus,
    pub output: String,
    pub critical_lines: Vec<String>,
    /// Findings detected line by line while the engine was running.
    pub vulnerabilities: Vec<Finding>,
    pub errors: Vec<String>,
    pub results: Option<Vec<Finding>>,
    pub return_code: Option<i32>,
    pub error: Option<String>,
    pub parse_error: Option<String>,
    pub command: Option<String>,
    pub started_at: SystemTime,
    pub ended_at: Option<SystemTime>,
}

impl Task {
    pub fn new(id: impl Into<String>, target_url: impl Into<String>, options: ScanOptions) -> Self {
        Self {
            id: id.into(),
            target_url: target_url.into(),
            options,
            status: TaskStatus::Queued,
            output: String::new(),
            critical_lines: Vec::new(),
            vulnerabilities: Vec::new(),
            errors: Vec::new(),
            results: None,
            return_code: None,
            error: None,
            parse_error: None,
            command: None,
            started_at: SystemTime::now(),
            ended_at: None,
        }
    }

    pub fn transition(&mut self, next: TaskStatus) -> Result<(), TaskError> {
        if !self.status.can_transition_to(next) {
            return Err(TaskError::InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Queued -> Running, remembering the command line for diagnostics.
    pub fn start(&mut self, command: String) -> Result<(), TaskError> {
        self.transition(TaskStatus::Running)?;
        self.command = Some(command);
        Ok(())
    }

    /// Appends one stdout line. Ignored once the task has left Running.
    pub fn push_stdout(&mut self, line: &str, live: Option<Finding>) {
        if self.status != TaskStatus::Running {
            return;
        }
        self.output.push_str(line);
        self.output.push('\n');
        if is_critical_line(line) {
            self.critical_lines.push(line.to_string());
        }
        if let Some(finding) = live {
            self.vulnerabilities.push(finding);
        }
    }

    pub fn push_stderr(&mut self, line: &str) {
        if self.status != TaskStatus::Running {
            return;
        }
        self.output.push_str(STDERR_PREFIX);
        self.output.push_str(line);
        self.output.push('\n');
        self.errors.push(line.to_string());
    }

    /// Records the exit code; zero completes the task, anything else fails it.
    pub fn finish(&mut self, return_code: i32) -> Result<(), TaskError> {
        let next = if return_code == 0 {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        };
        self.transition(next)?;
        self.return_code = Some(return_code);
        self.ended_at = Some(SystemTime::now());
        Ok(())
    }

    pub fn fail(&mut self, error: String) -> Result<(), TaskError> {
        self.transition(TaskStatus::Failed)?;
        self.error = Some(error);
        self.ended_at = Some(SystemTime::now());
        Ok(())
    }

    /// Runs the parser over everything captured. Empty results are not stored.
    pub fn record_findings(&mut self, parser: Result<&OutputParser, regex::Error>) {
        match parser {
            Ok(parser) => {
                let findings = parser.parse(&self.output, &self.critical_lines, &self.vulnerabilities);
                if !findings.is_empty() {
                    self.results = Some(findings);
                }
            }
            Err(e) => self.parse_error = Some(e.to_string()),
        }
    }

    pub fn elapsed(&self) -> Duration {
        SystemTime::now()
            .duration_since(self.started_at)
            .unwrap_or_default()
    }
}

pub fn epoch_secs(time: SystemTime) -> f64 {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
