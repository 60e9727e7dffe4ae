use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Marker sqlmap puts on lines it considers critical.
pub const CRITICAL_MARKER: &str = "[CRITICAL]";

const INJECTION_BLOCK: &str = r"Parameter: ([^\n]+?) \([^\n]+?\)\n((?:\s+Type: [^\n]+\n\s+Title: [^\n]+\n\s+Payload: [^\n]+\n)+)";
const INJECTION_TRIPLE: &str = r"\s+Type: ([^\n]+)\n\s+Title: ([^\n]+)\n\s+Payload: ([^\n]+)\n";
const VULNERABLE_PHRASE: &str = r"(\w+) parameter '(.+?)' (is vulnerable.+)";
const BACKEND_DBMS: &str = r"back-end DBMS: ([^\n]+)";
const INJECTION_SUMMARY: &str = r"(?s)sqlmap identified the following injection point\(s\)[^\n:]*:(.+?)\n\n";
const ERROR_LINE: &str = r"\[ERROR\] ([^\n]+)";

static SHARED: OnceLock<Result<OutputParser, regex::Error>> = OnceLock::new();

/// One fact extracted from engine output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
}

impl Finding {
    pub fn injection(parameter: &str, kind: &str, title: &str, payload: &str) -> Self {
        Self {
            parameter: Some(parameter.trim().to_string()),
            kind: kind.trim().to_string(),
            title: Some(title.trim().to_string()),
            payload: Some(payload.trim().to_string()),
            info: None,
        }
    }

    pub fn vulnerable(parameter: &str, kind: &str) -> Self {
        Self {
            parameter: Some(parameter.to_string()),
            kind: kind.to_string(),
            title: None,
            payload: None,
            info: None,
        }
    }

    /// A parameter-less finding such as `DBMS` or `CRITICAL`.
    pub fn tagged(kind: &str, info: &str) -> Self {
        Self {
            parameter: None,
            kind: kind.to_string(),
            title: None,
            payload: None,
            info: Some(info.trim().to_string()),
        }
    }
}

/// Best-effort extraction of findings from sqlmap's human-readable output.
///
/// The engine's phrasing drifts between versions, so extraction is a set of
/// independent passes over the same text. A pass that matches nothing simply
/// contributes nothing.
#[derive(Debug, Clone)]
pub struct OutputParser {
    block: Regex,
    triple: Regex,
    vulnerable: Regex,
    dbms: Regex,
    summary: Regex,
    error_line: Regex,
}

impl OutputParser {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            block: Regex::new(INJECTION_BLOCK)?,
            triple: Regex::new(INJECTION_TRIPLE)?,
            vulnerable: Regex::new(VULNERABLE_PHRASE)?,
            dbms: Regex::new(BACKEND_DBMS)?,
            summary: Regex::new(INJECTION_SUMMARY)?,
            error_line: Regex::new(ERROR_LINE)?,
        })
    }

    /// Process-wide instance, compiled on first use.
    pub fn shared() -> Result<&'static OutputParser, regex::Error> {
        SHARED
            .get_or_init(OutputParser::new)
            .as_ref()
            .map_err(Clone::clone)
    }

    /// Builds the finding list for a finished scan.
    ///
    /// `critical_lines` and `live` are what the streaming runner captured while
    /// the engine was still running. Live findings are only added for
    /// parameters not already reported by the text passes.
    pub fn parse(&self, output: &str, critical_lines: &[String], live: &[Finding]) -> Vec<Finding> {
        let mut findings = self.injection_blocks(output);
        if findings.is_empty() {
            findings = self.vulnerable_phrases(output);
        }
        findings.extend(self.backend_dbms(output));
        findings.extend(critical_findings(critical_lines));
        merge_by_parameter(&mut findings, live);
        findings
    }

    /// `Parameter: id (GET)` followed by one or more Type/Title/Payload triples.
    pub fn injection_blocks(&self, output: &str) -> Vec<Finding> {
        let mut findings = Vec::new();
        for block in self.block.captures_iter(output) {
            let parameter = &block[1];
            for triple in self.triple.captures_iter(&block[2]) {
                findings.push(Finding::injection(parameter, &triple[1], &triple[2], &triple[3]));
            }
        }
        findings
    }

    /// Looser `GET parameter 'id' is vulnerable...` phrasing.
    pub fn vulnerable_phrases(&self, output: &str) -> Vec<Finding> {
        self.vulnerable
            .captures_iter(output)
            .map(|c| Finding::vulnerable(&c[2], &format!("{} - {}", &c[1], &c[3])))
            .collect()
    }

    pub fn backend_dbms(&self, output: &str) -> Option<Finding> {
        self.dbms
            .captures(output)
            .map(|c| Finding::tagged("DBMS", &c[1]))
    }

    /// Checks a single line as it streams in.
    ///
    /// Prefers the quoted-parameter phrasing and falls back to the positional
    /// token heuristic for lines that mention both markers but not in that form.
    pub fn detect_live(&self, line: &str) -> Option<Finding> {
        if !is_vulnerability_line(line) {
            return None;
        }
        match self.vulnerable.captures(line) {
            Some(c) => Some(Finding::vulnerable(&c[2], &format!("{} - {}", &c[1], &c[3]))),
            None => positional_vulnerability(line),
        }
    }

    /// Text between the injection-point banner and the next blank line.
    pub fn summary(&self, output: &str) -> Option<String> {
        self.summary
            .captures(output)
            .map(|c| c[1].trim().to_string())
    }

    /// First `[ERROR] ...` line in the output, without the tag.
    pub fn first_error(&self, output: &str) -> Option<String> {
        self.error_line
            .captures(output)
            .map(|c| c[1].trim().to_string())
    }
}

pub fn is_critical_line(line: &str) -> bool {
    line.contains(CRITICAL_MARKER)
}

fn is_vulnerability_line(line: &str) -> bool {
    line.contains("is vulnerable") && line.contains("parameter")
}

/// Whitespace-token heuristic: token 1 is the parameter, tokens 3.. the
/// description. Leading `[...]` tokens (timestamp, level) are skipped first.
pub fn positional_vulnerability(line: &str) -> Option<Finding> {
    if !is_vulnerability_line(line) {
        return None;
    }
    let parts: Vec<&str> = line
        .split_whitespace()
        .skip_while(|t| t.starts_with('[') && t.ends_with(']'))
        .collect();
    if parts.len() <= 3 {
        return None;
    }
    let parameter = parts[1].trim_matches('\'');
    Some(Finding::vulnerable(parameter, &parts[3..].join(" ")))
}

fn critical_findings(lines: &[String]) -> impl Iterator<Item = Finding> + '_ {
    lines
        .iter()
        .filter(|line| line.contains("is vulnerable"))
        .map(|line| Finding::tagged("CRITICAL", &line.replace("[CRITICAL] ", "")))
}

fn merge_by_parameter(findings: &mut Vec<Finding>, extra: &[Finding]) {
    for finding in extra {
        if !findings.iter().any(|f| f.parameter == finding.parameter) {
            findings.push(finding.clone());
        }
    }
}
