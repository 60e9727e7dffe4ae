//! Batch-scan report: a coarse summary pulled from one finished sqlmap run,
//! rendered as Markdown-flavoured text for whoever invoked the scan.

use std::sync::OnceLock;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

const VULNERABILITY_PHRASES: &[(&str, &str)] = &[
    ("Boolean-based blind", r"Boolean-based blind SQL injection detected"),
    ("Error-based", r"Error-based SQLi detected"),
    ("Time-based blind", r"Time-based blind SQL injection detected"),
    ("UNION query", r"UNION query\.+?: SQL injection"),
];

const PAYLOAD_PHRASES: &[(&str, &str)] = &[
    ("Boolean-based blind", r"Boolean-based blind SQL injection payload: (.*)"),
    ("Error-based", r"Error-based payload: (.*)"),
    ("Time-based blind", r"Time-based payload: (.*)"),
    ("UNION query", r"UNION query payload: (.*)"),
];

const REMEDIATION: &[&str] = &[
    "Fix the injection immediately: use parameterized queries or prepared statements for every database call.",
    "Validate and filter all user-controlled input strictly.",
    "Restrict the privileges of the database account to limit the impact of an attack.",
];

static PATTERNS: OnceLock<Result<ReportPatterns, regex::Error>> = OnceLock::new();

/// Every report regex, compiled once per process.
struct ReportPatterns {
    vulnerabilities: Vec<(&'static str, Regex)>,
    dbms: Regex,
    technology: Regex,
    parameter: Regex,
    payloads: Vec<(&'static str, Regex)>,
}

impl ReportPatterns {
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            vulnerabilities: compile_phrases(VULNERABILITY_PHRASES)?,
            dbms: Regex::new(r"back-end DBMS: (.+)")?,
            technology: Regex::new(r"web application technology: (.+)")?,
            parameter: Regex::new(r"Parameter: (\w+) \[")?,
            payloads: compile_phrases(PAYLOAD_PHRASES)?,
        })
    }

    fn shared() -> Result<&'static ReportPatterns, regex::Error> {
        PATTERNS
            .get_or_init(ReportPatterns::new)
            .as_ref()
            .map_err(Clone::clone)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectionPoint {
    pub kind: String,
    pub parameter: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    pub vulnerabilities: Vec<String>,
    /// Ordered `(label, value)` pairs, e.g. `("type", "MySQL >= 5.0")`.
    pub database_info: Vec<(String, String)>,
    pub injection_points: Vec<InjectionPoint>,
    /// Ordered `(technique, payload)` pairs.
    pub payloads: Vec<(String, String)>,
}

impl ScanReport {
    pub fn parse(output: &str) -> Result<Self, regex::Error> {
        let patterns = ReportPatterns::shared()?;
        let mut report = Self::default();

        for (label, re) in &patterns.vulnerabilities {
            if re.is_match(output) {
                report.vulnerabilities.push(label.to_string());
            }
        }

        if let Some(c) = patterns.dbms.captures(output) {
            report.database_info.push(("type".to_string(), c[1].trim().to_string()));
        }
        if let Some(c) = patterns.technology.captures(output) {
            report.database_info.push(("technology".to_string(), c[1].trim().to_string()));
        }

        if let Some(c) = patterns.parameter.captures(output) {
            report.injection_points.push(InjectionPoint {
                kind: "GET".to_string(),
                parameter: c[1].to_string(),
            });
        }

        for (label, re) in &patterns.payloads {
            if let Some(c) = re.captures(output) {
                report.payloads.push((label.to_string(), c[1].trim().to_string()));
            }
        }

        Ok(report)
    }

    /// Fixed-section text report. With no vulnerabilities only the result
    /// section is emitted.
    pub fn to_markdown(&self) -> String {
        let mut md = String::from("# SQL Injection Scan Report\n\n");

        if self.vulnerabilities.is_empty() {
            md.push_str("## Result\nNo SQL injection vulnerability found\n\n");
            return md;
        }

        md.push_str("## Detected Vulnerability Types\n");
        for vuln in &self.vulnerabilities {
            md.push_str(&format!("- {}\n", vuln));
        }
        md.push('\n');

        if !self.database_info.is_empty() {
            md.push_str("## Database Information\n");
            for (key, value) in &self.database_info {
                md.push_str(&format!("- **{}**: {}\n", capitalize(key), value));
            }
            md.push('\n');
        }

        if !self.injection_points.is_empty() {
            md.push_str("## Injection Points\n");
            for point in &self.injection_points {
                md.push_str(&format!("- **{} parameter**: {}\n", point.kind, point.parameter));
            }
            md.push('\n');
        }

        if !self.payloads.is_empty() {
            md.push_str("## Example Payloads\n");
            for (technique, payload) in &self.payloads {
                md.push_str(&format!("- **{}**: {}\n", technique, payload));
            }
            md.push('\n');
        }

        md.push_str("## Remediation\n");
        for (i, advice) in REMEDIATION.iter().enumerate() {
            md.push_str(&format!("{}. {}\n", i + 1, advice));
        }

        md
    }
}

fn compile_phrases(phrases: &[(&'static str, &str)]) -> Result<Vec<(&'static str, Regex)>, regex::Error> {
    phrases
        .iter()
        .map(|(label, pattern)| -> Result<(&'static str, Regex), regex::Error> {
            let re = RegexBuilder::new(pattern).case_insensitive(true).build()?;
            Ok((*label, re))
        })
        .collect()
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
