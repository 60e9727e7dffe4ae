use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::utils;
use crate::EngineConfig;

/// Flag forced onto every engine invocation so it never waits on stdin.
pub const BATCH_FLAG: &str = "--batch";

/// A single sqlmap option value. The variant decides the flag shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Flag(bool),
    Number(serde_json::Number),
    Text(String),
}

impl OptionValue {
    /// Guesses the kind from CLI text: `true`/`false`, numbers, else text.
    pub fn infer(raw: &str) -> Self {
        match raw {
            "true" => return OptionValue::Flag(true),
            "false" => return OptionValue::Flag(false),
            _ => {}
        }
        match serde_json::from_str::<serde_json::Number>(raw) {
            Ok(n) => OptionValue::Number(n),
            Err(_) => OptionValue::Text(raw.to_string()),
        }
    }

    pub fn render(&self, key: &str) -> Option<String> {
        match self {
            OptionValue::Flag(true) => Some(format!("--{}", key)),
            OptionValue::Flag(false) => None,
            OptionValue::Number(n) => Some(format!("--{}={}", key, n)),
            OptionValue::Text(s) => Some(format!("--{}={}", key, s)),
        }
    }
}

/// Options attached to a task scan, keyed by sqlmap long-option name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScanOptions(BTreeMap<String, OptionValue>);

impl ScanOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: OptionValue) {
        self.0.insert(key.into(), value);
    }

    pub fn with(mut self, key: impl Into<String>, value: OptionValue) -> Self {
        self.insert(key, value);
        self
    }

    /// Parses `key=value` pairs; a bare `key` is a set flag.
    pub fn from_pairs<I, S>(pairs: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut options = Self::new();
        for pair in pairs {
            let pair = pair.as_ref().trim();
            let (key, value) = match pair.split_once('=') {
                Some((k, v)) => (k.trim(), OptionValue::infer(v.trim())),
                None => (pair, OptionValue::Flag(true)),
            };
            let key = key.trim_start_matches('-');
            if key.is_empty() {
                anyhow::bail!("empty option name in '{}'", pair);
            }
            options.insert(key, value);
        }
        Ok(options)
    }

    pub fn to_flags(&self) -> Vec<String> {
        self.0
            .iter()
            .filter_map(|(key, value)| value.render(key))
            .collect()
    }
}

/// A fully assembled engine invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl EngineCommand {
    /// `[interpreter] script -u <target> --batch <extra…>`
    pub fn build(config: &EngineConfig, target: &str, extra: &[String]) -> Self {
        let script = config.script_path.to_string_lossy().to_string();
        let (program, mut args) = match config.interpreter.as_deref() {
            Some(interpreter) => (utils::resolve_interpreter(interpreter), vec![script]),
            None => (script, Vec::new()),
        };

        args.extend(["-u".to_string(), target.to_string(), BATCH_FLAG.to_string()]);
        args.extend(extra.iter().filter(|a| a.as_str() != BATCH_FLAG).cloned());

        Self { program, args }
    }

    pub fn with_options(config: &EngineConfig, target: &str, options: &ScanOptions) -> Self {
        Self::build(config, target, &options.to_flags())
    }

    /// Shell-like rendering kept on the task for diagnostics.
    pub fn display(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.as_str());
        parts.extend(self.args.iter().map(String::as_str));
        parts.join(" ")
    }
}
