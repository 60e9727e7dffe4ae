pub mod parser;
pub mod report;

use std::path::Path;
use url::Url;
use which::which;

/// Resolves the interpreter to a full path.
/// Absolute or relative paths are used as given; bare names go through PATH.
/// An unresolvable name is returned unchanged so the spawn error names it.
pub fn resolve_interpreter(name: &str) -> String {
    if Path::new(name).components().count() > 1 {
        return name.to_string();
    }
    match which(name) {
        Ok(path) => path.to_string_lossy().to_string(),
        Err(_) => name.to_string(),
    }
}

/// Rejects anything sqlmap could not treat as an HTTP(S) target.
pub fn validate_target(target: &str) -> anyhow::Result<Url> {
    let url = Url::parse(target)?;
    match url.scheme() {
        "http" | "https" => {}
        other => anyhow::bail!("unsupported scheme '{}' in {}", other, target),
    }
    if url.host_str().is_none() {
        anyhow::bail!("missing host in {}", target);
    }
    Ok(url)
}

/// Last `n` lines of `text`, joined with newlines.
pub fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}
