pub mod core;
pub mod errors;
pub mod modules;
pub mod service;
pub mod utils;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

pub use crate::core::manager::{SubmitReceipt, TaskManager};
pub use crate::core::status::{StatusView, TaskListing, TaskSummary};
pub use crate::core::store::{MemoryTaskStore, TaskStore};
pub use crate::core::task::Task;
pub use crate::core::TaskStatus;
pub use crate::errors::TaskError;
pub use crate::modules::options::{EngineCommand, OptionValue, ScanOptions};
pub use crate::modules::sqlmap::{run_batch, run_streaming, BatchOutcome};
pub use crate::service::{SqlmapService, StatusReply};
pub use crate::utils::parser::{Finding, OutputParser};
pub use crate::utils::report::{InjectionPoint, ScanReport};

/// Two hours, matching the longest scans sqlmap runs at high level/risk.
pub const DEFAULT_TIMEOUT_SECS: u64 = 7200;
pub const DEFAULT_TAIL_LINES: usize = 20;

/// Where the engine lives and how long we are willing to wait for it.
/// Shared by the CLI and any service frontend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Interpreter used to run the script. `None` executes the script directly.
    pub interpreter: Option<String>,
    pub script_path: PathBuf,
    pub timeout_secs: u64,
    /// Lines of output shown for a running task.
    pub tail_lines: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interpreter: Some("python".to_string()),
            script_path: PathBuf::from("sqlmap.py"),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            tail_lines: DEFAULT_TAIL_LINES,
        }
    }
}

impl EngineConfig {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config = serde_json::from_str(&data)
            .with_context(|| format!("invalid config {}", path.display()))?;
        Ok(config)
    }

    /// Applies `SQLMAP_PATH` and `SQLMAP_PYTHON` on top of the loaded values.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(path) = std::env::var("SQLMAP_PATH") {
            if !path.is_empty() {
                self.script_path = PathBuf::from(path);
            }
        }
        if let Ok(python) = std::env::var("SQLMAP_PYTHON") {
            self.interpreter = if python.is_empty() { None } else { Some(python) };
        }
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
