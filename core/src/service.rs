use log::warn;
use serde::{Deserialize, Serialize};

use crate::core::manager::{SubmitReceipt, TaskManager};
use crate::core::status::{StatusView, TaskListing};
use crate::modules::options::ScanOptions;
use crate::modules::sqlmap::{run_batch, BatchOutcome};
use crate::utils::report::ScanReport;
use crate::EngineConfig;

/// Phrases that mark output worth turning into a report.
const REPORT_MARKERS: &[&str] = &["开始检测", "检测到"];

/// Reply to a status query: the view, or an error object for unknown ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatusReply {
    Status(Box<StatusView>),
    Error { error: String },
}

/// The operations a transport layer exposes. Every method returns a value;
/// none of them fail.
pub struct SqlmapService {
    manager: TaskManager,
}

impl SqlmapService {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_manager(TaskManager::new(config))
    }

    pub fn with_manager(manager: TaskManager) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &TaskManager {
        &self.manager
    }

    /// Runs a scan to completion and returns a report, or the raw engine
    /// output when it has nothing the report extractor recognizes.
    pub async fn scan(&self, target_url: &str, extra_args: &[String]) -> String {
        render_scan_output(self.scan_outcome(target_url, extra_args).await.to_string())
    }

    /// Same run as `scan`, but keeps the outcome so callers can tell a
    /// finished scan from a timeout or engine failure.
    pub async fn scan_outcome(&self, target_url: &str, extra_args: &[String]) -> BatchOutcome {
        run_batch(self.manager.config(), target_url, extra_args).await
    }

    pub async fn start_scan(&self, target_url: &str, options: ScanOptions) -> SubmitReceipt {
        self.manager.submit(target_url, options).await
    }

    pub async fn get_scan_status(&self, task_id: &str) -> StatusReply {
        match self.manager.status(task_id).await {
            Ok(view) => StatusReply::Status(Box::new(view)),
            Err(e) => StatusReply::Error { error: e.to_string() },
        }
    }

    pub async fn list_scans(&self, include_completed: bool) -> TaskListing {
        self.manager.list_tasks(include_completed).await
    }
}

pub fn render_scan_output(output: String) -> String {
    if !REPORT_MARKERS.iter().any(|m| output.contains(m)) {
        return output;
    }
    match ScanReport::parse(&output) {
        Ok(report) => report.to_markdown(),
        Err(e) => {
            warn!("report extraction failed, returning raw output: {}", e);
            output
        }
    }
}
