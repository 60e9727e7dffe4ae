use serde::{Deserialize, Serialize};

use crate::core::task::{epoch_secs, Task};
use crate::core::TaskStatus;
use crate::utils::parser::{Finding, OutputParser};
use crate::utils::tail_lines;

const NOT_FOUND_SUMMARY: &str = "no injection point found";
const FOUND_SUMMARY: &str = "injection points found";

/// What a poller sees for one task. Which optional fields are filled
/// depends on the status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusView {
    pub task_id: String,
    pub status: TaskStatus,
    pub target_url: String,
    pub elapsed_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<Finding>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl StatusView {
    pub fn from_task(task: &Task, tail: usize) -> Self {
        let parser = OutputParser::shared().ok();
        let results = task.results.clone().filter(|r| !r.is_empty());

        let partial_output = match task.status {
            TaskStatus::Running => Some(tail_lines(&task.output, tail)),
            _ => None,
        };

        let summary = match task.status {
            TaskStatus::Completed => Some(
                parser
                    .and_then(|p| p.summary(&task.output))
                    .unwrap_or_else(|| {
                        if results.is_some() {
                            FOUND_SUMMARY.to_string()
                        } else {
                            NOT_FOUND_SUMMARY.to_string()
                        }
                    }),
            ),
            _ => None,
        };

        let error = match task.status {
            TaskStatus::Failed => task
                .error
                .clone()
                .or_else(|| task.errors.last().cloned())
                .or_else(|| parser.and_then(|p| p.first_error(&task.output))),
            _ => None,
        };

        Self {
            task_id: task.id.clone(),
            status: task.status,
            target_url: task.target_url.clone(),
            elapsed_time: format!("{:.2}s", task.elapsed().as_secs_f64()),
            results,
            partial_output,
            summary,
            error,
            parse_error: task.parse_error.clone(),
            command: task.command.clone(),
        }
    }
}

/// One line of `list_tasks` output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub task_id: String,
    pub status: TaskStatus,
    pub target_url: String,
    pub start_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<f64>,
}

impl TaskSummary {
    fn active(task: &Task) -> Self {
        Self {
            task_id: task.id.clone(),
            status: task.status,
            target_url: task.target_url.clone(),
            start_time: epoch_secs(task.started_at),
            end_time: None,
        }
    }

    fn finished(task: &Task) -> Self {
        Self {
            end_time: Some(task.ended_at.map(epoch_secs).unwrap_or_default()),
            ..Self::active(task)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskListing {
    pub active_tasks: Vec<TaskSummary>,
    pub completed_tasks: Vec<TaskSummary>,
}

impl TaskListing {
    pub fn partition(tasks: &[Task], include_completed: bool) -> Self {
        let mut listing = Self::default();
        for task in tasks {
            if task.status.is_active() {
                listing.active_tasks.push(TaskSummary::active(task));
            } else if include_completed {
                listing.completed_tasks.push(TaskSummary::finished(task));
            }
        }
        listing
    }
}
