use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::core::status::{StatusView, TaskListing};
use crate::core::store::{MemoryTaskStore, TaskStore};
use crate::core::task::Task;
use crate::errors::TaskError;
use crate::modules::options::ScanOptions;
use crate::modules::sqlmap::run_streaming;
use crate::EngineConfig;

/// Returned to the caller as soon as a scan is queued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    pub task_id: String,
    pub message: String,
    pub status_url: String,
}

struct RunnerHandle {
    join: JoinHandle<()>,
    done: watch::Receiver<bool>,
}

/// Owns the task store and every runner it has spawned.
///
/// Runners are plain tokio tasks: they can be listed and awaited but there
/// is no way to stop one early.
pub struct TaskManager {
    store: Arc<dyn TaskStore>,
    config: Arc<EngineConfig>,
    runners: Mutex<HashMap<String, RunnerHandle>>,
}

impl TaskManager {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_store(config, Arc::new(MemoryTaskStore::new()))
    }

    pub fn with_store(config: EngineConfig, store: Arc<dyn TaskStore>) -> Self {
        Self {
            store,
            config: Arc::new(config),
            runners: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    /// Queues a scan and starts its runner in the background.
    pub async fn submit(&self, target: &str, options: ScanOptions) -> SubmitReceipt {
        let task_id = Uuid::new_v4().to_string();
        self.store
            .create(Task::new(task_id.clone(), target, options.clone()))
            .await;
        info!("[{}] queued scan for {}", task_id, target);

        let (done_tx, done_rx) = watch::channel(false);
        let join = tokio::spawn({
            let store = Arc::clone(&self.store);
            let config = Arc::clone(&self.config);
            let task_id = task_id.clone();
            let target = target.to_string();
            async move {
                run_streaming(store, config, task_id, target, options).await;
                let _ = done_tx.send(true);
            }
        });

        self.runners.lock().await.insert(
            task_id.clone(),
            RunnerHandle {
                join,
                done: done_rx,
            },
        );

        SubmitReceipt {
            message: format!("scan started for {}", target),
            status_url: format!("/scan/status/{}", task_id),
            task_id,
        }
    }

    pub async fn status(&self, task_id: &str) -> Result<StatusView, TaskError> {
        let task = self
            .store
            .get(task_id)
            .await
            .ok_or_else(|| TaskError::NotFound(task_id.to_string()))?;
        Ok(StatusView::from_task(&task, self.config.tail_lines))
    }

    pub async fn list_tasks(&self, include_completed: bool) -> TaskListing {
        let tasks = self.store.list().await;
        TaskListing::partition(&tasks, include_completed)
    }

    /// Ids of tasks whose runner has not returned yet.
    pub async fn running_tasks(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .runners
            .lock()
            .await
            .iter()
            .filter(|(_, handle)| !handle.join.is_finished() && !*handle.done.borrow())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Waits for one task's runner to return.
    pub async fn wait(&self, task_id: &str) -> Result<(), TaskError> {
        let mut done = self
            .runners
            .lock()
            .await
            .get(task_id)
            .map(|handle| handle.done.clone())
            .ok_or_else(|| TaskError::NotFound(task_id.to_string()))?;

        if done.wait_for(|finished| *finished).await.is_err() {
            warn!("[{}] runner exited without reporting completion", task_id);
        }
        Ok(())
    }

    pub async fn wait_all(&self) {
        let receivers: Vec<watch::Receiver<bool>> = self
            .runners
            .lock()
            .await
            .values()
            .map(|handle| handle.done.clone())
            .collect();

        join_all(receivers.into_iter().map(|mut done| async move {
            let _ = done.wait_for(|finished| *finished).await;
        }))
        .await;
    }
}
