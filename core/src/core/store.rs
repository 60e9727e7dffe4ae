use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::core::task::Task;
use crate::errors::TaskError;

/// A mutation applied to one task while the store holds its write lock.
pub type TaskUpdate = Box<dyn FnOnce(&mut Task) -> Result<(), TaskError> + Send>;

/// Where task records live. Reads hand out snapshots; writes go through
/// `update` so a runner never holds a reference across an await.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create(&self, task: Task);
    async fn get(&self, id: &str) -> Option<Task>;
    /// All tasks, oldest first.
    async fn list(&self) -> Vec<Task>;
    async fn update(&self, id: &str, update: TaskUpdate) -> Result<(), TaskError>;
}

/// Process-lifetime store. Tasks are never evicted.
#[derive(Default)]
pub struct MemoryTaskStore {
    tasks: RwLock<HashMap<String, Task>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn create(&self, task: Task) {
        self.tasks.write().await.insert(task.id.clone(), task);
    }

    async fn get(&self, id: &str) -> Option<Task> {
        self.tasks.read().await.get(id).cloned()
    }

    async fn list(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.tasks.read().await.values().cloned().collect();
        tasks.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)));
        tasks
    }

    async fn update(&self, id: &str, update: TaskUpdate) -> Result<(), TaskError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| TaskError::NotFound(id.to_string()))?;
        update(task)
    }
}
