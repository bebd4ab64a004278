use std::sync::Arc;

use async_trait::async_trait;
use kman_core::ManagerError;
use tracing::{debug, error, warn};

use crate::executor::{Task, TaskExecutor};
use crate::result::TaskResult;

/// Runs a [`Task`] on the caller's task; nothing is cached.
pub struct OnDemandExecutor<T: Task> {
    task: Arc<T>,
}

impl<T: Task> OnDemandExecutor<T> {
    pub fn new(task: Arc<T>) -> Self {
        Self { task }
    }

    pub fn task(&self) -> &Arc<T> {
        &self.task
    }
}

#[async_trait]
impl<T: Task> TaskExecutor<T::Key, T::Input, T::Output> for OnDemandExecutor<T> {
    fn name(&self) -> &str {
        self.task.name()
    }

    async fn execute_detailed(
        &self,
        key: &T::Key,
        input: T::Input,
    ) -> Result<TaskResult<T::Output>, ManagerError> {
        let name = self.task.name();
        debug!(task = %name, key = ?key, "Executing");
        match self.task.run(key, input).await {
            Ok(result) => {
                if let Some(e) = result.error() {
                    error!(task = %name, key = ?key, error = %e, "Execution of task failed");
                }
                Ok(result)
            }
            Err(e) => {
                warn!(task = %name, key = ?key, error = %e, "Execution could not reach its backend");
                Err(e)
            }
        }
    }
}
