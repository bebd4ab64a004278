use kman_core::ManagerError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Category of a failed computation, preserved across the REST boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskErrorKind {
    NotFound,
    AlreadyExists,
    InvalidArgument,
    Cluster,
    Failed,
}

/// Error captured inside a [`TaskResult`](crate::TaskResult).
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct TaskError {
    pub kind: TaskErrorKind,
    pub message: String,
}

impl TaskError {
    pub fn new(kind: TaskErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(TaskErrorKind::Failed, message)
    }
}

impl From<ManagerError> for TaskError {
    fn from(err: ManagerError) -> Self {
        let kind = match &err {
            ManagerError::NotFound(_) => TaskErrorKind::NotFound,
            ManagerError::AlreadyExists(_) => TaskErrorKind::AlreadyExists,
            ManagerError::InvalidArgument(_) => TaskErrorKind::InvalidArgument,
            ManagerError::Cluster(_) => TaskErrorKind::Cluster,
            ManagerError::Transport(_) | ManagerError::Closed(_) | ManagerError::Other(_) => {
                TaskErrorKind::Failed
            }
        };
        let message = match err {
            ManagerError::NotFound(m)
            | ManagerError::AlreadyExists(m)
            | ManagerError::InvalidArgument(m)
            | ManagerError::Cluster(m)
            | ManagerError::Other(m) => m,
            other => other.to_string(),
        };
        Self { kind, message }
    }
}

impl From<TaskError> for ManagerError {
    fn from(err: TaskError) -> Self {
        match err.kind {
            TaskErrorKind::NotFound => ManagerError::NotFound(err.message),
            TaskErrorKind::AlreadyExists => ManagerError::AlreadyExists(err.message),
            TaskErrorKind::InvalidArgument => ManagerError::InvalidArgument(err.message),
            TaskErrorKind::Cluster => ManagerError::Cluster(err.message),
            TaskErrorKind::Failed => ManagerError::Other(err.message),
        }
    }
}
