use thiserror::Error;

/// Domain error taxonomy shared by every crate in the workspace.
///
/// `Clone` because a single computation outcome is handed to every caller
/// waiting on the same in-flight task.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManagerError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    AlreadyExists(String),

    #[error("{0}")]
    InvalidArgument(String),

    /// The call to the cluster or to a remote instance could not be made.
    #[error("transport error: {0}")]
    Transport(String),

    /// The cluster was reached but the operation failed.
    #[error("cluster error: {0}")]
    Cluster(String),

    #[error("closed: {0}")]
    Closed(String),

    #[error("{0}")]
    Other(String),
}

impl ManagerError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

pub type Result<T, E = ManagerError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_messages_are_not_prefixed() {
        let err = ManagerError::not_found("Topic 'orders' doesn't exist");
        assert_eq!(err.to_string(), "Topic 'orders' doesn't exist");
        assert!(err.is_not_found());
        assert!(!err.is_transport());
    }

    #[test]
    fn transport_is_distinguishable() {
        let err = ManagerError::transport("connection refused");
        assert!(err.is_transport());
        assert_eq!(err.to_string(), "transport error: connection refused");
    }
}
