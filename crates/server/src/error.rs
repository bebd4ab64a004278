use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use kman_core::api::ErrorBody;
use kman_core::ManagerError;
use kman_exec::TaskError;
use tracing::warn;

/// Failure of a task request, rendered as `{"message": …}`.
#[derive(Debug)]
pub enum ApiError {
    Domain(ManagerError),
    /// The result was not ready within the request timeout.
    Timeout(Duration),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Domain(ManagerError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Domain(ManagerError::AlreadyExists(_)) => StatusCode::CONFLICT,
            Self::Domain(ManagerError::InvalidArgument(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Domain(ManagerError::Transport(_)) => StatusCode::BAD_GATEWAY,
            Self::Domain(ManagerError::Closed(_)) | Self::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Domain(ManagerError::Cluster(_) | ManagerError::Other(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Domain(e) => e.to_string(),
            Self::Timeout(limit) => format!("Result not ready within {} ms", limit.as_millis()),
        }
    }
}

impl From<ManagerError> for ApiError {
    fn from(err: ManagerError) -> Self {
        Self::Domain(err)
    }
}

impl From<TaskError> for ApiError {
    fn from(err: TaskError) -> Self {
        Self::Domain(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            warn!(status = status.as_u16(), error = %self.message(), "Task request failed");
        }
        (status, Json(ErrorBody { message: self.message() })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use kman_exec::TaskErrorKind;

    use super::*;

    #[test]
    fn task_error_kinds_keep_their_status() {
        let cases = [
            (TaskErrorKind::NotFound, StatusCode::NOT_FOUND),
            (TaskErrorKind::AlreadyExists, StatusCode::CONFLICT),
            (TaskErrorKind::InvalidArgument, StatusCode::UNPROCESSABLE_ENTITY),
            (TaskErrorKind::Cluster, StatusCode::INTERNAL_SERVER_ERROR),
            (TaskErrorKind::Failed, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (kind, status) in cases {
            assert_eq!(ApiError::from(TaskError::new(kind, "x")).status_code(), status, "{:?}", kind);
        }
    }

    #[test]
    fn transport_is_bad_gateway_and_timeout_unavailable() {
        assert_eq!(
            ApiError::from(ManagerError::transport("refused")).status_code(),
            StatusCode::BAD_GATEWAY
        );
        let timeout = ApiError::Timeout(Duration::from_millis(250));
        assert_eq!(timeout.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(timeout.message(), "Result not ready within 250 ms");
    }
}
