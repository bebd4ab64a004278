//! HTTP client for delegating task execution to a remote instance.
//!
//! Domain failures reported by the remote side (404, 409, 422) come back as
//! failed [`TaskResult`]s so they are cached and shown like local failures.
//! Everything else that keeps a response from being read is a transport
//! error.

use std::time::Duration;

use chrono::Utc;
use kman_core::api::ErrorBody;
use kman_core::config::ClientConfig;
use kman_core::ManagerError;
use kman_exec::{TaskError, TaskErrorKind, TaskResult};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use url::Url;

/// Client for the `/api/tasks` surface of a remote instance.
pub struct RestClient {
    base_url: String,
    http: reqwest::Client,
}

impl RestClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ManagerError> {
        let parsed = Url::parse(base_url).map_err(|e| {
            ManagerError::invalid_argument(format!("invalid remote url '{}': {}", base_url, e))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ManagerError::invalid_argument(format!(
                "remote url '{}' must use http or https",
                base_url
            )));
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ManagerError::Other(format!("failed to build http client: {}", e)))?;
        Ok(Self {
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, ManagerError> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| ManagerError::invalid_argument("KMAN_URL is not set"))?;
        Self::new(url, config.timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST a task request and read back its result.
    pub async fn post_task<B, V>(&self, path: &str, body: &B) -> Result<TaskResult<V>, ManagerError>
    where
        B: Serialize + ?Sized,
        V: DeserializeOwned,
    {
        let started_at = Utc::now();
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| ManagerError::transport(format!("request to {} failed: {}", url, e)))?;

        let status = resp.status();
        if status.is_success() {
            return resp
                .json()
                .await
                .map_err(|e| ManagerError::transport(format!("invalid response from {}: {}", url, e)));
        }

        let message = error_message(resp).await;
        match domain_error_kind(status) {
            Some(kind) => {
                debug!(url = %url, status = status.as_u16(), "Remote task failed");
                Ok(TaskResult::failed_since(started_at, TaskError::new(kind, message)))
            }
            None => Err(ManagerError::transport(format!(
                "{} returned {}: {}",
                url, status, message
            ))),
        }
    }

    /// GET a JSON document. Domain statuses map to the matching error.
    pub async fn get_json<V: DeserializeOwned>(&self, path: &str) -> Result<V, ManagerError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ManagerError::transport(format!("request to {} failed: {}", url, e)))?;

        let status = resp.status();
        if status.is_success() {
            return resp
                .json()
                .await
                .map_err(|e| ManagerError::transport(format!("invalid response from {}: {}", url, e)));
        }

        let message = error_message(resp).await;
        match domain_error_kind(status) {
            Some(kind) => Err(TaskError::new(kind, message).into()),
            None => Err(ManagerError::transport(format!(
                "{} returned {}: {}",
                url, status, message
            ))),
        }
    }
}

fn domain_error_kind(status: StatusCode) -> Option<TaskErrorKind> {
    match status {
        StatusCode::NOT_FOUND => Some(TaskErrorKind::NotFound),
        StatusCode::CONFLICT => Some(TaskErrorKind::AlreadyExists),
        StatusCode::UNPROCESSABLE_ENTITY => Some(TaskErrorKind::InvalidArgument),
        _ => None,
    }
}

/// `message` of a `{"message": …}` body, the raw body when it is not JSON,
/// or the status reason when the body is empty or unreadable.
async fn error_message(resp: Response) -> String {
    let status = resp.status();
    let fallback = || {
        format!(
            "remote returned {} {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("without reason")
        )
    };
    match resp.text().await {
        Ok(body) => match serde_json::from_str::<ErrorBody>(&body) {
            Ok(parsed) => parsed.message,
            Err(_) if !body.trim().is_empty() => body.trim().to_string(),
            Err(_) => fallback(),
        },
        Err(_) => fallback(),
    }
}
