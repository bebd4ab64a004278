use std::time::Duration;

use kman_core::config::ServerConfig;
use kman_exec::Executors;

pub struct AppState {
    pub executors: Executors,
    /// Upper bound for a request waiting on its task result.
    pub request_timeout: Duration,
    pub cors_origin: String,
}

impl AppState {
    pub fn new(executors: Executors, config: &ServerConfig) -> Self {
        Self {
            executors,
            request_timeout: config.async_request_timeout(),
            cors_origin: config.cors_origin.clone(),
        }
    }
}
