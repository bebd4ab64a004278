use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_parse<T: std::str::FromStr>(profile: &str, key: &str, default: T) -> T {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub server: ServerConfig,
    pub cluster: ClusterConfig,
    pub executor: ExecutorConfig,
    pub bootstrap: BootstrapConfig,
    pub client: ClientConfig,
    pub metrics: MetricsConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `KMAN_PROFILE`. When set (e.g. `PROD`), every key
    /// is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("KMAN_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            server: ServerConfig::from_env_profiled(p),
            cluster: ClusterConfig::from_env_profiled(p),
            executor: ExecutorConfig::from_env_profiled(p),
            bootstrap: BootstrapConfig::from_env_profiled(p),
            client: ClientConfig::from_env_profiled(p),
            metrics: MetricsConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  server:     {}:{}", self.server.host, self.server.port);
        tracing::info!("  cluster:    bootstrap={}", self.cluster.bootstrap_servers);
        tracing::info!(
            "  executor:   workers={}, ttl={}s, capacity={}",
            self.executor.resolved_worker_threads(),
            self.executor.result_ttl_secs,
            self.executor.cache_capacity
        );
        tracing::info!("  bootstrap:  timeout={}s", self.bootstrap.start_timeout_secs);
        tracing::info!("  client:     url={}", self.client.url.as_deref().unwrap_or("(none)"));
        tracing::info!("  metrics:    interval={}ms", self.metrics.calculation_interval_ms);
    }

    /// Return a redacted view safe for API responses.
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "server": { "host": self.server.host, "port": self.server.port },
            "cluster": {
                "bootstrap_servers": self.cluster.bootstrap_servers,
                "client_id": self.cluster.client_id,
            },
            "executor": {
                "worker_threads": self.executor.resolved_worker_threads(),
                "result_ttl_secs": self.executor.result_ttl_secs,
                "cache_capacity": self.executor.cache_capacity,
            },
            "bootstrap": { "start_timeout_secs": self.bootstrap.start_timeout_secs },
            "client": { "configured": self.client.is_configured() },
            "metrics": { "calculation_interval_ms": self.metrics.calculation_interval_ms },
        })
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origin: String,
    /// Upper bound for a task request waiting on its result.
    pub async_request_timeout_ms: u64,
}

impl ServerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "HOST", "0.0.0.0"),
            port: profiled_env_parse(p, "PORT", 8082),
            cors_origin: profiled_env_or(p, "CORS_ORIGIN", "*"),
            async_request_timeout_ms: profiled_env_parse(p, "ASYNC_REQUEST_TIMEOUT_MS", 60_000),
        }
    }

    pub fn async_request_timeout(&self) -> Duration {
        Duration::from_millis(self.async_request_timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8082,
            cors_origin: "*".to_string(),
            async_request_timeout_ms: 60_000,
        }
    }
}

// ── Cluster ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub bootstrap_servers: String,
    pub client_id: String,
    pub request_timeout_ms: u64,
}

impl ClusterConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            bootstrap_servers: profiled_env_or(p, "KAFKA_BOOTSTRAP_SERVERS", "localhost:9092"),
            client_id: profiled_env_or(p, "KAFKA_CLIENT_ID", "kman"),
            request_timeout_ms: profiled_env_parse(p, "KAFKA_REQUEST_TIMEOUT_MS", 30_000),
        }
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: "localhost:9092".to_string(),
            client_id: "kman".to_string(),
            request_timeout_ms: 30_000,
        }
    }
}

// ── Task executors ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Concurrent background computations per executor. 0 = 2 × cores.
    pub worker_threads: usize,
    /// Touched-expiry TTL of cached task results.
    pub result_ttl_secs: u64,
    /// Max cached results per executor.
    pub cache_capacity: usize,
    /// A cached result stays actual while `elapsed × ratio` exceeds its age.
    pub actuality_ratio: f64,
}

impl ExecutorConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            worker_threads: profiled_env_parse(p, "EXECUTOR_WORKER_THREADS", 0),
            result_ttl_secs: profiled_env_parse(p, "TASK_RESULT_TTL_SECS", 86_400),
            cache_capacity: profiled_env_parse(p, "TASK_RESULT_CACHE_CAPACITY", 10_000),
            actuality_ratio: profiled_env_parse(p, "TASK_RESULT_ACTUALITY_RATIO", 20.0),
        }
    }

    /// Resolve worker count (0 means twice the available parallelism).
    pub fn resolved_worker_threads(&self) -> usize {
        if self.worker_threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get() * 2)
                .unwrap_or(8)
        } else {
            self.worker_threads
        }
    }

    pub fn result_ttl(&self) -> Duration {
        Duration::from_secs(self.result_ttl_secs)
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            result_ttl_secs: 86_400,
            cache_capacity: 10_000,
            actuality_ratio: 20.0,
        }
    }
}

// ── Bootstrap ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapConfig {
    /// Per-component limit for `start_async`.
    pub start_timeout_secs: u64,
}

impl BootstrapConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            start_timeout_secs: profiled_env_parse(p, "BOOTSTRAP_START_TIMEOUT_SECS", 600),
        }
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self { start_timeout_secs: 600 }
    }
}

// ── Remote client ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of a remote instance, e.g. `http://kman:8082`.
    pub url: Option<String>,
    pub timeout_ms: u64,
}

impl ClientConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            url: profiled_env_opt(p, "KMAN_URL"),
            timeout_ms: profiled_env_parse(p, "KMAN_CLIENT_TIMEOUT_MS", 60_000),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.url.is_some()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self { url: None, timeout_ms: 60_000 }
    }
}

// ── User-defined metrics ──────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub calculation_interval_ms: u64,
}

impl MetricsConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            calculation_interval_ms: profiled_env_parse(p, "UDM_CALCULATION_INTERVAL_MS", 60_000),
        }
    }

    pub fn calculation_interval(&self) -> Duration {
        Duration::from_millis(self.calculation_interval_ms)
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { calculation_interval_ms: 60_000 }
    }
}
