//! Background executor with per-key coalescing and a result cache.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use kman_core::config::ExecutorConfig;
use kman_core::ManagerError;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

use crate::cache::{Cache, CacheManager};
use crate::executor::{AsyncStatefulTaskExecutor, SharedOutcome, StatefulTask, TaskHandle};
use crate::result::TaskResult;

/// Prefix of the per-task result cache names.
pub const RESULT_CACHE_PREFIX: &str = "task_results_";

struct InFlight<V> {
    outcome: SharedOutcome<V>,
    abort: AbortHandle,
    /// Set by `evict`; the outcome still reaches waiting callers but is not
    /// cached.
    evicted: bool,
}

struct Inner<T: StatefulTask> {
    task: Arc<T>,
    name: String,
    cache: Arc<dyn Cache<T::Key, TaskResult<T::Output>>>,
    in_flight: Mutex<HashMap<T::Key, InFlight<T::Output>>>,
    permits: Semaphore,
    runtime: Handle,
    closed: AtomicBool,
    actuality_ratio: f64,
}

/// Runs a [`StatefulTask`] in the background, at most once per key at a
/// time, keeping the latest finished result of every key.
pub struct StatefulExecutor<T: StatefulTask> {
    inner: Arc<Inner<T>>,
}

impl<T: StatefulTask> StatefulExecutor<T> {
    /// Build on the current tokio runtime.
    pub fn new(task: Arc<T>, caches: &CacheManager, config: &ExecutorConfig) -> Result<Self, ManagerError> {
        let runtime = Handle::try_current()
            .map_err(|e| ManagerError::Other(format!("no tokio runtime for executor: {}", e)))?;
        Self::with_runtime(task, caches, config, runtime)
    }

    /// Build on an explicit runtime, so `submit` also works from threads
    /// outside of it.
    pub fn with_runtime(
        task: Arc<T>,
        caches: &CacheManager,
        config: &ExecutorConfig,
        runtime: Handle,
    ) -> Result<Self, ManagerError> {
        let name = task.name().to_string();
        let cache = caches.cache(&format!("{}{}", RESULT_CACHE_PREFIX, name))?;
        let workers = config.resolved_worker_threads();
        info!(task = %name, workers, "Executor started");
        Ok(Self {
            inner: Arc::new(Inner {
                task,
                name,
                cache,
                in_flight: Mutex::new(HashMap::new()),
                permits: Semaphore::new(workers),
                runtime,
                closed: AtomicBool::new(false),
                actuality_ratio: config.actuality_ratio,
            }),
        })
    }

    pub fn task(&self) -> &Arc<T> {
        &self.inner.task
    }

    fn closed_error(&self) -> ManagerError {
        ManagerError::Closed(format!("executor '{}' is closed", self.inner.name))
    }
}

impl<T: StatefulTask> Inner<T> {
    async fn compute(self: Arc<Self>, key: T::Key) -> Result<TaskResult<T::Output>, ManagerError> {
        // Runs when the computation panics or is aborted before completing.
        let mut guard = InFlightGuard {
            inner: &self,
            key: Some(key.clone()),
        };

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ManagerError::Closed(format!("executor '{}' is closed", self.name)))?;

        debug!(task = %self.name, key = ?key, "Computation started");
        let outcome = self.task.run(&key).await;

        match &outcome {
            Ok(result) => {
                if let Some(e) = result.error() {
                    error!(task = %self.name, key = ?key, error = %e, "Execution of task failed");
                } else {
                    debug!(task = %self.name, key = ?key, elapsed = %result.elapsed_hms(), "Computation finished");
                }
                self.task.on_complete(&key, result);
            }
            Err(e) => {
                warn!(task = %self.name, key = ?key, error = %e, "Computation could not reach its backend");
            }
        }

        // Publish the result and retire the in-flight entry in one step, so
        // a new submit either joins this computation or sees its result.
        let mut in_flight = self.in_flight.lock().unwrap();
        let evicted = in_flight.remove(&key).is_some_and(|running| running.evicted);
        match &outcome {
            Ok(result) if !evicted => self.cache.put(key.clone(), result.clone()),
            Ok(_) => debug!(task = %self.name, key = ?key, "Result evicted while running, not cached"),
            Err(_) => {}
        }
        guard.key = None;
        drop(in_flight);

        outcome
    }
}

struct InFlightGuard<'a, T: StatefulTask> {
    inner: &'a Inner<T>,
    key: Option<T::Key>,
}

impl<T: StatefulTask> Drop for InFlightGuard<'_, T> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            if let Ok(mut in_flight) = self.inner.in_flight.lock() {
                in_flight.remove(&key);
            }
        }
    }
}

#[async_trait]
impl<T: StatefulTask> AsyncStatefulTaskExecutor<T::Key, T::Output> for StatefulExecutor<T> {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn submit(&self, key: &T::Key) -> Result<TaskHandle<T::Output>, ManagerError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(self.closed_error());
        }

        let mut in_flight = self.inner.in_flight.lock().unwrap();
        if let Some(running) = in_flight.get(key) {
            debug!(task = %self.inner.name, key = ?key, "Joining running computation");
            return Ok(TaskHandle::new(running.outcome.clone()));
        }

        // Spawned while the map is locked: the computation cannot retire its
        // entry before it is inserted.
        let join = self.inner.runtime.spawn(self.inner.clone().compute(key.clone()));
        let abort = join.abort_handle();
        let name = self.inner.name.clone();
        let outcome: SharedOutcome<T::Output> = async move {
            match join.await {
                Ok(outcome) => outcome,
                Err(e) if e.is_cancelled() => {
                    Err(ManagerError::Closed(format!("computation of '{}' was aborted", name)))
                }
                Err(e) => Err(ManagerError::Other(format!("computation of '{}' panicked: {}", name, e))),
            }
        }
        .boxed()
        .shared();

        in_flight.insert(
            key.clone(),
            InFlight {
                outcome: outcome.clone(),
                abort,
                evicted: false,
            },
        );
        Ok(TaskHandle::new(outcome))
    }

    fn get_result(&self, key: &T::Key) -> Option<TaskResult<T::Output>> {
        self.inner.cache.get(key)
    }

    fn is_running(&self, key: &T::Key) -> bool {
        self.inner.in_flight.lock().unwrap().contains_key(key)
    }

    async fn execute_detailed(&self, key: &T::Key) -> Result<TaskResult<T::Output>, ManagerError> {
        self.submit(key)?.await
    }

    async fn get_result_if_actual_or_refresh(
        &self,
        key: &T::Key,
    ) -> Result<TaskResult<T::Output>, ManagerError> {
        if let Some(result) = self.get_result(key) {
            if result.is_successful() && result.is_actual_at(self.inner.actuality_ratio, Utc::now()) {
                return Ok(result);
            }
        }
        self.execute_detailed(key).await
    }

    fn evict(&self, key: &T::Key) {
        let mut in_flight = self.inner.in_flight.lock().unwrap();
        if let Some(running) = in_flight.get_mut(key) {
            running.evicted = true;
        }
        let removed = self.inner.cache.remove(key);
        drop(in_flight);
        if removed {
            debug!(task = %self.inner.name, key = ?key, "Result evicted");
        }
    }

    fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.permits.close();
        let running: Vec<InFlight<T::Output>> = {
            let mut in_flight = self.inner.in_flight.lock().unwrap();
            in_flight.drain().map(|(_, running)| running).collect()
        };
        for running in &running {
            running.abort.abort();
        }
        info!(task = %self.inner.name, aborted = running.len(), "Executor closed");
    }
}

impl<T: StatefulTask> Drop for StatefulExecutor<T> {
    fn drop(&mut self) {
        self.close();
    }
}
