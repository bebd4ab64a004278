//! Executor contracts and the task traits they run.

use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::future::{BoxFuture, Shared};
use kman_core::ManagerError;

use crate::result::TaskResult;

pub(crate) type SharedOutcome<V> = Shared<BoxFuture<'static, Result<TaskResult<V>, ManagerError>>>;

// ── Tasks ─────────────────────────────────────────────────────

/// A keyed computation whose latest result is cached per key.
#[async_trait]
pub trait StatefulTask: Send + Sync + 'static {
    type Key: Clone + Eq + Hash + Debug + Send + Sync + 'static;
    type Output: Clone + Send + Sync + 'static;

    /// Used in logs and as the result cache name.
    fn name(&self) -> &str;

    /// One bounded computation. `Err` only for transport failures.
    async fn run(&self, key: &Self::Key) -> Result<TaskResult<Self::Output>, ManagerError>;

    /// Called with every finished result before it is cached.
    fn on_complete(&self, _key: &Self::Key, _result: &TaskResult<Self::Output>) {}
}

/// A computation run synchronously on the caller's task with extra input.
#[async_trait]
pub trait Task: Send + Sync + 'static {
    type Key: Debug + Send + Sync + 'static;
    type Input: Send + 'static;
    type Output: Send + 'static;

    fn name(&self) -> &str;

    async fn run(
        &self,
        key: &Self::Key,
        input: Self::Input,
    ) -> Result<TaskResult<Self::Output>, ManagerError>;
}

// ── Executors ─────────────────────────────────────────────────

/// Handle to an in-flight computation. Every handle for the same key
/// resolves to the same outcome.
pub struct TaskHandle<V> {
    inner: SharedOutcome<V>,
}

impl<V> Clone for TaskHandle<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V: Clone> TaskHandle<V> {
    pub(crate) fn new(inner: SharedOutcome<V>) -> Self {
        Self { inner }
    }

    /// Outcome if the computation has already finished.
    pub fn peek(&self) -> Option<Result<TaskResult<V>, ManagerError>> {
        self.inner.peek().cloned()
    }
}

impl<V: Clone> Future for TaskHandle<V> {
    type Output = Result<TaskResult<V>, ManagerError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.inner).poll(cx)
    }
}

/// Executor that computes in the background and remembers the latest result
/// per key.
#[async_trait]
pub trait AsyncStatefulTaskExecutor<K, V>: Send + Sync
where
    K: Send + Sync + 'static,
    V: Send + 'static,
{
    fn name(&self) -> &str;

    /// Start a computation for `key` unless one is already running, in which
    /// case its handle is returned. Never waits.
    fn submit(&self, key: &K) -> Result<TaskHandle<V>, ManagerError>;

    /// Latest cached result; never triggers a computation.
    fn get_result(&self, key: &K) -> Option<TaskResult<V>>;

    fn is_running(&self, key: &K) -> bool;

    /// Wait for a computation newer than anything cached.
    async fn execute_detailed(&self, key: &K) -> Result<TaskResult<V>, ManagerError>;

    async fn execute(&self, key: &K) -> Result<V, ManagerError> {
        self.execute_detailed(key).await?.into_value()
    }

    /// Cached result when it is successful and still actual, a fresh
    /// computation otherwise.
    async fn get_result_if_actual_or_refresh(&self, key: &K) -> Result<TaskResult<V>, ManagerError>;

    fn evict(&self, key: &K);

    /// Stop accepting work and abort running computations.
    fn close(&self);
}

/// Executor running each computation on the caller's task.
#[async_trait]
pub trait TaskExecutor<K, I, V>: Send + Sync
where
    K: Send + Sync + 'static,
    I: Send + 'static,
    V: Send + 'static,
{
    fn name(&self) -> &str;

    async fn execute_detailed(&self, key: &K, input: I) -> Result<TaskResult<V>, ManagerError>;

    async fn execute(&self, key: &K, input: I) -> Result<V, ManagerError> {
        self.execute_detailed(key, input).await?.into_value()
    }
}
