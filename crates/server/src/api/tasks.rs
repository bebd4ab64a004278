//! `/api/tasks` endpoints: one per operation, the counterpart of the remote
//! delegate.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::Json;
use kman_core::api::{
    ConsumerGroupOffsetResetRequest, ConsumerGroupTaskRequest, TopicOffsetForTimeRequest,
    TopicRecordFetchTaskRequest, TopicTaskRequest,
};
use kman_core::{ManagerError, OffsetRanges, RecordFetchResult};
use kman_exec::{ExecutorRef, PartitionOffsets, TaskResult, TopicOffsetTimeSeries};

use crate::error::ApiError;
use crate::state::AppState;

type TaskResponse<V> = Result<Json<TaskResult<V>>, ApiError>;

/// Wait at most `limit` for `outcome`; only successful results are 200.
async fn respond<V>(
    limit: Duration,
    outcome: impl Future<Output = Result<TaskResult<V>, ManagerError>>,
) -> TaskResponse<V> {
    let result = tokio::time::timeout(limit, outcome)
        .await
        .map_err(|_| ApiError::Timeout(limit))??;
    match result.error() {
        Some(error) => Err(error.clone().into()),
        None => Ok(Json(result)),
    }
}

/// Run an on-demand execution on its own task. A timed-out or abandoned
/// request stops waiting, the execution still runs to the end.
fn detached<K, I, V>(
    executor: &ExecutorRef<K, I, V>,
    key: K,
    input: I,
) -> impl Future<Output = Result<TaskResult<V>, ManagerError>>
where
    K: Send + Sync + 'static,
    I: Send + 'static,
    V: Send + 'static,
{
    let executor = Arc::clone(executor);
    let name = executor.name().to_string();
    let handle = tokio::spawn(async move { executor.execute_detailed(&key, input).await });
    async move {
        match handle.await {
            Ok(outcome) => outcome,
            Err(e) => Err(ManagerError::Other(format!("execution of '{}' did not complete: {}", name, e))),
        }
    }
}

// ── Stateful ──────────────────────────────────────────────────

pub async fn topic_record_counter(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TopicTaskRequest>,
) -> TaskResponse<i64> {
    let executor = &state.executors.topic_record_counter;
    respond(state.request_timeout, executor.execute_detailed(&req.topic_name)).await
}

pub async fn topic_offset_range_fetcher(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TopicTaskRequest>,
) -> TaskResponse<OffsetRanges> {
    let executor = &state.executors.topic_offset_range_fetcher;
    respond(state.request_timeout, executor.execute_detailed(&req.topic_name)).await
}

pub async fn topic_offset_time_series(
    State(state): State<Arc<AppState>>,
    Path(topic): Path<String>,
) -> Result<Json<TopicOffsetTimeSeries>, ApiError> {
    let series = state.executors.offset_time_series.offset_time_series(&topic).await?;
    Ok(Json(series))
}

pub async fn consumer_group_topic_offset_fetcher(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ConsumerGroupTaskRequest>,
) -> TaskResponse<OffsetRanges> {
    let executor = &state.executors.consumer_group_topic_offset_fetcher;
    respond(state.request_timeout, executor.execute_detailed(&req.group_name)).await
}

// ── On demand ─────────────────────────────────────────────────

pub async fn topic_offset_for_time_fetcher(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TopicOffsetForTimeRequest>,
) -> TaskResponse<PartitionOffsets> {
    let executor = &state.executors.topic_offset_for_time_fetcher;
    respond(state.request_timeout, detached(executor, req.topic_name, req.timestamp)).await
}

pub async fn topic_record_fetcher(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TopicRecordFetchTaskRequest>,
) -> TaskResponse<RecordFetchResult> {
    let executor = &state.executors.topic_record_fetcher;
    respond(state.request_timeout, detached(executor, req.topic_name, req.fetch_request)).await
}

pub async fn topic_purger(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TopicTaskRequest>,
) -> TaskResponse<PartitionOffsets> {
    let executor = &state.executors.topic_purger;
    respond(state.request_timeout, detached(executor, req.topic_name, ())).await
}

pub async fn consumer_group_offset_resetter(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ConsumerGroupOffsetResetRequest>,
) -> TaskResponse<PartitionOffsets> {
    let executor = &state.executors.consumer_group_offset_resetter;
    respond(state.request_timeout, detached(executor, req.group_name, req.offsets)).await
}
