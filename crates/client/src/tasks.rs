//! Operations executed by a remote instance.

use std::sync::Arc;

use async_trait::async_trait;
use kman_core::api::{
    self, ConsumerGroupOffsetResetRequest, ConsumerGroupTaskRequest, TopicOffsetForTimeRequest,
    TopicRecordFetchTaskRequest, TopicTaskRequest,
};
use kman_core::config::ExecutorConfig;
use kman_core::{ManagerError, OffsetRanges, RecordFetchRequest, RecordFetchResult};
use kman_exec::bundle::{on_demand, stateful};
use kman_exec::ops::{self, OffsetTimeSeriesSource, TopicOffsetTimeSeries};
use kman_exec::{CacheManager, Executors, PartitionOffsets, StatefulTask, Task, TaskResult};
use tracing::info;

use crate::client::RestClient;

fn topic_request(topic: &str) -> TopicTaskRequest {
    TopicTaskRequest {
        topic_name: topic.to_string(),
    }
}

// ── Stateful ──────────────────────────────────────────────────

pub struct RestTopicOffsetRangeFetcher {
    client: Arc<RestClient>,
}

impl RestTopicOffsetRangeFetcher {
    pub fn new(client: Arc<RestClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StatefulTask for RestTopicOffsetRangeFetcher {
    type Key = String;
    type Output = OffsetRanges;

    fn name(&self) -> &str {
        ops::TOPIC_OFFSET_RANGE_FETCHER
    }

    async fn run(&self, topic: &String) -> Result<TaskResult<OffsetRanges>, ManagerError> {
        self.client
            .post_task(api::TOPIC_OFFSET_RANGE_FETCHER_PATH, &topic_request(topic))
            .await
    }
}

/// The remote instance records the series; this only reads it.
#[async_trait]
impl OffsetTimeSeriesSource for RestTopicOffsetRangeFetcher {
    async fn offset_time_series(&self, topic: &str) -> Result<TopicOffsetTimeSeries, ManagerError> {
        self.client.get_json(&api::offset_time_series_path(topic)).await
    }
}

pub struct RestTopicRecordCounter {
    client: Arc<RestClient>,
}

impl RestTopicRecordCounter {
    pub fn new(client: Arc<RestClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StatefulTask for RestTopicRecordCounter {
    type Key = String;
    type Output = i64;

    fn name(&self) -> &str {
        ops::TOPIC_RECORD_COUNTER
    }

    async fn run(&self, topic: &String) -> Result<TaskResult<i64>, ManagerError> {
        self.client
            .post_task(api::TOPIC_RECORD_COUNTER_PATH, &topic_request(topic))
            .await
    }
}

pub struct RestConsumerGroupTopicOffsetFetcher {
    client: Arc<RestClient>,
}

impl RestConsumerGroupTopicOffsetFetcher {
    pub fn new(client: Arc<RestClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StatefulTask for RestConsumerGroupTopicOffsetFetcher {
    type Key = String;
    type Output = OffsetRanges;

    fn name(&self) -> &str {
        ops::CONSUMER_GROUP_TOPIC_OFFSET_FETCHER
    }

    async fn run(&self, group: &String) -> Result<TaskResult<OffsetRanges>, ManagerError> {
        let request = ConsumerGroupTaskRequest {
            group_name: group.clone(),
        };
        self.client
            .post_task(api::CONSUMER_GROUP_TOPIC_OFFSET_FETCHER_PATH, &request)
            .await
    }
}

// ── On demand ─────────────────────────────────────────────────

pub struct RestTopicOffsetForTimeFetcher {
    client: Arc<RestClient>,
}

impl RestTopicOffsetForTimeFetcher {
    pub fn new(client: Arc<RestClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Task for RestTopicOffsetForTimeFetcher {
    type Key = String;
    type Input = i64;
    type Output = PartitionOffsets;

    fn name(&self) -> &str {
        ops::TOPIC_OFFSET_FOR_TIME_FETCHER
    }

    async fn run(&self, topic: &String, timestamp: i64) -> Result<TaskResult<PartitionOffsets>, ManagerError> {
        let request = TopicOffsetForTimeRequest {
            topic_name: topic.clone(),
            timestamp,
        };
        self.client
            .post_task(api::TOPIC_OFFSET_FOR_TIME_FETCHER_PATH, &request)
            .await
    }
}

pub struct RestTopicRecordFetcher {
    client: Arc<RestClient>,
}

impl RestTopicRecordFetcher {
    pub fn new(client: Arc<RestClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Task for RestTopicRecordFetcher {
    type Key = String;
    type Input = RecordFetchRequest;
    type Output = RecordFetchResult;

    fn name(&self) -> &str {
        ops::TOPIC_RECORD_FETCHER
    }

    async fn run(
        &self,
        topic: &String,
        fetch_request: RecordFetchRequest,
    ) -> Result<TaskResult<RecordFetchResult>, ManagerError> {
        let request = TopicRecordFetchTaskRequest {
            topic_name: topic.clone(),
            fetch_request,
        };
        self.client.post_task(api::TOPIC_RECORD_FETCHER_PATH, &request).await
    }
}

pub struct RestTopicPurger {
    client: Arc<RestClient>,
}

impl RestTopicPurger {
    pub fn new(client: Arc<RestClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Task for RestTopicPurger {
    type Key = String;
    type Input = ();
    type Output = PartitionOffsets;

    fn name(&self) -> &str {
        ops::TOPIC_PURGER
    }

    async fn run(&self, topic: &String, _: ()) -> Result<TaskResult<PartitionOffsets>, ManagerError> {
        self.client.post_task(api::TOPIC_PURGER_PATH, &topic_request(topic)).await
    }
}

pub struct RestConsumerGroupOffsetResetter {
    client: Arc<RestClient>,
}

impl RestConsumerGroupOffsetResetter {
    pub fn new(client: Arc<RestClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Task for RestConsumerGroupOffsetResetter {
    type Key = String;
    type Input = PartitionOffsets;
    type Output = PartitionOffsets;

    fn name(&self) -> &str {
        ops::CONSUMER_GROUP_OFFSET_RESETTER
    }

    async fn run(
        &self,
        group: &String,
        offsets: PartitionOffsets,
    ) -> Result<TaskResult<PartitionOffsets>, ManagerError> {
        let request = ConsumerGroupOffsetResetRequest {
            group_name: group.clone(),
            offsets,
        };
        self.client
            .post_task(api::CONSUMER_GROUP_OFFSET_RESETTER_PATH, &request)
            .await
    }
}

// ── Bundle ────────────────────────────────────────────────────

/// Executors delegating every operation to the instance behind `client`.
/// Results are still cached locally.
pub fn remote_executors(
    client: Arc<RestClient>,
    caches: &CacheManager,
    config: &ExecutorConfig,
) -> Result<Executors, ManagerError> {
    let offset_ranges = Arc::new(RestTopicOffsetRangeFetcher::new(client.clone()));
    let executors = Executors {
        topic_offset_range_fetcher: stateful(offset_ranges.clone(), caches, config)?,
        topic_record_counter: stateful(Arc::new(RestTopicRecordCounter::new(client.clone())), caches, config)?,
        consumer_group_topic_offset_fetcher: stateful(
            Arc::new(RestConsumerGroupTopicOffsetFetcher::new(client.clone())),
            caches,
            config,
        )?,
        topic_offset_for_time_fetcher: on_demand(Arc::new(RestTopicOffsetForTimeFetcher::new(client.clone()))),
        topic_record_fetcher: on_demand(Arc::new(RestTopicRecordFetcher::new(client.clone()))),
        topic_purger: on_demand(Arc::new(RestTopicPurger::new(client.clone()))),
        consumer_group_offset_resetter: on_demand(Arc::new(RestConsumerGroupOffsetResetter::new(client.clone()))),
        offset_time_series: offset_ranges,
    };
    info!(remote = %client.base_url(), "Remote executors ready");
    Ok(executors)
}
