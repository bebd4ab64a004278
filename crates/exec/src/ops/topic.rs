use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kman_core::cluster::{CLEANUP_POLICY_CONFIG, CLEANUP_POLICY_DELETE};
use kman_core::{
    ClusterAdmin, ManagerError, OffsetRanges, OffsetTimeSeries, RecordFetchRequest, RecordFetchResult,
    TopicPartition,
};
use tracing::{debug, warn};

use super::{ensure_topic, OffsetTimeSeriesSource, TopicOffsetTimeSeries};
use crate::executor::{StatefulTask, Task};
use crate::result::TaskResult;

// ── Offset ranges ─────────────────────────────────────────────

/// Offset range of every partition of a topic. Each successful fetch also
/// feeds the topic's offset time series.
pub struct TopicOffsetRangeFetcher {
    admin: Arc<dyn ClusterAdmin>,
    series: Mutex<HashMap<String, TopicOffsetTimeSeries>>,
}

impl TopicOffsetRangeFetcher {
    pub fn new(admin: Arc<dyn ClusterAdmin>) -> Self {
        Self {
            admin,
            series: Mutex::new(HashMap::new()),
        }
    }

    pub fn series_for(&self, topic: &str) -> TopicOffsetTimeSeries {
        self.series.lock().unwrap().get(topic).cloned().unwrap_or_default()
    }

    fn record(&self, topic: &str, result: &TaskResult<OffsetRanges>) {
        let Some(ranges) = result.value().filter(|ranges| !ranges.is_empty()) else {
            return;
        };
        let mut series = self.series.lock().unwrap();
        let topic_series = series.entry(topic.to_string()).or_default();
        for (partition, range) in ranges {
            topic_series
                .entry(partition.clone())
                .or_insert_with(|| OffsetTimeSeries::new(partition))
                .append(result.finished_at(), range.largest);
        }
    }
}

#[async_trait]
impl StatefulTask for TopicOffsetRangeFetcher {
    type Key = String;
    type Output = OffsetRanges;

    fn name(&self) -> &str {
        super::TOPIC_OFFSET_RANGE_FETCHER
    }

    async fn run(&self, topic: &String) -> Result<TaskResult<OffsetRanges>, ManagerError> {
        TaskResult::capture(async {
            ensure_topic(self.admin.as_ref(), topic).await?;
            self.admin.fetch_offset_ranges(std::slice::from_ref(topic)).await
        })
        .await
    }

    fn on_complete(&self, topic: &String, result: &TaskResult<OffsetRanges>) {
        self.record(topic, result);
    }
}

#[async_trait]
impl OffsetTimeSeriesSource for TopicOffsetRangeFetcher {
    async fn offset_time_series(&self, topic: &str) -> Result<TopicOffsetTimeSeries, ManagerError> {
        Ok(self.series_for(topic))
    }
}

// ── Record count ──────────────────────────────────────────────

/// Number of records currently held by a topic.
pub struct TopicRecordCounter {
    admin: Arc<dyn ClusterAdmin>,
}

impl TopicRecordCounter {
    pub fn new(admin: Arc<dyn ClusterAdmin>) -> Self {
        Self { admin }
    }
}

#[async_trait]
impl StatefulTask for TopicRecordCounter {
    type Key = String;
    type Output = i64;

    fn name(&self) -> &str {
        super::TOPIC_RECORD_COUNTER
    }

    async fn run(&self, topic: &String) -> Result<TaskResult<i64>, ManagerError> {
        TaskResult::capture(async {
            ensure_topic(self.admin.as_ref(), topic).await?;
            let ranges = self.admin.fetch_offset_ranges(std::slice::from_ref(topic)).await?;
            Ok(ranges.values().map(|range| range.size()).sum())
        })
        .await
    }
}

// ── Offsets for time ──────────────────────────────────────────

/// Earliest offset per partition at or after a timestamp (epoch millis).
pub struct TopicOffsetForTimeFetcher {
    admin: Arc<dyn ClusterAdmin>,
}

impl TopicOffsetForTimeFetcher {
    pub fn new(admin: Arc<dyn ClusterAdmin>) -> Self {
        Self { admin }
    }
}

#[async_trait]
impl Task for TopicOffsetForTimeFetcher {
    type Key = String;
    type Input = i64;
    type Output = BTreeMap<TopicPartition, i64>;

    fn name(&self) -> &str {
        super::TOPIC_OFFSET_FOR_TIME_FETCHER
    }

    async fn run(
        &self,
        topic: &String,
        timestamp: i64,
    ) -> Result<TaskResult<Self::Output>, ManagerError> {
        TaskResult::capture(async {
            ensure_topic(self.admin.as_ref(), topic).await?;
            self.admin.fetch_offsets_for_time(topic, timestamp).await
        })
        .await
    }
}

// ── Record browsing ───────────────────────────────────────────

pub struct TopicRecordFetcher {
    admin: Arc<dyn ClusterAdmin>,
}

impl TopicRecordFetcher {
    pub fn new(admin: Arc<dyn ClusterAdmin>) -> Self {
        Self { admin }
    }
}

#[async_trait]
impl Task for TopicRecordFetcher {
    type Key = String;
    type Input = RecordFetchRequest;
    type Output = RecordFetchResult;

    fn name(&self) -> &str {
        super::TOPIC_RECORD_FETCHER
    }

    async fn run(
        &self,
        topic: &String,
        request: RecordFetchRequest,
    ) -> Result<TaskResult<RecordFetchResult>, ManagerError> {
        TaskResult::capture(async {
            if request.limit == 0 {
                return Err(ManagerError::invalid_argument("Fetch limit must be positive"));
            }
            ensure_topic(self.admin.as_ref(), topic).await?;
            self.admin.fetch_records(topic, &request).await
        })
        .await
    }
}

// ── Purge ─────────────────────────────────────────────────────

/// Deletes every record of a topic, temporarily switching its cleanup policy
/// to `delete` when needed. Returns the new low watermarks.
pub struct TopicPurger {
    admin: Arc<dyn ClusterAdmin>,
}

impl TopicPurger {
    pub fn new(admin: Arc<dyn ClusterAdmin>) -> Self {
        Self { admin }
    }

    async fn set_cleanup_policy(&self, topic: &str, policy: &str) -> Result<(), ManagerError> {
        let entries = BTreeMap::from([(CLEANUP_POLICY_CONFIG.to_string(), policy.to_string())]);
        self.admin.alter_topic_config(topic, entries).await
    }

    async fn purge(&self, topic: &str) -> Result<BTreeMap<TopicPartition, i64>, ManagerError> {
        let config = self.admin.describe_topic_config(topic).await?;
        let original = config
            .get(CLEANUP_POLICY_CONFIG)
            .cloned()
            .unwrap_or_else(|| CLEANUP_POLICY_DELETE.to_string());
        if original == CLEANUP_POLICY_DELETE {
            return self.admin.delete_all_records(topic).await;
        }

        debug!(topic = %topic, policy = %original, "Switching cleanup policy for purge");
        self.set_cleanup_policy(topic, CLEANUP_POLICY_DELETE).await?;
        let deleted = self.admin.delete_all_records(topic).await;
        let restored = self.set_cleanup_policy(topic, &original).await;

        match (deleted, restored) {
            (Ok(watermarks), Ok(())) => Ok(watermarks),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), restored) => {
                if let Err(restore_err) = restored {
                    warn!(topic = %topic, error = %restore_err, "Failed to restore cleanup policy");
                }
                Err(e)
            }
        }
    }
}

#[async_trait]
impl Task for TopicPurger {
    type Key = String;
    type Input = ();
    type Output = BTreeMap<TopicPartition, i64>;

    fn name(&self) -> &str {
        super::TOPIC_PURGER
    }

    async fn run(&self, topic: &String, _input: ()) -> Result<TaskResult<Self::Output>, ManagerError> {
        TaskResult::capture(self.purge(topic)).await
    }
}

#[cfg(test)]
mod tests {
    use kman_core::{InMemoryCluster, OffsetRange};

    use super::*;
    use crate::error::TaskErrorKind;

    fn cluster_with_orders() -> Arc<InMemoryCluster> {
        let cluster = Arc::new(InMemoryCluster::new());
        cluster.create_topic("orders", 7);
        cluster.set_offset_range(&TopicPartition::new("orders", 6), OffsetRange::new(100, 200));
        cluster
    }

    #[tokio::test]
    async fn offset_ranges_feed_time_series() {
        let cluster = cluster_with_orders();
        let fetcher = TopicOffsetRangeFetcher::new(cluster);
        let topic = "orders".to_string();

        let result = fetcher.run(&topic).await.unwrap();
        fetcher.on_complete(&topic, &result);

        let tp = TopicPartition::new("orders", 6);
        assert_eq!(result.value().unwrap()[&tp], OffsetRange::new(100, 200));
        let series = fetcher.series_for("orders");
        assert_eq!(series.len(), 7);
        assert_eq!(series[&tp].value_at(result.finished_at()), Some(200));
        assert!(fetcher.series_for("payments").is_empty());
    }

    #[tokio::test]
    async fn missing_topic_is_a_not_found_result() {
        let fetcher = TopicRecordCounter::new(Arc::new(InMemoryCluster::new()));
        let result = fetcher.run(&"ghost".to_string()).await.unwrap();
        assert_eq!(result.error().unwrap().kind, TaskErrorKind::NotFound);
    }

    #[tokio::test]
    async fn record_count_sums_partition_sizes() {
        let counter = TopicRecordCounter::new(cluster_with_orders());
        let result = counter.run(&"orders".to_string()).await.unwrap();
        assert_eq!(result.value(), Some(&100));
    }

    #[tokio::test]
    async fn record_fetch_rejects_zero_limit() {
        let fetcher = TopicRecordFetcher::new(cluster_with_orders());
        let request = RecordFetchRequest {
            position: kman_core::FetchPosition::Offsets(BTreeMap::from([(0, 0)])),
            limit: 0,
            timeout_ms: 1_000,
        };
        let result = fetcher.run(&"orders".to_string(), request).await.unwrap();
        assert_eq!(result.error().unwrap().kind, TaskErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn purge_restores_compact_policy() {
        let cluster = cluster_with_orders();
        cluster.set_topic_config("orders", CLEANUP_POLICY_CONFIG, "compact");
        let purger = TopicPurger::new(cluster.clone());

        let result = purger.run(&"orders".to_string(), ()).await.unwrap();
        let watermarks = result.value().unwrap();
        assert_eq!(watermarks[&TopicPartition::new("orders", 6)], 200);

        assert_eq!(cluster.config_changes().len(), 2);
        assert_eq!(
            cluster.topic_config("orders").unwrap()[CLEANUP_POLICY_CONFIG],
            "compact"
        );
    }

    #[tokio::test]
    async fn purge_with_delete_policy_leaves_config_alone() {
        let cluster = cluster_with_orders();
        let purger = TopicPurger::new(cluster.clone());
        purger.run(&"orders".to_string(), ()).await.unwrap();
        assert!(cluster.config_changes().is_empty());
        assert_eq!(cluster.calls("delete_all_records"), 1);
    }
}
