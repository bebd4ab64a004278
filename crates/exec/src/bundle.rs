use std::collections::BTreeMap;
use std::sync::Arc;

use kman_core::config::ExecutorConfig;
use kman_core::{ClusterAdmin, ManagerError, OffsetRanges, RecordFetchRequest, RecordFetchResult, TopicPartition};
use tracing::info;

use crate::cache::CacheManager;
use crate::executor::{AsyncStatefulTaskExecutor, StatefulTask, Task, TaskExecutor};
use crate::on_demand::OnDemandExecutor;
use crate::ops::{
    ConsumerGroupOffsetResetter, ConsumerGroupTopicOffsetFetcher, OffsetTimeSeriesSource,
    TopicOffsetForTimeFetcher, TopicOffsetRangeFetcher, TopicPurger, TopicRecordCounter,
    TopicRecordFetcher,
};
use crate::stateful::StatefulExecutor;

pub type PartitionOffsets = BTreeMap<TopicPartition, i64>;

pub type StatefulExecutorRef<K, V> = Arc<dyn AsyncStatefulTaskExecutor<K, V>>;
pub type ExecutorRef<K, I, V> = Arc<dyn TaskExecutor<K, I, V>>;

/// One executor per operation, independent of what backs them.
#[derive(Clone)]
pub struct Executors {
    pub topic_offset_range_fetcher: StatefulExecutorRef<String, OffsetRanges>,
    pub topic_record_counter: StatefulExecutorRef<String, i64>,
    pub consumer_group_topic_offset_fetcher: StatefulExecutorRef<String, OffsetRanges>,
    pub topic_offset_for_time_fetcher: ExecutorRef<String, i64, PartitionOffsets>,
    pub topic_record_fetcher: ExecutorRef<String, RecordFetchRequest, RecordFetchResult>,
    pub topic_purger: ExecutorRef<String, (), PartitionOffsets>,
    pub consumer_group_offset_resetter: ExecutorRef<String, PartitionOffsets, PartitionOffsets>,
    pub offset_time_series: Arc<dyn OffsetTimeSeriesSource>,
}

/// Wrap a stateful task into a shareable executor with its own result cache.
pub fn stateful<T: StatefulTask>(
    task: Arc<T>,
    caches: &CacheManager,
    config: &ExecutorConfig,
) -> Result<StatefulExecutorRef<T::Key, T::Output>, ManagerError> {
    Ok(Arc::new(StatefulExecutor::new(task, caches, config)?))
}

pub fn on_demand<T: Task>(task: Arc<T>) -> ExecutorRef<T::Key, T::Input, T::Output> {
    Arc::new(OnDemandExecutor::new(task))
}

impl Executors {
    /// Executors talking to the cluster directly.
    pub fn cluster(
        admin: Arc<dyn ClusterAdmin>,
        caches: &CacheManager,
        config: &ExecutorConfig,
    ) -> Result<Self, ManagerError> {
        let offset_ranges = Arc::new(TopicOffsetRangeFetcher::new(admin.clone()));
        let executors = Self {
            topic_offset_range_fetcher: stateful(offset_ranges.clone(), caches, config)?,
            topic_record_counter: stateful(Arc::new(TopicRecordCounter::new(admin.clone())), caches, config)?,
            consumer_group_topic_offset_fetcher: stateful(
                Arc::new(ConsumerGroupTopicOffsetFetcher::new(admin.clone())),
                caches,
                config,
            )?,
            topic_offset_for_time_fetcher: on_demand(Arc::new(TopicOffsetForTimeFetcher::new(admin.clone()))),
            topic_record_fetcher: on_demand(Arc::new(TopicRecordFetcher::new(admin.clone()))),
            topic_purger: on_demand(Arc::new(TopicPurger::new(admin.clone()))),
            consumer_group_offset_resetter: on_demand(Arc::new(ConsumerGroupOffsetResetter::new(admin))),
            offset_time_series: offset_ranges,
        };
        info!("Cluster executors ready");
        Ok(executors)
    }

    /// Close every background executor.
    pub fn close(&self) {
        self.topic_offset_range_fetcher.close();
        self.topic_record_counter.close();
        self.consumer_group_topic_offset_fetcher.close();
    }
}

#[cfg(test)]
mod tests {
    use kman_core::{InMemoryCluster, OffsetRange};

    use super::*;

    #[tokio::test]
    async fn orders_partition_six_range() {
        let cluster = Arc::new(InMemoryCluster::new());
        cluster.create_topic("orders", 7);
        cluster.set_offset_range(&TopicPartition::new("orders", 6), OffsetRange::new(100, 200));

        let caches = CacheManager::from_config(&ExecutorConfig::default());
        let executors = Executors::cluster(cluster, &caches, &ExecutorConfig::default()).unwrap();
        let topic = "orders".to_string();

        assert!(executors.topic_offset_range_fetcher.get_result(&topic).is_none());

        let result = executors.topic_offset_range_fetcher.execute_detailed(&topic).await.unwrap();
        let ranges = result.value().unwrap();
        let range = ranges[&"orders-6".parse::<TopicPartition>().unwrap()];
        assert_eq!((range.smallest, range.largest), (100, 200));

        let cached = executors.topic_offset_range_fetcher.get_result(&topic).unwrap();
        assert!(cached.finished_at() >= cached.started_at());
        assert_eq!(cached.value(), Some(ranges));

        let series = executors.offset_time_series.offset_time_series("orders").await.unwrap();
        assert_eq!(series.len(), 7);
    }

    #[tokio::test]
    async fn every_stateful_executor_gets_its_own_cache() {
        let cluster = Arc::new(InMemoryCluster::new());
        let caches = CacheManager::from_config(&ExecutorConfig::default());
        let _executors = Executors::cluster(cluster, &caches, &ExecutorConfig::default()).unwrap();
        assert_eq!(
            caches.cache_names(),
            vec![
                "task_results_consumer_group_topic_offset_fetcher".to_string(),
                "task_results_topic_offset_range_fetcher".to_string(),
                "task_results_topic_record_counter".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn closed_bundle_rejects_submissions() {
        let cluster = Arc::new(InMemoryCluster::new());
        let caches = CacheManager::from_config(&ExecutorConfig::default());
        let executors = Executors::cluster(cluster, &caches, &ExecutorConfig::default()).unwrap();
        executors.close();
        assert!(matches!(
            executors.topic_record_counter.submit(&"orders".to_string()),
            Err(ManagerError::Closed(_))
        ));
    }
}
