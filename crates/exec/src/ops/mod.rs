//! Cluster-backed operations. Each task wraps one logical call on
//! [`ClusterAdmin`].

pub mod consumer_group;
pub mod topic;

use std::collections::BTreeMap;

use async_trait::async_trait;
use kman_core::{ClusterAdmin, ManagerError, OffsetTimeSeries, TopicPartition};

pub use consumer_group::{ConsumerGroupOffsetResetter, ConsumerGroupTopicOffsetFetcher};
pub use topic::{
    TopicOffsetForTimeFetcher, TopicOffsetRangeFetcher, TopicPurger, TopicRecordCounter,
    TopicRecordFetcher,
};

// ── Task names ────────────────────────────────────────────────

pub const TOPIC_OFFSET_RANGE_FETCHER: &str = "topic_offset_range_fetcher";
pub const TOPIC_RECORD_COUNTER: &str = "topic_record_counter";
pub const CONSUMER_GROUP_TOPIC_OFFSET_FETCHER: &str = "consumer_group_topic_offset_fetcher";
pub const TOPIC_OFFSET_FOR_TIME_FETCHER: &str = "topic_offset_for_time_fetcher";
pub const TOPIC_RECORD_FETCHER: &str = "topic_record_fetcher";
pub const TOPIC_PURGER: &str = "topic_purger";
pub const CONSUMER_GROUP_OFFSET_RESETTER: &str = "consumer_group_offset_resetter";

/// Offset history recorded by the offset range fetcher, per partition.
pub type TopicOffsetTimeSeries = BTreeMap<TopicPartition, OffsetTimeSeries>;

#[async_trait]
pub trait OffsetTimeSeriesSource: Send + Sync {
    /// Empty when the topic was never fetched.
    async fn offset_time_series(&self, topic: &str) -> Result<TopicOffsetTimeSeries, ManagerError>;
}

/// Not-found unless `topic` exists.
pub(crate) async fn ensure_topic(admin: &dyn ClusterAdmin, topic: &str) -> Result<(), ManagerError> {
    if admin.topic_exists(topic).await? {
        Ok(())
    } else {
        Err(ManagerError::not_found(format!("Topic '{}' doesn't exist", topic)))
    }
}
