//! Boundary to the messaging cluster's administrative API.
//!
//! Every cluster-facing task wraps exactly one logical call on this trait.
//! Implementations report unreachable brokers as
//! [`ManagerError::Transport`](crate::error::ManagerError::Transport) and
//! failed operations as any other variant.

pub mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ConsumerGroupInfo, OffsetRanges, RecordFetchRequest, RecordFetchResult, TopicPartition};

pub use memory::InMemoryCluster;

/// Topic config key holding the cleanup policy.
pub const CLEANUP_POLICY_CONFIG: &str = "cleanup.policy";
pub const CLEANUP_POLICY_DELETE: &str = "delete";

#[async_trait]
pub trait ClusterAdmin: Send + Sync {
    async fn topic_exists(&self, topic: &str) -> Result<bool>;

    /// Current offset range of every partition of the given topics.
    async fn fetch_offset_ranges(&self, topics: &[String]) -> Result<OffsetRanges>;

    /// Earliest offset per partition whose timestamp is >= `timestamp_ms`.
    async fn fetch_offsets_for_time(
        &self,
        topic: &str,
        timestamp_ms: i64,
    ) -> Result<BTreeMap<TopicPartition, i64>>;

    async fn fetch_records(&self, topic: &str, request: &RecordFetchRequest) -> Result<RecordFetchResult>;

    async fn describe_topic_config(&self, topic: &str) -> Result<BTreeMap<String, String>>;

    async fn alter_topic_config(&self, topic: &str, entries: BTreeMap<String, String>) -> Result<()>;

    /// Delete every record of the topic; returns the new low watermarks.
    async fn delete_all_records(&self, topic: &str) -> Result<BTreeMap<TopicPartition, i64>>;

    async fn list_consumer_groups(&self) -> Result<Vec<ConsumerGroupInfo>>;

    async fn describe_consumer_group(&self, group: &str) -> Result<ConsumerGroupInfo>;

    async fn reset_consumer_group_offsets(
        &self,
        group: &str,
        offsets: &BTreeMap<TopicPartition, i64>,
    ) -> Result<()>;

    /// Drop the group's committed offsets for one topic.
    async fn delete_consumer_group_offsets(&self, group: &str, topic: &str) -> Result<()>;

    async fn delete_consumer_group(&self, group: &str) -> Result<()>;
}
