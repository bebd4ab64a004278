use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use kman_core::{ClusterAdmin, ManagerError, OffsetRanges, StorageType, TopicPartition};

use crate::executor::{StatefulTask, Task};
use crate::result::TaskResult;

/// Offset ranges of every topic a consumer group has committed offsets for.
pub struct ConsumerGroupTopicOffsetFetcher {
    admin: Arc<dyn ClusterAdmin>,
}

impl ConsumerGroupTopicOffsetFetcher {
    pub fn new(admin: Arc<dyn ClusterAdmin>) -> Self {
        Self { admin }
    }
}

#[async_trait]
impl StatefulTask for ConsumerGroupTopicOffsetFetcher {
    type Key = String;
    type Output = OffsetRanges;

    fn name(&self) -> &str {
        super::CONSUMER_GROUP_TOPIC_OFFSET_FETCHER
    }

    async fn run(&self, group: &String) -> Result<TaskResult<OffsetRanges>, ManagerError> {
        TaskResult::capture(async {
            let info = self.admin.describe_consumer_group(group).await?;
            let topics: Vec<String> = info.topic_names().into_iter().collect();
            if topics.is_empty() {
                return Ok(OffsetRanges::new());
            }
            self.admin.fetch_offset_ranges(&topics).await
        })
        .await
    }
}

/// Moves a consumer group's committed offsets. Returns the offsets applied.
pub struct ConsumerGroupOffsetResetter {
    admin: Arc<dyn ClusterAdmin>,
}

impl ConsumerGroupOffsetResetter {
    pub fn new(admin: Arc<dyn ClusterAdmin>) -> Self {
        Self { admin }
    }
}

#[async_trait]
impl Task for ConsumerGroupOffsetResetter {
    type Key = String;
    type Input = BTreeMap<TopicPartition, i64>;
    type Output = BTreeMap<TopicPartition, i64>;

    fn name(&self) -> &str {
        super::CONSUMER_GROUP_OFFSET_RESETTER
    }

    async fn run(
        &self,
        group: &String,
        offsets: BTreeMap<TopicPartition, i64>,
    ) -> Result<TaskResult<Self::Output>, ManagerError> {
        TaskResult::capture(async {
            let info = self.admin.describe_consumer_group(group).await?;
            if info.storage == StorageType::Zookeeper {
                return Err(ManagerError::invalid_argument(
                    "Resetting offsets for ZK-backed consumer groups is not supported",
                ));
            }
            if offsets.is_empty() {
                return Ok(offsets);
            }
            self.admin.reset_consumer_group_offsets(group, &offsets).await?;
            Ok(offsets)
        })
        .await
    }
}
