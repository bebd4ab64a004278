//! Built-in schedule-calculated gauges. Both read only cached executor
//! results and never trigger a computation from `value()`.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use kman_core::{ConsumerGroupInfo, ManagerError, OffsetRange, OffsetRanges, TopicPartition};
use kman_exec::{StatefulExecutorRef, TaskErrorKind};
use kman_repo::KeyValueRepo;
use tracing::{debug, warn};

use crate::metric::{Gauge, ScheduleCalculatedMetric};

fn cached_range(
    fetcher: &StatefulExecutorRef<String, OffsetRanges>,
    key: &String,
    partition: &TopicPartition,
) -> Option<OffsetRange> {
    fetcher.get_result(key)?.value()?.get(partition).copied()
}

// ── Topic offset increase ─────────────────────────────────────

/// Offset growth of one partition since the previous calculation.
pub struct TopicPartitionOffsetIncreaseMetric {
    partition: TopicPartition,
    topic: String,
    offset_ranges: StatefulExecutorRef<String, OffsetRanges>,
    previous: Mutex<Option<OffsetRange>>,
}

impl TopicPartitionOffsetIncreaseMetric {
    pub fn new(partition: TopicPartition, offset_ranges: StatefulExecutorRef<String, OffsetRanges>) -> Self {
        Self {
            topic: partition.topic.clone(),
            partition,
            offset_ranges,
            previous: Mutex::new(None),
        }
    }

    pub fn partition(&self) -> &TopicPartition {
        &self.partition
    }

    pub fn tags(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("topic".to_string(), self.topic.clone()),
            ("partition".to_string(), self.partition.partition.to_string()),
        ])
    }

    /// False once the latest fetch found the topic missing. Recreating the
    /// metric fetches again.
    fn topic_exists(&self) -> bool {
        let missing = self
            .offset_ranges
            .get_result(&self.topic)
            .and_then(|result| result.error().map(|e| e.kind == TaskErrorKind::NotFound))
            .unwrap_or(false);
        if missing {
            warn!(topic = %self.topic, "Topic doesn't exist");
        }
        !missing
    }
}

impl ScheduleCalculatedMetric for TopicPartitionOffsetIncreaseMetric {
    fn calculate_value(&self) -> Result<(), ManagerError> {
        if !self.topic_exists() {
            return Ok(());
        }
        self.offset_ranges.submit(&self.topic)?;
        if let Some(range) = cached_range(&self.offset_ranges, &self.topic, &self.partition) {
            *self.previous.lock().unwrap() = Some(range);
        }
        Ok(())
    }
}

impl Gauge for TopicPartitionOffsetIncreaseMetric {
    fn value(&self) -> Option<f64> {
        if !self.topic_exists() {
            return None;
        }
        let current = cached_range(&self.offset_ranges, &self.topic, &self.partition)?;
        let previous = (*self.previous.lock().unwrap())?;
        if previous.largest > current.largest {
            debug!(partition = %self.partition, "Offsets went backwards, increase unknown");
            return None;
        }
        Some((current.largest - previous.largest) as f64)
    }
}

// ── Consumer group lag ────────────────────────────────────────

/// Records between a group's committed offset and the partition end.
pub struct ConsumerGroupPartitionLagMetric {
    group: String,
    partition: TopicPartition,
    groups: Arc<dyn KeyValueRepo<String, ConsumerGroupInfo>>,
    group_offsets: StatefulExecutorRef<String, OffsetRanges>,
}

impl ConsumerGroupPartitionLagMetric {
    pub fn new(
        group: impl Into<String>,
        partition: TopicPartition,
        groups: Arc<dyn KeyValueRepo<String, ConsumerGroupInfo>>,
        group_offsets: StatefulExecutorRef<String, OffsetRanges>,
    ) -> Self {
        Self {
            group: group.into(),
            partition,
            groups,
            group_offsets,
        }
    }

    pub fn partition(&self) -> &TopicPartition {
        &self.partition
    }

    pub fn tags(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("group".to_string(), self.group.clone()),
            ("topic".to_string(), self.partition.topic.clone()),
            ("partition".to_string(), self.partition.partition.to_string()),
        ])
    }

    fn group_exists(&self) -> bool {
        let exists = self.groups.contains(&self.group);
        if !exists {
            warn!(group = %self.group, "Consumer group doesn't exist");
        }
        exists
    }
}

impl ScheduleCalculatedMetric for ConsumerGroupPartitionLagMetric {
    fn calculate_value(&self) -> Result<(), ManagerError> {
        if !self.group_exists() {
            return Ok(());
        }
        self.group_offsets.submit(&self.group)?;
        Ok(())
    }
}

impl Gauge for ConsumerGroupPartitionLagMetric {
    fn value(&self) -> Option<f64> {
        if !self.group_exists() {
            return None;
        }
        let committed = match self.groups.get(&self.group) {
            Ok(info) => *info.offsets.get(&self.partition)?,
            Err(e) => {
                warn!(group = %self.group, error = %e, "Failed to read committed offsets");
                return None;
            }
        };
        let range = cached_range(&self.group_offsets, &self.group, &self.partition)?;
        Some(range.lag(committed) as f64)
    }
}
