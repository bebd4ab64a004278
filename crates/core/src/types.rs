use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ManagerError;

// ── Topic partitions ──────────────────────────────────────────

/// A single partition of a topic.
///
/// Rendered as `<topic>-<partition>` so it can be used as a JSON map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TopicPartition {
    pub topic: String,
    pub partition: i32,
}

impl TopicPartition {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

impl fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.topic, self.partition)
    }
}

impl FromStr for TopicPartition {
    type Err = ManagerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Topic names may contain '-', the partition never does.
        let (topic, partition) = s.rsplit_once('-').ok_or_else(|| {
            ManagerError::invalid_argument(format!("'{}' is not a topic partition", s))
        })?;
        if topic.is_empty() {
            return Err(ManagerError::invalid_argument(format!(
                "'{}' has an empty topic name",
                s
            )));
        }
        let partition = partition.parse::<i32>().map_err(|_| {
            ManagerError::invalid_argument(format!("'{}' has an invalid partition", s))
        })?;
        Ok(Self::new(topic, partition))
    }
}

impl Serialize for TopicPartition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TopicPartition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ── Offsets ───────────────────────────────────────────────────

/// Offsets currently held by a partition: `[smallest, largest)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetRange {
    pub smallest: i64,
    pub largest: i64,
}

impl OffsetRange {
    pub fn new(smallest: i64, largest: i64) -> Self {
        Self { smallest, largest }
    }

    /// Number of records in the range.
    pub fn size(&self) -> i64 {
        (self.largest - self.smallest).max(0)
    }

    /// Records a consumer positioned at `committed` still has to read.
    pub fn lag(&self, committed: i64) -> i64 {
        (self.largest - committed).max(0)
    }
}

pub type OffsetRanges = BTreeMap<TopicPartition, OffsetRange>;

// ── Consumer groups ───────────────────────────────────────────

/// Where a consumer group keeps its committed offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StorageType {
    /// Offsets committed to the cluster's internal offsets topic.
    Kafka,
    /// Legacy offsets stored in Zookeeper.
    Zookeeper,
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageType::Kafka => write!(f, "KAFKA"),
            StorageType::Zookeeper => write!(f, "ZOOKEEPER"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerGroupInfo {
    pub name: String,
    pub storage: StorageType,
    #[serde(default)]
    pub offsets: BTreeMap<TopicPartition, i64>,
}

impl ConsumerGroupInfo {
    pub fn new(name: impl Into<String>, storage: StorageType) -> Self {
        Self {
            name: name.into(),
            storage,
            offsets: BTreeMap::new(),
        }
    }

    pub fn with_offset(mut self, partition: TopicPartition, offset: i64) -> Self {
        self.offsets.insert(partition, offset);
        self
    }

    /// Topics the group has committed offsets for.
    pub fn topic_names(&self) -> BTreeSet<String> {
        self.offsets.keys().map(|tp| tp.topic.clone()).collect()
    }

    pub fn consumes(&self, topic: &str) -> bool {
        self.offsets.keys().any(|tp| tp.topic == topic)
    }
}

// ── Record fetching ───────────────────────────────────────────

/// Where to start reading each partition (partition number → offset or
/// timestamp in epoch millis).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "positions")]
pub enum FetchPosition {
    Offsets(BTreeMap<i32, i64>),
    Timestamps(BTreeMap<i32, i64>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordFetchRequest {
    pub position: FetchPosition,
    pub limit: usize,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchedRecord {
    pub partition: i32,
    pub offset: i64,
    pub timestamp: DateTime<Utc>,
    pub key: Option<String>,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordFetchResult {
    pub records: Vec<FetchedRecord>,
    /// Offset to continue from, per partition.
    pub next_offsets: BTreeMap<i32, i64>,
}
