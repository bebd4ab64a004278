//! In-process cluster used by tests and local development.
//!
//! Calls can be paused on a gate so callers can observe work while it is in
//! flight, and failures can be injected per cluster instance.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::{watch, Notify};

use super::{ClusterAdmin, CLEANUP_POLICY_CONFIG, CLEANUP_POLICY_DELETE};
use crate::error::{ManagerError, Result};
use crate::types::{
    ConsumerGroupInfo, FetchPosition, FetchedRecord, OffsetRange, OffsetRanges, RecordFetchRequest,
    RecordFetchResult, StorageType, TopicPartition,
};

#[derive(Debug, Clone)]
struct StoredRecord {
    timestamp: DateTime<Utc>,
    key: Option<String>,
    value: Option<String>,
}

#[derive(Debug, Default)]
struct PartitionLog {
    smallest: i64,
    largest: i64,
    records: BTreeMap<i64, StoredRecord>,
}

#[derive(Debug, Default)]
struct TopicState {
    partitions: Vec<PartitionLog>,
    config: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct ClusterState {
    topics: BTreeMap<String, TopicState>,
    groups: BTreeMap<String, ConsumerGroupInfo>,
    config_changes: Vec<(String, BTreeMap<String, String>)>,
}

pub struct InMemoryCluster {
    state: Mutex<ClusterState>,
    calls: Mutex<HashMap<&'static str, usize>>,
    failure: Mutex<Option<ManagerError>>,
    gate: watch::Sender<bool>,
    /// Operation the gate applies to; every operation when unset.
    held: Mutex<Option<&'static str>>,
    call_started: Notify,
}

impl Default for InMemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCluster {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            state: Mutex::new(ClusterState::default()),
            calls: Mutex::new(HashMap::new()),
            failure: Mutex::new(None),
            gate,
            held: Mutex::new(None),
            call_started: Notify::new(),
        }
    }

    // ── Fixtures ──────────────────────────────────────────────

    pub fn create_topic(&self, topic: &str, partitions: usize) {
        let mut state = self.state.lock().unwrap();
        let entry = state.topics.entry(topic.to_string()).or_default();
        entry.partitions = (0..partitions).map(|_| PartitionLog::default()).collect();
        entry
            .config
            .insert(CLEANUP_POLICY_CONFIG.to_string(), CLEANUP_POLICY_DELETE.to_string());
    }

    pub fn set_topic_config(&self, topic: &str, key: &str, value: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(t) = state.topics.get_mut(topic) {
            t.config.insert(key.to_string(), value.to_string());
        }
    }

    /// Move a partition's offsets without materializing records.
    pub fn set_offset_range(&self, partition: &TopicPartition, range: OffsetRange) {
        let mut state = self.state.lock().unwrap();
        if let Some(log) = state
            .topics
            .get_mut(&partition.topic)
            .and_then(|t| t.partitions.get_mut(partition.partition as usize))
        {
            log.smallest = range.smallest;
            log.largest = range.largest;
            log.records.retain(|offset, _| *offset >= range.smallest && *offset < range.largest);
        }
    }

    /// Append a record; returns its offset.
    pub fn produce(
        &self,
        partition: &TopicPartition,
        timestamp_ms: i64,
        key: Option<&str>,
        value: Option<&str>,
    ) -> Option<i64> {
        let mut state = self.state.lock().unwrap();
        let log = state
            .topics
            .get_mut(&partition.topic)?
            .partitions
            .get_mut(partition.partition as usize)?;
        let offset = log.largest;
        log.records.insert(
            offset,
            StoredRecord {
                timestamp: Utc.timestamp_millis_opt(timestamp_ms).single().unwrap_or_else(Utc::now),
                key: key.map(str::to_string),
                value: value.map(str::to_string),
            },
        );
        log.largest += 1;
        Some(offset)
    }

    pub fn add_consumer_group(&self, group: ConsumerGroupInfo) {
        let mut state = self.state.lock().unwrap();
        state.groups.insert(group.name.clone(), group);
    }

    pub fn topic_config(&self, topic: &str) -> Option<BTreeMap<String, String>> {
        let state = self.state.lock().unwrap();
        state.topics.get(topic).map(|t| t.config.clone())
    }

    /// Every `alter_topic_config` call seen so far, in order.
    pub fn config_changes(&self) -> Vec<(String, BTreeMap<String, String>)> {
        self.state.lock().unwrap().config_changes.clone()
    }

    // ── Test hooks ────────────────────────────────────────────

    /// Number of times `operation` was invoked.
    pub fn calls(&self, operation: &str) -> usize {
        self.calls.lock().unwrap().get(operation).copied().unwrap_or(0)
    }

    /// Hold every subsequent call until [`resume`](Self::resume).
    pub fn pause(&self) {
        *self.held.lock().unwrap() = None;
        self.gate.send_replace(false);
    }

    /// Hold only calls of `operation` until [`resume`](Self::resume).
    pub fn pause_operation(&self, operation: &'static str) {
        *self.held.lock().unwrap() = Some(operation);
        self.gate.send_replace(false);
    }

    pub fn resume(&self) {
        self.gate.send_replace(true);
        *self.held.lock().unwrap() = None;
    }

    /// Resolves once a call has entered the cluster (one permit per call).
    pub async fn call_started(&self) {
        self.call_started.notified().await;
    }

    /// Fail every subsequent call with `error` (None clears it).
    pub fn fail_with(&self, error: Option<ManagerError>) {
        *self.failure.lock().unwrap() = error;
    }

    async fn enter(&self, operation: &'static str) -> Result<()> {
        *self.calls.lock().unwrap().entry(operation).or_default() += 1;
        self.call_started.notify_one();

        let held = self.held.lock().unwrap().map_or(true, |op| op == operation);
        if held {
            let mut gate = self.gate.subscribe();
            // The sender lives as long as `self`, so this only ends once open.
            let _ = gate.wait_for(|open| *open).await;
        }

        match self.failure.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn topic_missing(topic: &str) -> ManagerError {
        ManagerError::not_found(format!("Topic '{}' doesn't exist", topic))
    }

    fn group_missing(group: &str) -> ManagerError {
        ManagerError::not_found(format!("Consumer group '{}' doesn't exist", group))
    }
}

#[async_trait]
impl ClusterAdmin for InMemoryCluster {
    async fn topic_exists(&self, topic: &str) -> Result<bool> {
        self.enter("topic_exists").await?;
        Ok(self.state.lock().unwrap().topics.contains_key(topic))
    }

    async fn fetch_offset_ranges(&self, topics: &[String]) -> Result<OffsetRanges> {
        self.enter("fetch_offset_ranges").await?;
        let state = self.state.lock().unwrap();
        let mut ranges = OffsetRanges::new();
        for topic in topics {
            let t = state.topics.get(topic).ok_or_else(|| Self::topic_missing(topic))?;
            for (idx, log) in t.partitions.iter().enumerate() {
                ranges.insert(
                    TopicPartition::new(topic.clone(), idx as i32),
                    OffsetRange::new(log.smallest, log.largest),
                );
            }
        }
        Ok(ranges)
    }

    async fn fetch_offsets_for_time(
        &self,
        topic: &str,
        timestamp_ms: i64,
    ) -> Result<BTreeMap<TopicPartition, i64>> {
        self.enter("fetch_offsets_for_time").await?;
        let state = self.state.lock().unwrap();
        let t = state.topics.get(topic).ok_or_else(|| Self::topic_missing(topic))?;
        let mut offsets = BTreeMap::new();
        for (idx, log) in t.partitions.iter().enumerate() {
            let found = log
                .records
                .iter()
                .find(|(_, r)| r.timestamp.timestamp_millis() >= timestamp_ms)
                .map(|(offset, _)| *offset);
            if let Some(offset) = found {
                offsets.insert(TopicPartition::new(topic, idx as i32), offset);
            }
        }
        Ok(offsets)
    }

    async fn fetch_records(&self, topic: &str, request: &RecordFetchRequest) -> Result<RecordFetchResult> {
        self.enter("fetch_records").await?;
        let state = self.state.lock().unwrap();
        let t = state.topics.get(topic).ok_or_else(|| Self::topic_missing(topic))?;

        let mut result = RecordFetchResult::default();
        let starts: Vec<(i32, i64)> = match &request.position {
            FetchPosition::Offsets(offsets) => offsets.iter().map(|(p, o)| (*p, *o)).collect(),
            FetchPosition::Timestamps(timestamps) => timestamps
                .iter()
                .filter_map(|(p, ts)| {
                    let log = t.partitions.get(*p as usize)?;
                    log.records
                        .iter()
                        .find(|(_, r)| r.timestamp.timestamp_millis() >= *ts)
                        .map(|(offset, _)| (*p, *offset))
                })
                .collect(),
        };

        for (partition, start) in starts {
            let log = t.partitions.get(partition as usize).ok_or_else(|| {
                ManagerError::invalid_argument(format!("Topic '{}' has no partition {}", topic, partition))
            })?;
            let mut next = start.max(log.smallest);
            for (offset, record) in log.records.range(next..) {
                if result.records.len() >= request.limit {
                    break;
                }
                result.records.push(FetchedRecord {
                    partition,
                    offset: *offset,
                    timestamp: record.timestamp,
                    key: record.key.clone(),
                    value: record.value.clone(),
                });
                next = offset + 1;
            }
            result.next_offsets.insert(partition, next);
        }
        Ok(result)
    }

    async fn describe_topic_config(&self, topic: &str) -> Result<BTreeMap<String, String>> {
        self.enter("describe_topic_config").await?;
        let state = self.state.lock().unwrap();
        state
            .topics
            .get(topic)
            .map(|t| t.config.clone())
            .ok_or_else(|| Self::topic_missing(topic))
    }

    async fn alter_topic_config(&self, topic: &str, entries: BTreeMap<String, String>) -> Result<()> {
        self.enter("alter_topic_config").await?;
        let mut state = self.state.lock().unwrap();
        let t = state.topics.get_mut(topic).ok_or_else(|| Self::topic_missing(topic))?;
        t.config.extend(entries.clone());
        state.config_changes.push((topic.to_string(), entries));
        Ok(())
    }

    async fn delete_all_records(&self, topic: &str) -> Result<BTreeMap<TopicPartition, i64>> {
        self.enter("delete_all_records").await?;
        let mut state = self.state.lock().unwrap();
        let t = state.topics.get_mut(topic).ok_or_else(|| Self::topic_missing(topic))?;
        if t.config.get(CLEANUP_POLICY_CONFIG).map(String::as_str) != Some(CLEANUP_POLICY_DELETE) {
            return Err(ManagerError::Cluster(format!(
                "Topic '{}' doesn't allow record deletion with its cleanup policy",
                topic
            )));
        }
        let mut watermarks = BTreeMap::new();
        for (idx, log) in t.partitions.iter_mut().enumerate() {
            log.smallest = log.largest;
            log.records.clear();
            watermarks.insert(TopicPartition::new(topic, idx as i32), log.largest);
        }
        Ok(watermarks)
    }

    async fn list_consumer_groups(&self) -> Result<Vec<ConsumerGroupInfo>> {
        self.enter("list_consumer_groups").await?;
        Ok(self.state.lock().unwrap().groups.values().cloned().collect())
    }

    async fn describe_consumer_group(&self, group: &str) -> Result<ConsumerGroupInfo> {
        self.enter("describe_consumer_group").await?;
        let state = self.state.lock().unwrap();
        state.groups.get(group).cloned().ok_or_else(|| Self::group_missing(group))
    }

    async fn reset_consumer_group_offsets(
        &self,
        group: &str,
        offsets: &BTreeMap<TopicPartition, i64>,
    ) -> Result<()> {
        self.enter("reset_consumer_group_offsets").await?;
        let mut state = self.state.lock().unwrap();
        let info = state.groups.get_mut(group).ok_or_else(|| Self::group_missing(group))?;
        if info.storage == StorageType::Zookeeper {
            return Err(ManagerError::invalid_argument(
                "Resetting offsets for ZK-backed consumer groups is not supported",
            ));
        }
        info.offsets.extend(offsets.iter().map(|(tp, o)| (tp.clone(), *o)));
        Ok(())
    }

    async fn delete_consumer_group_offsets(&self, group: &str, topic: &str) -> Result<()> {
        self.enter("delete_consumer_group_offsets").await?;
        let mut state = self.state.lock().unwrap();
        let info = state.groups.get_mut(group).ok_or_else(|| Self::group_missing(group))?;
        info.offsets.retain(|tp, _| tp.topic != topic);
        Ok(())
    }

    async fn delete_consumer_group(&self, group: &str) -> Result<()> {
        self.enter("delete_consumer_group").await?;
        let mut state = self.state.lock().unwrap();
        state
            .groups
            .remove(group)
            .map(|_| ())
            .ok_or_else(|| Self::group_missing(group))
    }
}
