//! Task REST surface shared by the server and the remote client.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{RecordFetchRequest, TopicPartition};

pub const TASKS_BASE: &str = "/api/tasks";

pub const TOPIC_RECORD_COUNTER_PATH: &str = "/api/tasks/topic-record-counter";
pub const TOPIC_OFFSET_RANGE_FETCHER_PATH: &str = "/api/tasks/topic-offset-range-fetcher";
pub const TOPIC_OFFSET_FOR_TIME_FETCHER_PATH: &str = "/api/tasks/topic-offset-for-time-fetcher";
pub const TOPIC_RECORD_FETCHER_PATH: &str = "/api/tasks/topic-record-fetcher";
pub const TOPIC_PURGER_PATH: &str = "/api/tasks/topic-purger";
pub const CONSUMER_GROUP_OFFSET_RESETTER_PATH: &str = "/api/tasks/consumer-group-offset-resetter";
pub const CONSUMER_GROUP_TOPIC_OFFSET_FETCHER_PATH: &str = "/api/tasks/consumer-group-topic-offset-fetcher";

/// Path of the offset time series of `topic`.
pub fn offset_time_series_path(topic: &str) -> String {
    format!("{}/{}", TOPIC_OFFSET_RANGE_FETCHER_PATH, topic)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicTaskRequest {
    pub topic_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicOffsetForTimeRequest {
    pub topic_name: String,
    /// Epoch millis.
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicRecordFetchTaskRequest {
    pub topic_name: String,
    pub fetch_request: RecordFetchRequest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerGroupTaskRequest {
    pub group_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerGroupOffsetResetRequest {
    pub group_name: String,
    pub offsets: BTreeMap<TopicPartition, i64>,
}

/// Body of every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}
