//! Bounded per-partition history of observed end offsets.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::types::TopicPartition;

/// Points kept per partition.
pub const MAX_POINTS: usize = 10;

/// End offsets of one partition sampled at minute granularity.
///
/// A sample falling into an already recorded minute replaces it; once more
/// than [`MAX_POINTS`] minutes are recorded the oldest one is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetTimeSeries {
    pub topic: String,
    pub partition: i32,
    data: BTreeMap<DateTime<Utc>, i64>,
}

fn granularity() -> TimeDelta {
    TimeDelta::minutes(1)
}

fn truncate(at: DateTime<Utc>) -> DateTime<Utc> {
    at.duration_trunc(granularity()).unwrap_or(at)
}

impl OffsetTimeSeries {
    pub fn new(partition: &TopicPartition) -> Self {
        Self {
            topic: partition.topic.clone(),
            partition: partition.partition,
            data: BTreeMap::new(),
        }
    }

    pub fn topic_partition(&self) -> TopicPartition {
        TopicPartition::new(self.topic.clone(), self.partition)
    }

    pub fn append(&mut self, at: DateTime<Utc>, offset: i64) {
        self.data.insert(truncate(at), offset);
        while self.data.len() > MAX_POINTS {
            self.data.pop_first();
        }
    }

    pub fn data(&self) -> &BTreeMap<DateTime<Utc>, i64> {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn value_at(&self, at: DateTime<Utc>) -> Option<i64> {
        self.data.get(&truncate(at)).copied()
    }

    fn previous_entry(&self, at: DateTime<Utc>) -> Option<(DateTime<Utc>, i64)> {
        self.data
            .range(..truncate(at))
            .next_back()
            .map(|(k, v)| (*k, *v))
    }

    /// Offset growth between the minute of `at` and the minute before it.
    pub fn delta_at(&self, at: DateTime<Utc>) -> Option<i64> {
        let current = self.value_at(at)?;
        let (_, previous) = self.previous_entry(at)?;
        Some(current - previous)
    }

    pub fn current_delta(&self) -> Option<i64> {
        self.delta_at(Utc::now())
    }

    /// Offsets per `unit`, measured from the end of the previous sample's
    /// minute up to `at`.
    pub fn rate_per_at(&self, unit: Duration, at: DateTime<Utc>) -> Option<i64> {
        let current = self.value_at(at)?;
        let (previous_key, previous) = self.previous_entry(at)?;

        let elapsed_secs = (at - (previous_key + granularity())).num_seconds();
        if elapsed_secs <= 0 {
            return Some(0);
        }

        let delta = (current - previous) as f64;
        Some((unit.as_secs() as f64 * delta / elapsed_secs as f64).round() as i64)
    }

    pub fn current_rate_per_sec(&self) -> Option<i64> {
        self.rate_per_at(Duration::from_secs(1), Utc::now())
    }

    pub fn current_rate_per_minute(&self) -> Option<i64> {
        self.rate_per_at(Duration::from_secs(60), Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, m, s).unwrap()
    }

    fn series() -> OffsetTimeSeries {
        OffsetTimeSeries::new(&TopicPartition::new("orders", 6))
    }

    #[test]
    fn same_minute_replaces() {
        let mut ts = series();
        ts.append(at(10, 0, 5), 100);
        ts.append(at(10, 0, 55), 120);
        assert_eq!(ts.len(), 1);
        assert_eq!(ts.value_at(at(10, 0, 30)), Some(120));
    }

    #[test]
    fn keeps_only_latest_points() {
        let mut ts = series();
        for minute in 0..15 {
            ts.append(at(10, minute, 0), minute as i64 * 10);
        }
        assert_eq!(ts.len(), MAX_POINTS);
        assert_eq!(ts.value_at(at(10, 4, 0)), None);
        assert_eq!(ts.value_at(at(10, 5, 0)), Some(50));
    }

    #[test]
    fn delta_against_previous_sample() {
        let mut ts = series();
        ts.append(at(10, 0, 0), 100);
        ts.append(at(10, 3, 0), 160);
        assert_eq!(ts.delta_at(at(10, 3, 40)), Some(60));
        // Nothing recorded in the minute asked for.
        assert_eq!(ts.delta_at(at(10, 4, 0)), None);
        // No earlier sample.
        assert_eq!(ts.delta_at(at(10, 0, 0)), None);
    }

    #[test]
    fn rate_uses_time_since_previous_minute_end() {
        let mut ts = series();
        ts.append(at(10, 0, 0), 100);
        ts.append(at(10, 2, 0), 220);
        // previous minute ends at 10:01:00, 90s elapsed at 10:02:30
        assert_eq!(ts.rate_per_at(Duration::from_secs(60), at(10, 2, 30)), Some(80));
        assert_eq!(ts.rate_per_at(Duration::from_secs(1), at(10, 1, 0)), None);
    }

    #[test]
    fn serializes_with_topic_and_partition() {
        let mut ts = series();
        ts.append(at(10, 0, 0), 100);
        let json = serde_json::to_value(&ts).unwrap();
        assert_eq!(json["topic"], "orders");
        assert_eq!(json["partition"], 6);
        assert_eq!(json["data"].as_object().unwrap().len(), 1);
    }
}
