//! User-defined metrics over cached task results.
//!
//! A [`ScheduledMetricCalculator`] keeps the executors' caches warm by
//! submitting work on a fixed schedule; gauges only ever read the latest
//! cached result.

pub mod calculator;
pub mod library;
pub mod manager;
pub mod metric;

pub use calculator::{CalculationRound, ScheduledMetricCalculator};
pub use library::{ConsumerGroupPartitionLagMetric, TopicPartitionOffsetIncreaseMetric};
pub use manager::{GaugeSample, UdMetricConfig, UdMetricInfo, UdMetricManager, UdMetricType};
pub use metric::{sanitize_name, CalculatedGauge, Gauge, ScheduleCalculatedMetric};
