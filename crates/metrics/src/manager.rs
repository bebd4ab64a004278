use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use kman_core::{ConsumerGroupInfo, ManagerError, OffsetRanges};
use kman_exec::Executors;
use kman_repo::KeyValueRepo;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::library::{ConsumerGroupPartitionLagMetric, TopicPartitionOffsetIncreaseMetric};
use crate::metric::{sanitize_name, CalculatedGauge};

// ── Types ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UdMetricType {
    TopicOffsetIncrease,
    ConsumerGroupLag,
}

impl UdMetricType {
    pub fn description(&self) -> &'static str {
        match self {
            Self::TopicOffsetIncrease => {
                "Calculates topic offset increase. Separate metric is created for each topic-partition."
            }
            Self::ConsumerGroupLag => {
                "Calculates consumer group lag. Separate metric is created for each topic-partition."
            }
        }
    }

    /// Name of the metric for `resource` (a topic or a consumer group).
    pub fn format_name(&self, resource: &str) -> String {
        match self {
            Self::TopicOffsetIncrease => format!("topic_offset_increase_{}", resource),
            Self::ConsumerGroupLag => format!("consumer_group_lag_{}", resource),
        }
    }
}

impl fmt::Display for UdMetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TopicOffsetIncrease => write!(f, "TOPIC_OFFSET_INCREASE"),
            Self::ConsumerGroupLag => write!(f, "CONSUMER_GROUP_LAG"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UdMetricConfig {
    /// Topics whose lag is tracked; consumer group lag only.
    #[serde(default)]
    pub topic_names: Vec<String>,
}

/// A registered user-defined metric. Creation failures are kept in `errors`
/// instead of failing registration; such a metric has no gauges.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UdMetricInfo {
    pub name: String,
    pub metric_type: UdMetricType,
    pub resource_name: String,
    pub config: UdMetricConfig,
    pub gauge_names: Vec<String>,
    pub errors: Vec<String>,
}

impl UdMetricInfo {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// One exposed gauge reading. Unknown values are NaN.
#[derive(Debug, Clone, Serialize)]
pub struct GaugeSample {
    pub name: String,
    pub tags: BTreeMap<String, String>,
    pub value: f64,
}

struct PartitionGauge {
    key: String,
    tags: BTreeMap<String, String>,
    metric: Arc<dyn CalculatedGauge>,
}

struct Registered {
    info: UdMetricInfo,
    gauges: Vec<PartitionGauge>,
}

// ── Manager ───────────────────────────────────────────────────

/// Registry of user-defined metrics.
pub struct UdMetricManager {
    executors: Executors,
    groups: Arc<dyn KeyValueRepo<String, ConsumerGroupInfo>>,
    registry: RwLock<BTreeMap<String, Registered>>,
}

impl UdMetricManager {
    pub fn new(executors: Executors, groups: Arc<dyn KeyValueRepo<String, ConsumerGroupInfo>>) -> Self {
        Self {
            executors,
            groups,
            registry: RwLock::new(BTreeMap::new()),
        }
    }

    /// Build the gauges for `resource_name` and register them under the
    /// type's name, replacing any metric of the same name.
    pub async fn create_or_replace(
        &self,
        metric_type: UdMetricType,
        resource_name: &str,
        config: UdMetricConfig,
    ) -> Result<UdMetricInfo, ManagerError> {
        if resource_name.trim().is_empty() {
            return Err(ManagerError::invalid_argument("Resource name is blank"));
        }
        let name = metric_type.format_name(resource_name);

        let (gauges, errors) = match self.create_gauges(metric_type, resource_name, &config).await {
            Ok(gauges) => (gauges, Vec::new()),
            Err(e) => {
                warn!(metric = %name, error = %e, "Failed to create user-defined metric");
                (Vec::new(), vec![e.to_string()])
            }
        };

        let info = UdMetricInfo {
            name: name.clone(),
            metric_type,
            resource_name: resource_name.to_string(),
            config,
            gauge_names: gauges.iter().map(|g| g.key.clone()).collect(),
            errors,
        };
        let replaced = self
            .registry
            .write()
            .unwrap()
            .insert(name.clone(), Registered { info: info.clone(), gauges })
            .is_some();
        info!(metric = %name, gauges = info.gauge_names.len(), replaced, "User-defined metric registered");
        Ok(info)
    }

    /// Returns whether a metric was removed.
    pub fn remove(&self, name: &str) -> bool {
        let removed = self.registry.write().unwrap().remove(name).is_some();
        if removed {
            info!(metric = %name, "User-defined metric removed");
        }
        removed
    }

    pub fn get(&self, name: &str) -> Option<UdMetricInfo> {
        self.registry.read().unwrap().get(name).map(|r| r.info.clone())
    }

    /// All metrics ordered by name.
    pub fn list(&self) -> Vec<UdMetricInfo> {
        self.registry.read().unwrap().values().map(|r| r.info.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.registry.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current reading of every gauge, tagged by resource and partition.
    pub fn snapshot(&self) -> Vec<GaugeSample> {
        self.registry
            .read()
            .unwrap()
            .values()
            .flat_map(|r| {
                r.gauges.iter().map(|g| GaugeSample {
                    name: r.info.name.clone(),
                    tags: g.tags.clone(),
                    value: g.metric.gauge_value(),
                })
            })
            .collect()
    }

    /// Every gauge with a display name, for the scheduled calculator.
    pub(crate) fn calculated_metrics(&self) -> Vec<(String, Arc<dyn CalculatedGauge>)> {
        self.registry
            .read()
            .unwrap()
            .values()
            .flat_map(|r| {
                r.gauges
                    .iter()
                    .map(|g| (format!("{}.{}", r.info.name, g.key), g.metric.clone()))
            })
            .collect()
    }

    async fn topic_partitions(&self, topic: &str) -> Result<OffsetRanges, ManagerError> {
        self.executors
            .topic_offset_range_fetcher
            .get_result_if_actual_or_refresh(&topic.to_string())
            .await?
            .into_value()
    }

    async fn create_gauges(
        &self,
        metric_type: UdMetricType,
        resource_name: &str,
        config: &UdMetricConfig,
    ) -> Result<Vec<PartitionGauge>, ManagerError> {
        let mut gauges = Vec::new();
        match metric_type {
            UdMetricType::TopicOffsetIncrease => {
                for partition in self.topic_partitions(resource_name).await?.into_keys() {
                    let metric = TopicPartitionOffsetIncreaseMetric::new(
                        partition.clone(),
                        self.executors.topic_offset_range_fetcher.clone(),
                    );
                    gauges.push(PartitionGauge {
                        key: sanitize_name(&partition.to_string()),
                        tags: metric.tags(),
                        metric: Arc::new(metric),
                    });
                }
            }
            UdMetricType::ConsumerGroupLag => {
                validate_topic_names(&config.topic_names)?;
                // Sanity check: the group must be known.
                self.groups.get(&resource_name.to_string())?;
                for topic in &config.topic_names {
                    for partition in self.topic_partitions(topic).await?.into_keys() {
                        let metric = ConsumerGroupPartitionLagMetric::new(
                            resource_name,
                            partition.clone(),
                            self.groups.clone(),
                            self.executors.consumer_group_topic_offset_fetcher.clone(),
                        );
                        gauges.push(PartitionGauge {
                            key: sanitize_name(&partition.to_string()),
                            tags: metric.tags(),
                            metric: Arc::new(metric),
                        });
                    }
                }
            }
        }
        Ok(gauges)
    }
}

fn validate_topic_names(topics: &[String]) -> Result<(), ManagerError> {
    if topics.is_empty() {
        return Err(ManagerError::invalid_argument("'topicNames' is missing"));
    }
    if topics.iter().any(|t| t.trim().is_empty()) {
        return Err(ManagerError::invalid_argument("'topicNames' has blank elements"));
    }
    Ok(())
}
