use std::sync::Arc;
use std::time::Duration;

use kman_core::config::ExecutorConfig;
use kman_core::{ConsumerGroupInfo, InMemoryCluster, OffsetRange, StorageType, TopicPartition};
use kman_exec::{CacheManager, Executors};
use kman_metrics::{
    ConsumerGroupPartitionLagMetric, Gauge, ScheduleCalculatedMetric, ScheduledMetricCalculator,
    TopicPartitionOffsetIncreaseMetric, UdMetricConfig, UdMetricManager, UdMetricType,
};
use kman_repo::ClusterConsumerGroupRepo;

struct Fixture {
    cluster: Arc<InMemoryCluster>,
    executors: Executors,
    groups: Arc<ClusterConsumerGroupRepo>,
    _caches: CacheManager,
}

async fn fixture() -> Fixture {
    let cluster = Arc::new(InMemoryCluster::new());
    cluster.create_topic("orders", 2);
    cluster.set_offset_range(&TopicPartition::new("orders", 0), OffsetRange::new(0, 10));
    cluster.add_consumer_group(
        ConsumerGroupInfo::new("billing", StorageType::Kafka)
            .with_offset(TopicPartition::new("orders", 0), 4)
            .with_offset(TopicPartition::new("orders", 1), 0),
    );

    let config = ExecutorConfig::default();
    let caches = CacheManager::from_config(&config);
    let executors = Executors::cluster(cluster.clone(), &caches, &config).unwrap();
    let groups = Arc::new(ClusterConsumerGroupRepo::new(cluster.clone(), StorageType::Kafka));
    groups.refresh().await.unwrap();
    Fixture {
        cluster,
        executors,
        groups,
        _caches: caches,
    }
}

fn orders(partition: i32) -> TopicPartition {
    TopicPartition::new("orders", partition)
}

#[tokio::test]
async fn offset_increase_between_calculations() {
    let f = fixture().await;
    let topic = "orders".to_string();
    let metric = TopicPartitionOffsetIncreaseMetric::new(orders(0), f.executors.topic_offset_range_fetcher.clone());

    // Nothing cached yet.
    assert_eq!(metric.value(), None);
    assert!(metric.gauge_value().is_nan());

    f.executors.topic_offset_range_fetcher.execute_detailed(&topic).await.unwrap();
    metric.calculate_value().unwrap();
    for ts in 0..5 {
        f.cluster.produce(&orders(0), ts, None, Some("x"));
    }
    // Joins the computation submitted by calculate_value.
    f.executors.topic_offset_range_fetcher.execute_detailed(&topic).await.unwrap();

    assert_eq!(metric.value(), Some(5.0));
}

#[tokio::test]
async fn offset_increase_is_unknown_when_offsets_go_back() {
    let f = fixture().await;
    let topic = "orders".to_string();
    let metric = TopicPartitionOffsetIncreaseMetric::new(orders(0), f.executors.topic_offset_range_fetcher.clone());

    f.executors.topic_offset_range_fetcher.execute_detailed(&topic).await.unwrap();
    metric.calculate_value().unwrap();
    f.cluster.set_offset_range(&orders(0), OffsetRange::new(0, 3));
    f.executors.topic_offset_range_fetcher.execute_detailed(&topic).await.unwrap();

    assert_eq!(metric.value(), None);
}

#[tokio::test]
async fn offset_increase_stops_submitting_for_a_missing_topic() {
    let f = fixture().await;
    let ghost = "ghost".to_string();
    let metric = TopicPartitionOffsetIncreaseMetric::new(
        TopicPartition::new("ghost", 0),
        f.executors.topic_offset_range_fetcher.clone(),
    );

    // The first round finds out the topic is gone.
    metric.calculate_value().unwrap();
    let result = f.executors.topic_offset_range_fetcher.execute_detailed(&ghost).await.unwrap();
    assert!(result.error().is_some());
    let lookups = f.cluster.calls("topic_exists");

    metric.calculate_value().unwrap();
    assert!(!f.executors.topic_offset_range_fetcher.is_running(&ghost));
    assert_eq!(f.cluster.calls("topic_exists"), lookups);
    assert!(metric.gauge_value().is_nan());
}

#[tokio::test]
async fn lag_reads_committed_offsets_and_cached_ranges() {
    let f = fixture().await;
    let group = "billing".to_string();
    let lag = |partition| {
        ConsumerGroupPartitionLagMetric::new(
            "billing",
            orders(partition),
            f.groups.clone(),
            f.executors.consumer_group_topic_offset_fetcher.clone(),
        )
    };
    let (p0, p1) = (lag(0), lag(1));

    assert_eq!(p0.value(), None);
    p0.calculate_value().unwrap();
    f.executors.consumer_group_topic_offset_fetcher.execute_detailed(&group).await.unwrap();

    assert_eq!(p0.value(), Some(6.0));
    assert_eq!(p1.value(), Some(0.0));
    assert_eq!(p0.tags()["group"], "billing");
}

#[tokio::test]
async fn lag_of_unknown_group_is_nan_and_submits_nothing() {
    let f = fixture().await;
    let metric = ConsumerGroupPartitionLagMetric::new(
        "ghost",
        orders(0),
        f.groups.clone(),
        f.executors.consumer_group_topic_offset_fetcher.clone(),
    );
    metric.calculate_value().unwrap();
    assert!(!f.executors.consumer_group_topic_offset_fetcher.is_running(&"ghost".to_string()));
    assert!(metric.gauge_value().is_nan());
}

#[tokio::test]
async fn manager_registers_one_gauge_per_partition() {
    let f = fixture().await;
    let manager = UdMetricManager::new(f.executors.clone(), f.groups.clone());

    let increase = manager
        .create_or_replace(UdMetricType::TopicOffsetIncrease, "orders", UdMetricConfig::default())
        .await
        .unwrap();
    assert_eq!(increase.name, "topic_offset_increase_orders");
    assert_eq!(increase.gauge_names, vec!["orders-0", "orders-1"]);
    assert!(!increase.has_errors());

    let lag = manager
        .create_or_replace(
            UdMetricType::ConsumerGroupLag,
            "billing",
            UdMetricConfig {
                topic_names: vec!["orders".into()],
            },
        )
        .await
        .unwrap();
    assert_eq!(lag.gauge_names.len(), 2);

    let names: Vec<String> = manager.list().into_iter().map(|m| m.name).collect();
    assert_eq!(names, vec!["consumer_group_lag_billing", "topic_offset_increase_orders"]);

    // Lag ranges are not fetched yet, increase has no previous calculation.
    let snapshot = manager.snapshot();
    assert_eq!(snapshot.len(), 4);
    assert!(snapshot.iter().all(|s| s.value.is_nan()));

    assert!(manager.remove("consumer_group_lag_billing"));
    assert!(!manager.remove("consumer_group_lag_billing"));
    assert_eq!(manager.len(), 1);
}

#[tokio::test]
async fn creation_failures_are_recorded_on_the_metric() {
    let f = fixture().await;
    let manager = UdMetricManager::new(f.executors.clone(), f.groups.clone());

    let missing = manager
        .create_or_replace(UdMetricType::TopicOffsetIncrease, "ghost", UdMetricConfig::default())
        .await
        .unwrap();
    assert!(missing.has_errors());
    assert_eq!(missing.errors, vec!["Topic 'ghost' doesn't exist".to_string()]);
    assert!(missing.gauge_names.is_empty());

    let no_topics = manager
        .create_or_replace(UdMetricType::ConsumerGroupLag, "billing", UdMetricConfig::default())
        .await
        .unwrap();
    assert!(no_topics.errors[0].contains("topicNames"));

    assert!(manager
        .create_or_replace(UdMetricType::TopicOffsetIncrease, " ", UdMetricConfig::default())
        .await
        .is_err());
    assert_eq!(manager.len(), 2);
}

#[tokio::test]
async fn calculation_round_skips_failures() {
    let f = fixture().await;
    let manager = Arc::new(UdMetricManager::new(f.executors.clone(), f.groups.clone()));
    manager
        .create_or_replace(UdMetricType::TopicOffsetIncrease, "orders", UdMetricConfig::default())
        .await
        .unwrap();
    let calculator = ScheduledMetricCalculator::new(manager, Duration::from_secs(60));

    let round = calculator.calculate();
    assert_eq!((round.calculated, round.failed), (2, 0));

    f.executors.close();
    let round = calculator.calculate();
    assert_eq!((round.calculated, round.failed), (0, 2));
}

#[tokio::test(start_paused = true)]
async fn calculator_runs_at_a_fixed_rate_until_stopped() {
    let f = fixture().await;
    let manager = Arc::new(UdMetricManager::new(f.executors.clone(), f.groups.clone()));
    manager
        .create_or_replace(UdMetricType::TopicOffsetIncrease, "orders", UdMetricConfig::default())
        .await
        .unwrap();
    let fetches = || f.cluster.calls("fetch_offset_ranges");
    assert_eq!(fetches(), 1);

    let calculator = Arc::new(ScheduledMetricCalculator::new(manager, Duration::from_secs(60)));
    calculator.start();

    tokio::time::sleep(Duration::from_secs(29)).await;
    assert_eq!(fetches(), 1);

    // First round after half an interval; both partitions share one fetch.
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(fetches(), 2);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(fetches(), 3);

    calculator.stop().await;
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(fetches(), 3);
}
