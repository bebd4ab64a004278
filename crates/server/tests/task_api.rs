use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use kman_core::cluster::CLEANUP_POLICY_CONFIG;
use kman_core::config::{ExecutorConfig, ServerConfig};
use kman_core::{ConsumerGroupInfo, InMemoryCluster, ManagerError, OffsetRange, StorageType, TopicPartition};
use kman_exec::{CacheManager, Executors};
use kman_server::{build_router, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;

fn app_with_timeout(timeout_ms: u64) -> (Arc<InMemoryCluster>, Router) {
    let cluster = Arc::new(InMemoryCluster::new());
    cluster.create_topic("orders", 7);
    cluster.set_offset_range(&TopicPartition::new("orders", 6), OffsetRange::new(100, 200));
    cluster.add_consumer_group(
        ConsumerGroupInfo::new("billing", StorageType::Kafka).with_offset(TopicPartition::new("orders", 6), 150),
    );
    cluster.add_consumer_group(ConsumerGroupInfo::new("legacy", StorageType::Zookeeper));

    let config = ExecutorConfig::default();
    let caches = CacheManager::from_config(&config);
    let executors = Executors::cluster(cluster.clone(), &caches, &config).unwrap();
    let server = ServerConfig {
        async_request_timeout_ms: timeout_ms,
        ..ServerConfig::default()
    };
    let state = Arc::new(AppState::new(executors, &server));
    (cluster, build_router(state))
}

fn app() -> (Arc<InMemoryCluster>, Router) {
    app_with_timeout(5_000)
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn health_is_ok() {
    let (_, app) = app();
    let (status, body) = call(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn record_counter_returns_task_result() {
    let (_, app) = app();
    let (status, body) = call(
        &app,
        "POST",
        "/api/tasks/topic-record-counter",
        Some(json!({"topicName": "orders"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["value"], 100);
    assert!(body["error"].is_null());
    assert!(body["startedAt"].is_string());
    assert!(body["finishedAt"].is_string());
}

#[tokio::test]
async fn missing_topic_is_404_with_message() {
    let (_, app) = app();
    let (status, body) = call(
        &app,
        "POST",
        "/api/tasks/topic-offset-range-fetcher",
        Some(json!({"topicName": "ghost"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Topic 'ghost' doesn't exist");
}

#[tokio::test]
async fn offset_time_series_follows_range_fetches() {
    let (_, app) = app();
    let (status, body) = call(&app, "GET", "/api/tasks/topic-offset-range-fetcher/orders", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({}));

    let (status, _) = call(
        &app,
        "POST",
        "/api/tasks/topic-offset-range-fetcher",
        Some(json!({"topicName": "orders"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = call(&app, "GET", "/api/tasks/topic-offset-range-fetcher/orders", None).await;
    assert_eq!(body.as_object().unwrap().len(), 7);
    assert!(body.get("orders-6").is_some());
}

#[tokio::test]
async fn consumer_group_offsets_cover_consumed_topics() {
    let (_, app) = app();
    let (status, body) = call(
        &app,
        "POST",
        "/api/tasks/consumer-group-topic-offset-fetcher",
        Some(json!({"groupName": "billing"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["value"]["orders-6"], json!({"smallest": 100, "largest": 200}));
}

#[tokio::test]
async fn resetting_a_zookeeper_group_is_422() {
    let (_, app) = app();
    let (status, body) = call(
        &app,
        "POST",
        "/api/tasks/consumer-group-offset-resetter",
        Some(json!({"groupName": "legacy", "offsets": {"orders-0": 0}})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["message"].as_str().unwrap().contains("ZK"));
}

#[tokio::test]
async fn purge_returns_watermarks() {
    let (cluster, app) = app();
    let (status, body) = call(&app, "POST", "/api/tasks/topic-purger", Some(json!({"topicName": "orders"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["value"]["orders-6"], 200);
    assert_eq!(cluster.calls("delete_all_records"), 1);
}

#[tokio::test]
async fn record_fetch_with_zero_limit_is_422() {
    let (_, app) = app();
    let (status, _) = call(
        &app,
        "POST",
        "/api/tasks/topic-record-fetcher",
        Some(json!({
            "topicName": "orders",
            "fetchRequest": {
                "position": {"type": "offsets", "positions": {"6": 100}},
                "limit": 0,
                "timeoutMs": 1000
            }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn transport_failure_is_502() {
    let (cluster, app) = app();
    cluster.fail_with(Some(ManagerError::transport("broker unreachable")));
    let (status, body) = call(
        &app,
        "POST",
        "/api/tasks/topic-record-counter",
        Some(json!({"topicName": "orders"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["message"].as_str().unwrap().contains("broker unreachable"));
}

#[tokio::test]
async fn slow_result_times_out_with_503() {
    let (cluster, app) = app_with_timeout(50);
    cluster.pause();
    let (status, body) = call(
        &app,
        "POST",
        "/api/tasks/topic-record-counter",
        Some(json!({"topicName": "orders"})),
    )
    .await;
    cluster.resume();
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["message"], "Result not ready within 50 ms");
}

#[tokio::test]
async fn timed_out_purge_still_restores_cleanup_policy() {
    let (cluster, app) = app_with_timeout(50);
    cluster.set_topic_config("orders", CLEANUP_POLICY_CONFIG, "compact");
    cluster.pause_operation("delete_all_records");

    let (status, _) = call(&app, "POST", "/api/tasks/topic-purger", Some(json!({"topicName": "orders"}))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(cluster.topic_config("orders").unwrap()[CLEANUP_POLICY_CONFIG], "delete");

    cluster.resume();
    for _ in 0..100 {
        if cluster.config_changes().len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(cluster.calls("delete_all_records"), 1);
    assert_eq!(cluster.topic_config("orders").unwrap()[CLEANUP_POLICY_CONFIG], "compact");
}
