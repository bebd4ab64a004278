//! HTTP router construction.

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use kman_core::api;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use crate::api::{health, tasks};
use crate::state::AppState;

/// Build the application router with every route and the CORS layer.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.cors_origin);
    Router::new()
        .route("/health", get(health))
        .route(api::TOPIC_RECORD_COUNTER_PATH, post(tasks::topic_record_counter))
        .route(api::TOPIC_OFFSET_RANGE_FETCHER_PATH, post(tasks::topic_offset_range_fetcher))
        .route(
            &format!("{}/{{topic}}", api::TOPIC_OFFSET_RANGE_FETCHER_PATH),
            get(tasks::topic_offset_time_series),
        )
        .route(api::TOPIC_OFFSET_FOR_TIME_FETCHER_PATH, post(tasks::topic_offset_for_time_fetcher))
        .route(api::TOPIC_RECORD_FETCHER_PATH, post(tasks::topic_record_fetcher))
        .route(api::TOPIC_PURGER_PATH, post(tasks::topic_purger))
        .route(
            api::CONSUMER_GROUP_OFFSET_RESETTER_PATH,
            post(tasks::consumer_group_offset_resetter),
        )
        .route(
            api::CONSUMER_GROUP_TOPIC_OFFSET_FETCHER_PATH,
            post(tasks::consumer_group_topic_offset_fetcher),
        )
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origin: &str) -> CorsLayer {
    if origin == "*" {
        return CorsLayer::permissive();
    }
    match HeaderValue::from_str(origin) {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(Any)
            .allow_headers(Any),
        Err(_) => {
            warn!(origin, "Invalid CORS origin, cross-origin requests disabled");
            CorsLayer::new()
        }
    }
}
