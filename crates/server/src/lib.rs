//! Task REST surface: the operations of an [`Executors`](kman_exec::Executors)
//! bundle exposed over HTTP for remote delegates.

pub mod api;
pub mod error;
pub mod router;
pub mod state;

use std::sync::Arc;

use kman_core::config::ServerConfig;
use tracing::info;

pub use error::ApiError;
pub use router::build_router;
pub use state::AppState;

/// Bind `config.host:config.port` and serve until the listener fails.
pub async fn serve(state: Arc<AppState>, config: &ServerConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Task API listening");
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}
