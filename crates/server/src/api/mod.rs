//! HTTP endpoints.

mod health;
pub mod tasks;

pub use health::{health, HealthResponse};
