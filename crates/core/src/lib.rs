pub mod api;
pub mod cluster;
pub mod config;
pub mod error;
pub mod timeseries;
pub mod types;

pub use cluster::{ClusterAdmin, InMemoryCluster};
pub use config::Config;
pub use error::*;
pub use timeseries::OffsetTimeSeries;
pub use types::*;
