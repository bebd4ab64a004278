//! Key-value repositories over cluster metadata and a merged view of two
//! disjoint repositories.

pub mod consumer_group;
pub mod merged;
pub mod traits;

pub use consumer_group::ClusterConsumerGroupRepo;
pub use merged::MergedRepo;
pub use traits::{CachedRepo, EntityRepo, KeyValueRepo};
