//! Task execution and result caching.
//!
//! Every cluster-facing operation runs through one of two executors:
//! [`StatefulExecutor`] computes in the background, coalesces concurrent
//! requests for the same key and caches the latest result, while
//! [`OnDemandExecutor`] runs on the caller's task. Both report outcomes as
//! [`TaskResult`]s.

pub mod bundle;
pub mod cache;
pub mod error;
pub mod executor;
pub mod on_demand;
pub mod ops;
pub mod result;
pub mod stateful;

pub use bundle::{ExecutorRef, Executors, PartitionOffsets, StatefulExecutorRef};
pub use cache::{Cache, CacheManager, LruTtlCache};
pub use error::{TaskError, TaskErrorKind};
pub use executor::{AsyncStatefulTaskExecutor, StatefulTask, Task, TaskExecutor, TaskHandle};
pub use on_demand::OnDemandExecutor;
pub use ops::{OffsetTimeSeriesSource, TopicOffsetTimeSeries};
pub use result::{TaskResult, TaskResultBuilder};
pub use stateful::StatefulExecutor;
