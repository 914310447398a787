pub mod stats;
pub mod storage;
pub mod throttling;

pub use stats::{InMemoryStats, StatsService, TenantStats};
pub use storage::{InMemoryMetricStore, MetricStore, StorageError};
pub use throttling::{ThrottlingService, TokenBucketThrottler};
