pub mod limiter;
pub mod ordered_queue;
pub mod worker_pool;

pub use limiter::{ConcurrencyLimiter, DEFAULT_MAX_WORKERS, Permit};
pub use ordered_queue::{BoundedOrderedQueue, DEFAULT_QUEUE_CAPACITY};
pub use worker_pool::{PoolRuntimeSnapshot, WorkerPool, WorkerPoolHandle, WorkerRuntimeSnapshot};
