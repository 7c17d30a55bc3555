/// Tracing target for orchestration events.
pub const TARGET_PIPELINE: &str = "vzip.pipeline";
/// Tracing target for worker runtime events.
pub const TARGET_WORKER: &str = "vzip.worker";
/// Tracing target for frame queue events.
pub const TARGET_QUEUE: &str = "vzip.queue";
/// Tracing target for compression events.
pub const TARGET_COMPRESSION: &str = "vzip.compression";
/// Tracing target for archive format events.
pub const TARGET_FORMAT: &str = "vzip.format";

pub const METRIC_PRODUCER_FRAME_COUNT: &str = "vzip.producer.frame.count";
pub const METRIC_PRODUCER_BYTES: &str = "vzip.producer.bytes";
pub const METRIC_PRODUCER_TRUNCATED_COUNT: &str = "vzip.producer.truncated.count";

pub const METRIC_QUEUE_DEPTH: &str = "vzip.queue.depth";
pub const METRIC_QUEUE_PUSH_BLOCKED_COUNT: &str = "vzip.queue.push.blocked.count";
pub const METRIC_QUEUE_POP_BLOCKED_COUNT: &str = "vzip.queue.pop.blocked.count";

pub const METRIC_LIMITER_IN_USE: &str = "vzip.limiter.in_use";
pub const METRIC_LIMITER_WAIT_LATENCY_US: &str = "vzip.limiter.wait.latency_us";

pub const METRIC_COMPRESSION_APPLY_COUNT: &str = "vzip.compression.apply.count";
pub const METRIC_COMPRESSION_APPLY_LATENCY_US: &str = "vzip.compression.apply.latency_us";
pub const METRIC_COMPRESSION_INPUT_BYTES: &str = "vzip.compression.input_bytes";
pub const METRIC_COMPRESSION_OUTPUT_BYTES: &str = "vzip.compression.output_bytes";
pub const METRIC_COMPRESSION_OVERFLOW_COUNT: &str = "vzip.compression.overflow.count";

pub const METRIC_WORKER_TASK_COUNT: &str = "vzip.worker.task.count";
pub const METRIC_WORKER_TASK_FAIL_COUNT: &str = "vzip.worker.task.fail.count";
pub const METRIC_WORKER_TASK_LATENCY_US: &str = "vzip.worker.task.latency_us";

pub const METRIC_ARCHIVE_RECORD_COUNT: &str = "vzip.archive.record.count";
pub const METRIC_ARCHIVE_RUN_COUNT: &str = "vzip.archive.run.count";
