use std::fmt;
use std::time::Duration;

use crate::telemetry::{self, tags};
use crate::types::duration_to_us;

/// Role a pool task plays in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Reads one frame from disk and queues it.
    Produce,
    /// Pops one frame from the queue and compresses it.
    Consume,
}

impl TaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Produce => "produce",
            Self::Consume => "consume",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Telemetry contract for worker runtimes.
///
/// Worker implementations call these hooks to emit stable metrics and
/// tracing events without depending on a specific backend.
pub trait WorkerTelemetry: Send + Sync {
    fn on_permit_acquired(&self, worker_id: usize, waited: Duration);
    fn on_task_started(&self, worker_id: usize, kind: TaskKind);
    fn on_task_finished(&self, worker_id: usize, kind: TaskKind, elapsed: Duration);
    fn on_task_failed(&self, worker_id: usize, kind: TaskKind, elapsed: Duration);
}

/// Default telemetry implementation that reports worker metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultWorkerTelemetry;

impl WorkerTelemetry for DefaultWorkerTelemetry {
    fn on_permit_acquired(&self, worker_id: usize, waited: Duration) {
        let waited_us = duration_to_us(waited);
        telemetry::record_histogram(tags::METRIC_LIMITER_WAIT_LATENCY_US, waited_us);
        tracing::trace!(
            target: tags::TARGET_WORKER,
            worker_id,
            waited_us,
            "permit acquired"
        );
    }

    fn on_task_started(&self, worker_id: usize, kind: TaskKind) {
        tracing::trace!(
            target: tags::TARGET_WORKER,
            worker_id,
            task = kind.as_str(),
            "task started"
        );
    }

    fn on_task_finished(&self, worker_id: usize, kind: TaskKind, elapsed: Duration) {
        let elapsed_us = duration_to_us(elapsed);
        telemetry::increment_counter(tags::METRIC_WORKER_TASK_COUNT, 1);
        telemetry::record_histogram(tags::METRIC_WORKER_TASK_LATENCY_US, elapsed_us);
        tracing::debug!(
            target: tags::TARGET_WORKER,
            worker_id,
            task = kind.as_str(),
            elapsed_us,
            "task finished"
        );
    }

    fn on_task_failed(&self, worker_id: usize, kind: TaskKind, elapsed: Duration) {
        let elapsed_us = duration_to_us(elapsed);
        telemetry::increment_counter(tags::METRIC_WORKER_TASK_COUNT, 1);
        telemetry::increment_counter(tags::METRIC_WORKER_TASK_FAIL_COUNT, 1);
        telemetry::record_histogram(tags::METRIC_WORKER_TASK_LATENCY_US, elapsed_us);
        tracing::warn!(
            target: tags::TARGET_WORKER,
            worker_id,
            task = kind.as_str(),
            elapsed_us,
            "task failed"
        );
    }
}
