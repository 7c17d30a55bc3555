use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};

use crate::VzipError;
use crate::core::limiter::ConcurrencyLimiter;
use crate::telemetry::tags;
use crate::telemetry::worker::{DefaultWorkerTelemetry, WorkerTelemetry};
use crate::types::{FrameTask, Result, TaskOutput, duration_to_us};

/// Task slots per worker in the submission channel.
const TASK_SLOTS_PER_WORKER: usize = 4;

/// Offset value of a worker that has not started or stopped yet.
const NOT_YET: u64 = u64::MAX;

type TaskFn = dyn Fn(usize, FrameTask) -> Result<TaskOutput> + Send + Sync;

/// Fixed-size worker pool whose threads share one [`ConcurrencyLimiter`].
///
/// Each task holds one permit for its whole body, so producers and consumers
/// together never exceed the limiter's permit count. The pool starts exactly
/// as many threads as there are permits; tasks are handed out in submission
/// order through a bounded channel.
pub struct WorkerPool {
    num_workers: usize,
    limiter: Arc<ConcurrencyLimiter>,
    telemetry: Arc<dyn WorkerTelemetry>,
}

impl WorkerPool {
    /// Creates a pool of `num_workers` threads using the default telemetry.
    pub fn new(num_workers: usize) -> Self {
        Self::with_telemetry(num_workers, Arc::new(DefaultWorkerTelemetry))
    }

    pub fn with_telemetry(num_workers: usize, telemetry: Arc<dyn WorkerTelemetry>) -> Self {
        let num_workers = num_workers.max(1);
        Self {
            num_workers,
            limiter: Arc::new(ConcurrencyLimiter::new(num_workers)),
            telemetry,
        }
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Limiter shared by every task of this pool.
    pub fn limiter(&self) -> &Arc<ConcurrencyLimiter> {
        &self.limiter
    }

    /// Starts the worker threads and returns a handle for submission and collection.
    ///
    /// `run_task` receives the worker id and the task.
    ///
    /// # Errors
    /// Returns [`VzipError::WorkerSpawn`] if a thread cannot be started. Threads
    /// already running are shut down and joined before returning.
    pub fn spawn<F>(&self, run_task: F) -> Result<WorkerPoolHandle>
    where
        F: Fn(usize, FrameTask) -> Result<TaskOutput> + Send + Sync + 'static,
    {
        let (task_tx, task_rx) = bounded(self.num_workers * TASK_SLOTS_PER_WORKER);
        let (results_tx, results_rx) = unbounded();
        let shared = Arc::new(PoolShared {
            limiter: Arc::clone(&self.limiter),
            telemetry: Arc::clone(&self.telemetry),
            run_task: Box::new(run_task),
            started_at: Instant::now(),
            submitted: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            slots: (0..self.num_workers).map(|_| WorkerSlot::default()).collect(),
        });

        let mut handle = WorkerPoolHandle {
            shared: Arc::clone(&shared),
            task_tx: Some(task_tx),
            results_rx,
            threads: Vec::with_capacity(self.num_workers),
        };

        for worker_id in 0..self.num_workers {
            let worker = Worker {
                id: worker_id,
                shared: Arc::clone(&shared),
                tasks: task_rx.clone(),
                results: results_tx.clone(),
            };
            let spawned = thread::Builder::new()
                .name(format!("vzip-worker-{worker_id}"))
                .spawn(move || worker.run());

            match spawned {
                Ok(thread) => handle.threads.push(thread),
                Err(error) => {
                    tracing::error!(
                        target: tags::TARGET_WORKER,
                        worker_id,
                        %error,
                        "failed to spawn worker thread"
                    );
                    handle.close();
                    let _ = handle.join_threads();
                    return Err(VzipError::WorkerSpawn(error));
                }
            }
        }

        tracing::debug!(
            target: tags::TARGET_WORKER,
            workers = self.num_workers,
            "worker pool started"
        );
        Ok(handle)
    }
}

/// State shared by the handle and every worker thread.
struct PoolShared {
    limiter: Arc<ConcurrencyLimiter>,
    telemetry: Arc<dyn WorkerTelemetry>,
    run_task: Box<TaskFn>,
    started_at: Instant,
    submitted: AtomicUsize,
    completed: AtomicUsize,
    slots: Vec<WorkerSlot>,
}

impl PoolShared {
    fn offset_us(&self) -> u64 {
        duration_to_us(self.started_at.elapsed())
    }
}

/// Per-worker counters, written only by the owning thread.
struct WorkerSlot {
    tasks: AtomicUsize,
    busy_us: AtomicU64,
    started_us: AtomicU64,
    stopped_us: AtomicU64,
}

impl Default for WorkerSlot {
    fn default() -> Self {
        Self {
            tasks: AtomicUsize::new(0),
            busy_us: AtomicU64::new(0),
            started_us: AtomicU64::new(NOT_YET),
            stopped_us: AtomicU64::new(NOT_YET),
        }
    }
}

impl WorkerSlot {
    fn snapshot(&self, worker_id: usize, now_us: u64) -> WorkerRuntimeSnapshot {
        let started = self.started_us.load(Ordering::Acquire);
        let stopped = self.stopped_us.load(Ordering::Acquire);
        let uptime_us = match (started, stopped) {
            (NOT_YET, _) => 0,
            (started, NOT_YET) => now_us.saturating_sub(started),
            (started, stopped) => stopped.saturating_sub(started),
        };
        let busy_us = self.busy_us.load(Ordering::Acquire).min(uptime_us);

        WorkerRuntimeSnapshot {
            worker_id,
            tasks_completed: self.tasks.load(Ordering::Acquire),
            uptime: Duration::from_micros(uptime_us),
            busy: Duration::from_micros(busy_us),
            idle: Duration::from_micros(uptime_us - busy_us),
            utilization: if uptime_us == 0 {
                0.0
            } else {
                busy_us as f64 / uptime_us as f64
            },
        }
    }
}

/// Per-worker runtime metrics captured by the worker pool.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerRuntimeSnapshot {
    pub worker_id: usize,
    pub tasks_completed: usize,
    pub uptime: Duration,
    pub busy: Duration,
    pub idle: Duration,
    /// Busy share of uptime, `0.0..=1.0`.
    pub utilization: f64,
}

/// Runtime metrics snapshot for the worker pool.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolRuntimeSnapshot {
    pub elapsed: Duration,
    pub submitted: usize,
    pub completed: usize,
    pub pending: usize,
    /// Tasks holding a permit when the snapshot was taken.
    pub active: usize,
    pub peak_active: usize,
    pub workers: Vec<WorkerRuntimeSnapshot>,
}

/// Runtime handle for a spawned worker pool.
pub struct WorkerPoolHandle {
    shared: Arc<PoolShared>,
    task_tx: Option<Sender<FrameTask>>,
    results_rx: Receiver<Result<TaskOutput>>,
    threads: Vec<JoinHandle<()>>,
}

impl WorkerPoolHandle {
    /// Submits a task, blocking while the submission channel is full.
    ///
    /// # Errors
    /// Returns [`VzipError::InvalidInput`] after [`close`](Self::close) or
    /// when every worker thread has already exited.
    pub fn submit(&self, task: FrameTask) -> Result<()> {
        let Some(sender) = &self.task_tx else {
            return Err(VzipError::InvalidInput(
                "worker pool is closed; no new work accepted",
            ));
        };

        self.shared.submitted.fetch_add(1, Ordering::AcqRel);
        if sender.send(task).is_err() {
            self.shared.submitted.fetch_sub(1, Ordering::AcqRel);
            return Err(VzipError::InvalidInput("all worker threads have exited"));
        }
        Ok(())
    }

    /// Stops accepting tasks; workers exit once the submitted ones are drained.
    pub fn close(&mut self) {
        self.task_tx = None;
    }

    pub fn submitted_count(&self) -> usize {
        self.shared.submitted.load(Ordering::Acquire)
    }

    pub fn completed_count(&self) -> usize {
        self.shared.completed.load(Ordering::Acquire)
    }

    pub fn pending_count(&self) -> usize {
        self.submitted_count().saturating_sub(self.completed_count())
    }

    /// Highest number of tasks that held a permit at the same time.
    pub fn peak_active(&self) -> usize {
        self.shared.limiter.peak_in_use()
    }

    pub fn runtime_snapshot(&self) -> PoolRuntimeSnapshot {
        let elapsed = self.shared.started_at.elapsed();
        let now_us = duration_to_us(elapsed);
        let submitted = self.submitted_count();
        let completed = self.completed_count();

        PoolRuntimeSnapshot {
            elapsed,
            submitted,
            completed,
            pending: submitted.saturating_sub(completed),
            active: self.shared.limiter.in_use(),
            peak_active: self.peak_active(),
            workers: self
                .shared
                .slots
                .iter()
                .enumerate()
                .map(|(worker_id, slot)| slot.snapshot(worker_id, now_us))
                .collect(),
        }
    }

    /// Receives one task result, blocking until one is available.
    ///
    /// Returns `None` once every worker has exited and all results are drained.
    pub fn recv(&self) -> Option<Result<TaskOutput>> {
        self.results_rx.recv().ok()
    }

    /// Receives one task result, waiting up to `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Result<TaskOutput>> {
        self.results_rx.recv_timeout(timeout).ok()
    }

    /// True once every worker has exited and no result is left to receive.
    pub fn is_drained(&self) -> bool {
        // Workers first: a finished worker has no send left in flight.
        self.threads.iter().all(JoinHandle::is_finished) && self.results_rx.is_empty()
    }

    /// Closes the pool, collects every remaining result, and joins the workers.
    ///
    /// Results are returned in completion order. The first task error, or a
    /// worker thread panic, fails the whole call.
    pub fn finish(mut self) -> Result<Vec<TaskOutput>> {
        self.close();
        let mut outputs = Vec::with_capacity(self.pending_count());
        let mut first_error = None;

        for result in self.results_rx.iter() {
            match result {
                Ok(output) => outputs.push(output),
                Err(error) => {
                    first_error.get_or_insert(error);
                }
            }
        }
        if let Err(error) = self.join_threads() {
            first_error.get_or_insert(error);
        }

        first_error.map_or(Ok(outputs), Err)
    }

    /// Closes the pool and joins workers without collecting results.
    pub fn join(mut self) -> Result<()> {
        self.close();
        self.join_threads()
    }

    fn join_threads(&mut self) -> Result<()> {
        // Every thread is joined before the first panic is reported.
        let panics: Vec<String> = self
            .threads
            .drain(..)
            .filter_map(|thread| thread.join().err())
            .map(|payload| panic_message(payload.as_ref()))
            .collect();

        match panics.into_iter().next() {
            Some(message) => Err(VzipError::WorkerPanicked(message)),
            None => Ok(()),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_owned())
}

/// One worker thread's view of the pool.
struct Worker {
    id: usize,
    shared: Arc<PoolShared>,
    tasks: Receiver<FrameTask>,
    results: Sender<Result<TaskOutput>>,
}

impl Worker {
    fn run(self) {
        let slot = &self.shared.slots[self.id];
        slot.started_us.store(self.shared.offset_us(), Ordering::Release);

        for task in self.tasks.iter() {
            let result = self.run_task(slot, task);
            self.shared.completed.fetch_add(1, Ordering::AcqRel);
            if self.results.send(result).is_err() {
                break;
            }
        }

        slot.stopped_us.store(self.shared.offset_us(), Ordering::Release);
    }

    fn run_task(&self, slot: &WorkerSlot, task: FrameTask) -> Result<TaskOutput> {
        let shared = &self.shared;
        let kind = task.kind();

        let wait_started = Instant::now();
        let permit = shared.limiter.acquire();
        shared
            .telemetry
            .on_permit_acquired(self.id, wait_started.elapsed());
        shared.telemetry.on_task_started(self.id, kind);

        let started_at = Instant::now();
        let result = catch_unwind(AssertUnwindSafe(|| (shared.run_task)(self.id, task)))
            .unwrap_or_else(|payload| {
                Err(VzipError::WorkerPanicked(format!(
                    "{kind} task: {}",
                    panic_message(payload.as_ref())
                )))
            });
        drop(permit);
        let elapsed = started_at.elapsed();

        slot.busy_us
            .fetch_add(duration_to_us(elapsed), Ordering::AcqRel);
        slot.tasks.fetch_add(1, Ordering::AcqRel);
        match &result {
            Ok(_) => shared.telemetry.on_task_finished(self.id, kind, elapsed),
            Err(_) => shared.telemetry.on_task_failed(self.id, kind, elapsed),
        }
        result
    }
}
