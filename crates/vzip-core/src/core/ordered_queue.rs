use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::VzipError;
use crate::telemetry::{self, tags};
use crate::types::{RawFrame, Result};

/// Default number of raw frames that may wait for a consumer.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Bounded, index-ordered hand-off between producers and consumers.
///
/// Pending frames are kept sorted by ascending index, so [`pop`](Self::pop)
/// always yields the lowest pending index. That only biases which frame is
/// compressed next; the archive order is restored by the pipeline after all
/// work completes.
#[derive(Debug)]
pub struct BoundedOrderedQueue {
    capacity: usize,
    state: Mutex<QueueState>,
    not_full: Condvar,
    not_empty: Condvar,
}

#[derive(Debug, Default)]
struct QueueState {
    frames: VecDeque<RawFrame>,
    aborted: bool,
    peak_len: usize,
}

impl BoundedOrderedQueue {
    /// Creates a queue holding at most `capacity` frames (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            state: Mutex::new(QueueState {
                frames: VecDeque::with_capacity(capacity),
                ..QueueState::default()
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of frames currently queued.
    pub fn len(&self) -> usize {
        self.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Highest queue depth observed since creation.
    pub fn peak_len(&self) -> usize {
        self.lock().peak_len
    }

    pub fn is_aborted(&self) -> bool {
        self.lock().aborted
    }

    /// Inserts `frame` in index order, blocking while the queue is full.
    ///
    /// # Errors
    /// Returns [`VzipError::QueueAborted`] once the queue has been aborted and
    /// [`VzipError::DuplicateFrame`] if a frame with the same index is already
    /// pending. A rejected frame is dropped; queued frames are untouched.
    pub fn push(&self, frame: RawFrame) -> Result<()> {
        let mut state = self.lock();
        if state.frames.len() >= self.capacity && !state.aborted {
            telemetry::increment_counter(tags::METRIC_QUEUE_PUSH_BLOCKED_COUNT, 1);
            tracing::trace!(target: tags::TARGET_QUEUE, index = frame.index, "push waiting for space");
        }
        while state.frames.len() >= self.capacity && !state.aborted {
            state = self
                .not_full
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        if state.aborted {
            return Err(VzipError::QueueAborted);
        }

        let position = state
            .frames
            .partition_point(|queued| queued.index <= frame.index);
        if position > 0 && state.frames[position - 1].index == frame.index {
            return Err(VzipError::DuplicateFrame { index: frame.index });
        }
        state.frames.insert(position, frame);

        let depth = state.frames.len();
        state.peak_len = state.peak_len.max(depth);
        telemetry::set_gauge(tags::METRIC_QUEUE_DEPTH, depth as u64);
        drop(state);

        self.not_empty.notify_one();
        Ok(())
    }

    /// Removes the lowest-index frame, blocking while the queue is empty.
    ///
    /// # Errors
    /// Returns [`VzipError::QueueAborted`] once the queue has been aborted.
    pub fn pop(&self) -> Result<RawFrame> {
        let mut state = self.lock();
        if state.frames.is_empty() && !state.aborted {
            telemetry::increment_counter(tags::METRIC_QUEUE_POP_BLOCKED_COUNT, 1);
        }
        while state.frames.is_empty() && !state.aborted {
            state = self
                .not_empty
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        if state.aborted {
            return Err(VzipError::QueueAborted);
        }

        let frame = state.frames.pop_front().ok_or(VzipError::QueueAborted)?;
        telemetry::set_gauge(tags::METRIC_QUEUE_DEPTH, state.frames.len() as u64);
        drop(state);

        self.not_full.notify_one();
        Ok(frame)
    }

    /// Aborts the queue, waking every blocked producer and consumer.
    ///
    /// Pending frames are dropped. Every later `push` and `pop` fails with
    /// [`VzipError::QueueAborted`].
    pub fn abort(&self) {
        let mut state = self.lock();
        if state.aborted {
            return;
        }
        state.aborted = true;
        let dropped = state.frames.len();
        state.frames.clear();
        drop(state);

        tracing::debug!(target: tags::TARGET_QUEUE, dropped, "frame queue aborted");
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for BoundedOrderedQueue {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::*;

    fn frame(index: usize) -> RawFrame {
        RawFrame::new(index, vec![index as u8; 4])
    }

    #[test]
    fn pop_returns_lowest_pending_index() -> Result<()> {
        let queue = BoundedOrderedQueue::with_capacity(8);
        for index in [5, 1, 7, 3, 0] {
            queue.push(frame(index))?;
        }

        let order: Vec<usize> = (0..5)
            .map(|_| queue.pop().map(|frame| frame.index))
            .collect::<Result<_>>()?;
        assert_eq!(order, vec![0, 1, 3, 5, 7]);
        assert!(queue.is_empty());
        Ok(())
    }

    #[test]
    fn duplicate_index_is_rejected_without_touching_queued_frame() -> Result<()> {
        let queue = BoundedOrderedQueue::with_capacity(4);
        queue.push(RawFrame::new(2, vec![1, 2, 3]))?;

        let err = queue.push(RawFrame::new(2, vec![9, 9])).unwrap_err();
        assert!(matches!(err, VzipError::DuplicateFrame { index: 2 }));

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop()?, RawFrame::new(2, vec![1, 2, 3]));
        Ok(())
    }

    #[test]
    fn push_blocks_at_capacity_until_pop() -> Result<()> {
        let queue = Arc::new(BoundedOrderedQueue::with_capacity(2));
        queue.push(frame(0))?;
        queue.push(frame(1))?;

        let pusher = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.push(frame(2)))
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!pusher.is_finished());
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.pop()?.index, 0);
        pusher.join().expect("pusher panicked")?;
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.peak_len(), 2);
        Ok(())
    }

    #[test]
    fn pop_blocks_until_push() -> Result<()> {
        let queue = Arc::new(BoundedOrderedQueue::with_capacity(2));
        let popper = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop())
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!popper.is_finished());

        queue.push(frame(9))?;
        let popped = popper.join().expect("popper panicked")?;
        assert_eq!(popped.index, 9);
        Ok(())
    }

    #[test]
    fn abort_wakes_blocked_waiters() {
        let queue = Arc::new(BoundedOrderedQueue::with_capacity(1));
        let poppers: Vec<_> = (0..3)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || queue.pop())
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        queue.abort();

        for popper in poppers {
            let result = popper.join().expect("popper panicked");
            assert!(matches!(result, Err(VzipError::QueueAborted)));
        }
        assert!(matches!(
            queue.push(frame(0)),
            Err(VzipError::QueueAborted)
        ));
    }

    #[test]
    fn capacity_is_clamped_to_one() {
        assert_eq!(BoundedOrderedQueue::with_capacity(0).capacity(), 1);
    }
}
