use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::telemetry::{self, tags};

/// Default number of permits shared by all producer and consumer tasks.
pub const DEFAULT_MAX_WORKERS: usize = 19;

/// Counting permit pool capping how many workers run at once.
///
/// Producers and consumers draw from the same pool. A [`Permit`] is returned
/// to the pool when dropped, so every exit path of a task releases exactly
/// once, including early returns and unwinding panics.
#[derive(Debug)]
pub struct ConcurrencyLimiter {
    permits: usize,
    state: Mutex<LimiterState>,
    released: Condvar,
}

#[derive(Debug, Default)]
struct LimiterState {
    in_use: usize,
    peak: usize,
}

impl ConcurrencyLimiter {
    /// Creates a limiter with `permits` slots (at least one).
    pub fn new(permits: usize) -> Self {
        Self {
            permits: permits.max(1),
            state: Mutex::new(LimiterState::default()),
            released: Condvar::new(),
        }
    }

    /// Total number of permits.
    pub fn permits(&self) -> usize {
        self.permits
    }

    /// Permits currently held.
    pub fn in_use(&self) -> usize {
        self.lock().in_use
    }

    /// Highest number of permits ever held at the same time.
    pub fn peak_in_use(&self) -> usize {
        self.lock().peak
    }

    /// Blocks until a permit is free, then takes it.
    pub fn acquire(&self) -> Permit<'_> {
        let mut state = self.lock();
        while state.in_use >= self.permits {
            state = self
                .released
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        self.take(&mut state);
        Permit { limiter: self }
    }

    /// Takes a permit only if one is immediately available.
    pub fn try_acquire(&self) -> Option<Permit<'_>> {
        let mut state = self.lock();
        if state.in_use >= self.permits {
            return None;
        }
        self.take(&mut state);
        Some(Permit { limiter: self })
    }

    fn take(&self, state: &mut LimiterState) {
        state.in_use += 1;
        state.peak = state.peak.max(state.in_use);
        telemetry::set_gauge(tags::METRIC_LIMITER_IN_USE, state.in_use as u64);
    }

    fn release(&self) {
        let mut state = self.lock();
        state.in_use = state.in_use.saturating_sub(1);
        telemetry::set_gauge(tags::METRIC_LIMITER_IN_USE, state.in_use as u64);
        drop(state);
        self.released.notify_one();
    }

    fn lock(&self) -> MutexGuard<'_, LimiterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ConcurrencyLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_WORKERS)
    }
}

/// One held slot of a [`ConcurrencyLimiter`].
#[must_use = "dropping a permit releases it immediately"]
#[derive(Debug)]
pub struct Permit<'a> {
    limiter: &'a ConcurrencyLimiter,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.limiter.release();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn permits_are_released_on_drop() {
        let limiter = ConcurrencyLimiter::new(2);
        let first = limiter.acquire();
        let second = limiter.acquire();
        assert_eq!(limiter.in_use(), 2);
        assert!(limiter.try_acquire().is_none());

        drop(first);
        assert_eq!(limiter.in_use(), 1);
        let third = limiter.try_acquire();
        assert!(third.is_some());

        drop(second);
        drop(third);
        assert_eq!(limiter.in_use(), 0);
        assert_eq!(limiter.peak_in_use(), 2);
    }

    #[test]
    fn zero_permits_is_clamped_to_one() {
        let limiter = ConcurrencyLimiter::new(0);
        assert_eq!(limiter.permits(), 1);
        let _permit = limiter.acquire();
        assert!(limiter.try_acquire().is_none());
    }

    #[test]
    fn concurrent_holders_never_exceed_permits() {
        let limiter = Arc::new(ConcurrencyLimiter::new(4));
        let active = Arc::new(AtomicUsize::new(0));
        let observed_max = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..48)
            .map(|i| {
                let limiter = Arc::clone(&limiter);
                let active = Arc::clone(&active);
                let observed_max = Arc::clone(&observed_max);
                thread::spawn(move || {
                    let _permit = limiter.acquire();
                    let now = active.fetch_add(1, Ordering::AcqRel) + 1;
                    observed_max.fetch_max(now, Ordering::AcqRel);
                    thread::sleep(Duration::from_micros(200 + (i % 5) * 100));
                    active.fetch_sub(1, Ordering::AcqRel);
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("limiter thread panicked");
        }

        assert!(observed_max.load(Ordering::Acquire) <= 4);
        assert!(limiter.peak_in_use() <= 4);
        assert_eq!(limiter.in_use(), 0);
    }

    #[test]
    fn permit_is_released_when_holder_panics() {
        let limiter = Arc::new(ConcurrencyLimiter::new(1));
        let worker = {
            let limiter = Arc::clone(&limiter);
            thread::spawn(move || {
                let _permit = limiter.acquire();
                panic!("task failed while holding a permit");
            })
        };
        assert!(worker.join().is_err());
        assert_eq!(limiter.in_use(), 0);
        assert!(limiter.try_acquire().is_some());
    }
}
