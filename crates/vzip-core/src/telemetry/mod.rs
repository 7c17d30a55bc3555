use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub mod tags;
pub mod worker;

pub use worker::{DefaultWorkerTelemetry, TaskKind, WorkerTelemetry};

/// Aggregated samples of one histogram metric.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub total: u64,
    pub min: u64,
    pub max: u64,
    pub mean: f64,
}

impl HistogramSnapshot {
    fn observe(&mut self, value: u64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        }
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.count = self.count.saturating_add(1);
        self.total = self.total.saturating_add(value);
        self.mean = self.total as f64 / self.count as f64;
    }
}

/// Gauge value together with the highest value it has held since the last reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GaugeSnapshot {
    pub current: u64,
    pub peak: u64,
}

/// Point-in-time copy of the process-wide metric registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub counters: BTreeMap<String, u64>,
    pub gauges: BTreeMap<String, GaugeSnapshot>,
    pub histograms: BTreeMap<String, HistogramSnapshot>,
}

impl TelemetrySnapshot {
    pub fn counter(&self, name: &str) -> Option<u64> {
        self.counters.get(name).copied()
    }

    /// Last value written to a gauge.
    pub fn gauge(&self, name: &str) -> Option<u64> {
        self.gauges.get(name).map(|gauge| gauge.current)
    }

    /// Highest value a gauge reached, e.g. the deepest the frame queue got.
    pub fn gauge_peak(&self, name: &str) -> Option<u64> {
        self.gauges.get(name).map(|gauge| gauge.peak)
    }

    pub fn histogram(&self, name: &str) -> Option<HistogramSnapshot> {
        self.histograms.get(name).copied()
    }
}

/// Adds `value` to a named counter.
#[inline]
pub fn increment_counter(name: &'static str, value: u64) {
    #[cfg(feature = "telemetry")]
    registry::with(|metrics| {
        let counter = metrics.counters.entry(name).or_default();
        *counter = counter.saturating_add(value);
    });

    let _ = (name, value);
}

/// Adds one sample to a named histogram.
#[inline]
pub fn record_histogram(name: &'static str, value: u64) {
    #[cfg(feature = "telemetry")]
    registry::with(|metrics| metrics.histograms.entry(name).or_default().observe(value));

    let _ = (name, value);
}

/// Overwrites a gauge, keeping track of its peak.
#[inline]
pub fn set_gauge(name: &'static str, value: u64) {
    #[cfg(feature = "telemetry")]
    registry::with(|metrics| {
        let gauge = metrics.gauges.entry(name).or_default();
        gauge.current = value;
        gauge.peak = gauge.peak.max(value);
    });

    let _ = (name, value);
}

/// Copies every metric collected so far. Empty without the `telemetry` feature.
pub fn snapshot() -> TelemetrySnapshot {
    #[cfg(feature = "telemetry")]
    {
        registry::with(|metrics| TelemetrySnapshot {
            counters: owned_keys(&metrics.counters),
            gauges: owned_keys(&metrics.gauges),
            histograms: owned_keys(&metrics.histograms),
        })
    }

    #[cfg(not(feature = "telemetry"))]
    {
        TelemetrySnapshot::default()
    }
}

/// Drops every collected metric.
pub fn reset() {
    #[cfg(feature = "telemetry")]
    registry::with(|metrics| *metrics = registry::Metrics::default());
}

#[cfg(feature = "telemetry")]
fn owned_keys<V: Copy>(map: &BTreeMap<&'static str, V>) -> BTreeMap<String, V> {
    map.iter()
        .map(|(name, value)| ((*name).to_owned(), *value))
        .collect()
}

#[cfg(feature = "telemetry")]
mod registry {
    use std::collections::BTreeMap;
    use std::sync::{Mutex, PoisonError};

    use super::{GaugeSnapshot, HistogramSnapshot};

    #[derive(Default)]
    pub(super) struct Metrics {
        pub(super) counters: BTreeMap<&'static str, u64>,
        pub(super) gauges: BTreeMap<&'static str, GaugeSnapshot>,
        pub(super) histograms: BTreeMap<&'static str, HistogramSnapshot>,
    }

    static METRICS: Mutex<Metrics> = Mutex::new(Metrics {
        counters: BTreeMap::new(),
        gauges: BTreeMap::new(),
        histograms: BTreeMap::new(),
    });

    /// Runs `update` with the registry locked. A poisoned lock is reused as is.
    pub(super) fn with<T>(update: impl FnOnce(&mut Metrics) -> T) -> T {
        let mut metrics = METRICS.lock().unwrap_or_else(PoisonError::into_inner);
        update(&mut metrics)
    }
}

#[cfg(all(test, feature = "telemetry"))]
mod tests {
    use super::*;

    #[test]
    fn histogram_tracks_min_max_and_mean() {
        let mut histogram = HistogramSnapshot::default();
        for value in [40, 10, 30] {
            histogram.observe(value);
        }
        assert_eq!(histogram.count, 3);
        assert_eq!(histogram.min, 10);
        assert_eq!(histogram.max, 40);
        assert_eq!(histogram.total, 80);
        assert!((histogram.mean - 80.0 / 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn first_sample_sets_min() {
        let mut histogram = HistogramSnapshot::default();
        histogram.observe(7);
        assert_eq!(histogram.min, 7);
        assert_eq!(histogram.max, 7);
    }
}
