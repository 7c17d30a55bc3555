use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::compression::zlib::MAX_LEVEL;
use crate::core::{
    DEFAULT_MAX_WORKERS, DEFAULT_QUEUE_CAPACITY, PoolRuntimeSnapshot, WorkerRuntimeSnapshot,
};
use crate::io::DEFAULT_FRAME_SUFFIX;

/// Default upper bound on raw and compressed frame sizes (1 MiB).
pub const DEFAULT_FRAME_BOUND: usize = 1_048_576;

/// What a producer does with a source file larger than `max_frame_bytes`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OversizePolicy {
    /// Fail the run with [`VzipError::FrameTooLarge`](crate::VzipError::FrameTooLarge).
    #[default]
    Reject,
    /// Keep the first `max_frame_bytes` bytes and ignore the rest.
    Truncate,
}

/// Construction config for the archive pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Permits shared by producers and consumers; also the worker thread count.
    pub max_workers: usize,
    /// Raw frames allowed to wait in the queue.
    pub queue_capacity: usize,
    /// Largest raw frame accepted from disk.
    pub max_frame_bytes: usize,
    /// Largest compressed record a consumer may produce.
    pub max_compressed_bytes: usize,
    /// File name suffix selecting frames in a directory.
    pub frame_suffix: String,
    /// zlib effort level, `0..=9`.
    pub compression_level: u32,
    pub oversize_policy: OversizePolicy,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_frame_bytes: DEFAULT_FRAME_BOUND,
            max_compressed_bytes: DEFAULT_FRAME_BOUND,
            frame_suffix: DEFAULT_FRAME_SUFFIX.to_string(),
            compression_level: MAX_LEVEL,
            oversize_policy: OversizePolicy::Reject,
        }
    }
}

impl ArchiveConfig {
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity.max(1);
        self
    }

    pub fn with_max_frame_bytes(mut self, max_frame_bytes: usize) -> Self {
        self.max_frame_bytes = max_frame_bytes;
        self
    }

    pub fn with_max_compressed_bytes(mut self, max_compressed_bytes: usize) -> Self {
        self.max_compressed_bytes = max_compressed_bytes;
        self
    }

    pub fn with_frame_suffix(mut self, frame_suffix: impl Into<String>) -> Self {
        self.frame_suffix = frame_suffix.into();
        self
    }

    pub fn with_compression_level(mut self, compression_level: u32) -> Self {
        self.compression_level = compression_level.min(MAX_LEVEL);
        self
    }

    pub fn with_oversize_policy(mut self, oversize_policy: OversizePolicy) -> Self {
        self.oversize_policy = oversize_policy;
        self
    }
}

/// Progress snapshot emitted while an archive run collects results.
#[derive(Debug, Clone)]
pub struct ArchiveProgressSnapshot {
    pub elapsed: Duration,
    pub frames_total: usize,
    pub frames_read: usize,
    pub frames_compressed: usize,
    pub input_bytes_read: u64,
    pub output_bytes_compressed: u64,
    pub runtime: PoolRuntimeSnapshot,
}

/// Final statistics of a completed archive run.
#[derive(Debug, Clone)]
pub struct ArchiveRunStats {
    pub elapsed: Duration,
    pub frames: usize,
    /// Bytes read from all source frames.
    pub input_bytes_total: u64,
    /// Sum of record payload lengths, excluding length prefixes.
    pub output_bytes_total: u64,
    /// Bytes written to the archive, prefixes included.
    pub archive_bytes: u64,
    pub peak_active_workers: usize,
    pub peak_queue_depth: usize,
    pub workers: Vec<WorkerRuntimeSnapshot>,
}

impl ArchiveRunStats {
    /// Space saved as a percentage of the input, `None` for an empty input.
    pub fn compression_ratio(&self) -> Option<f64> {
        compression_ratio(self.input_bytes_total, self.output_bytes_total)
    }
}

/// `100 * (input - output) / input`, or `None` when `input` is zero.
///
/// Negative when the output is larger than the input.
pub fn compression_ratio(input_bytes: u64, output_bytes: u64) -> Option<f64> {
    if input_bytes == 0 {
        return None;
    }
    Some(100.0 * (input_bytes as f64 - output_bytes as f64) / input_bytes as f64)
}

/// Summary of one decompressed archive record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordInfo {
    pub index: usize,
    pub compressed_len: usize,
    pub original_len: usize,
    /// `(width, height)` when the payload starts with a netpbm header.
    pub dimensions: Option<(u32, u32)>,
}

/// Final statistics of an extraction.
#[derive(Debug, Clone)]
pub struct ExtractStats {
    pub elapsed: Duration,
    pub records: usize,
    pub input_bytes_total: u64,
    pub output_bytes_total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_is_undefined_for_empty_input() {
        assert_eq!(compression_ratio(0, 0), None);
        assert_eq!(compression_ratio(0, 10), None);
    }

    #[test]
    fn ratio_matches_saved_fraction() {
        assert_eq!(compression_ratio(1000, 250), Some(75.0));
        assert_eq!(compression_ratio(100, 150), Some(-50.0));
    }

    #[test]
    fn setters_clamp_degenerate_values() {
        let config = ArchiveConfig::default()
            .with_max_workers(0)
            .with_queue_capacity(0)
            .with_compression_level(12);
        assert_eq!(config.max_workers, 1);
        assert_eq!(config.queue_capacity, 1);
        assert_eq!(config.compression_level, 9);
    }

    #[test]
    fn default_config_matches_documented_bounds() {
        let config = ArchiveConfig::default();
        assert_eq!(config.max_workers, 19);
        assert_eq!(config.queue_capacity, 100);
        assert_eq!(config.max_frame_bytes, 1 << 20);
        assert_eq!(config.max_compressed_bytes, 1 << 20);
        assert_eq!(config.frame_suffix, ".ppm");
        assert_eq!(config.oversize_policy, OversizePolicy::Reject);
    }
}
