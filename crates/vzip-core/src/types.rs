use std::path::PathBuf;
use std::time::Duration;

use crate::error::VzipError;
use crate::telemetry::TaskKind;

pub type Result<T> = std::result::Result<T, VzipError>;

/// Converts a duration to whole microseconds, clamped to `u64::MAX`.
#[inline]
pub fn duration_to_us(duration: Duration) -> u64 {
    duration.as_micros().min(u64::MAX as u128) as u64
}

/// One input frame on disk, identified by its position in the sorted listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSource {
    pub index: usize,
    pub path: PathBuf,
}

impl FrameSource {
    pub fn new(index: usize, path: impl Into<PathBuf>) -> Self {
        Self {
            index,
            path: path.into(),
        }
    }
}

/// Raw frame bytes read by a producer and waiting to be compressed.
///
/// The buffer is owned by exactly one party at a time: the producer that
/// read it, the queue while it is pending, then the consumer that pops it.
#[derive(Debug, PartialEq, Eq)]
pub struct RawFrame {
    pub index: usize,
    pub data: Vec<u8>,
}

impl RawFrame {
    pub fn new(index: usize, data: Vec<u8>) -> Self {
        Self { index, data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// A compressed frame tagged with the index of the raw frame it came from.
///
/// The index, not completion order, decides where the frame lands in the
/// archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedFrame {
    pub index: usize,
    pub data: Vec<u8>,
    pub original_len: u64,
}

impl CompressedFrame {
    pub fn new(index: usize, data: Vec<u8>, original_len: u64) -> Self {
        Self {
            index,
            data,
            original_len,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Unit of work scheduled on the worker pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameTask {
    /// Read the given frame and queue it.
    Produce(FrameSource),
    /// Compress whichever frame the queue yields next.
    Consume,
}

impl FrameTask {
    pub fn kind(&self) -> TaskKind {
        match self {
            Self::Produce(_) => TaskKind::Produce,
            Self::Consume => TaskKind::Consume,
        }
    }
}

/// Result of one [`FrameTask`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutput {
    /// A producer queued frame `index` after reading `bytes` bytes.
    Produced { index: usize, bytes: u64 },
    /// A consumer finished compressing a frame.
    Consumed(CompressedFrame),
}
