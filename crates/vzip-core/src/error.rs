use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VzipError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to read frame {index} ({}): {source}", path.display())]
    FrameRead {
        index: usize,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("frame {index} is {len} bytes, exceeding the {max} byte frame limit")]
    FrameTooLarge { index: usize, len: u64, max: usize },
    #[error("compressed frame {index} does not fit in {limit} bytes")]
    CompressionOverflow { index: usize, limit: usize },
    #[error("compression error: {0}")]
    CompressionError(String),
    #[error("decompression error: {0}")]
    DecompressionError(String),
    #[error("failed to start worker thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),
    #[error("worker thread panicked: {0}")]
    WorkerPanicked(String),
    #[error("frame queue aborted")]
    QueueAborted,
    #[error("frame {index} was queued twice")]
    DuplicateFrame { index: usize },
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("record {index} is {len} bytes, too large for a 32-bit length prefix")]
    RecordTooLarge { index: usize, len: usize },
    #[error("truncated archive at record {record} (expected {expected} bytes, found {actual})")]
    TruncatedArchive {
        record: usize,
        expected: usize,
        actual: usize,
    },
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<VzipError>,
    },
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl VzipError {
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Returns the innermost error, skipping any context wrappers.
    pub fn root(&self) -> &VzipError {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }
}
