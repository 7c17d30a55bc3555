pub mod compression;
pub mod core;
pub mod error;
pub mod format;
pub mod io;
pub mod pipeline;
pub mod telemetry;
pub mod types;

pub use compression::{CompressOutcome, FrameCodec, ZlibCodec};
pub use crate::core::{
    BoundedOrderedQueue, ConcurrencyLimiter, Permit, WorkerPool, WorkerPoolHandle,
};
pub use error::VzipError;
pub use format::{ArchiveReader, ArchiveWriter, PpmHeader};
pub use io::FrameScanner;
pub use pipeline::{
    ArchiveConfig, ArchivePipeline, ArchiveProgressSnapshot, ArchiveRunStats, ExtractStats,
    FrameNaming, OversizePolicy, RecordInfo,
};
pub use telemetry::worker::{DefaultWorkerTelemetry, WorkerTelemetry};
pub use types::{CompressedFrame, FrameSource, FrameTask, RawFrame, Result, TaskOutput};
