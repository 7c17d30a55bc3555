use std::time::Instant;

use crate::telemetry::{self, tags};
use crate::types::{CompressedFrame, RawFrame, duration_to_us};
use crate::{Result, VzipError};

pub mod zlib;

pub use zlib::ZlibCodec;

/// Result of one bounded compression attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompressOutcome {
    /// The complete stream fit within the output bound.
    Complete(Vec<u8>),
    /// The stream would not finish within the output bound.
    Overflow,
}

/// Whole-frame codec used by consumers.
///
/// Implementations must be stateless between calls: the same input always
/// yields the same output regardless of which thread runs it.
pub trait FrameCodec: Send + Sync {
    fn name(&self) -> &'static str;

    /// Compresses `data` into at most `limit` bytes.
    fn compress(&self, data: &[u8], limit: usize) -> Result<CompressOutcome>;

    /// Restores the bytes of one compressed frame.
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Compresses one raw frame, keeping its index on the result.
///
/// # Errors
/// Returns [`VzipError::CompressionOverflow`] when the stream does not fit in
/// `limit` bytes, or the codec's own error.
pub fn apply_compression(
    codec: &dyn FrameCodec,
    frame: &RawFrame,
    limit: usize,
) -> Result<CompressedFrame> {
    let start = Instant::now();
    let input_bytes = frame.len() as u64;

    let outcome = codec.compress(&frame.data, limit)?;
    let compressed = match outcome {
        CompressOutcome::Complete(data) => data,
        CompressOutcome::Overflow => {
            telemetry::increment_counter(tags::METRIC_COMPRESSION_OVERFLOW_COUNT, 1);
            tracing::warn!(
                target: tags::TARGET_COMPRESSION,
                index = frame.index,
                input_bytes,
                limit,
                codec = codec.name(),
                "compressed frame exceeds output bound"
            );
            return Err(VzipError::CompressionOverflow {
                index: frame.index,
                limit,
            });
        }
    };

    let elapsed_us = duration_to_us(start.elapsed());
    let output_bytes = compressed.len() as u64;
    telemetry::increment_counter(tags::METRIC_COMPRESSION_APPLY_COUNT, 1);
    telemetry::record_histogram(tags::METRIC_COMPRESSION_APPLY_LATENCY_US, elapsed_us);
    telemetry::record_histogram(tags::METRIC_COMPRESSION_INPUT_BYTES, input_bytes);
    telemetry::record_histogram(tags::METRIC_COMPRESSION_OUTPUT_BYTES, output_bytes);
    tracing::trace!(
        target: tags::TARGET_COMPRESSION,
        index = frame.index,
        input_bytes,
        output_bytes,
        elapsed_us,
        "frame compressed"
    );

    Ok(CompressedFrame::new(frame.index, compressed, input_bytes))
}

/// Decompresses one archive record.
pub fn reverse_compression(codec: &dyn FrameCodec, data: &[u8]) -> Result<Vec<u8>> {
    codec
        .decompress(data)
        .map_err(|error| error.with_context(format!("{} record", codec.name())))
}
