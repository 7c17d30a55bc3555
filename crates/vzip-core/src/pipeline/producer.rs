use std::fs::File;
use std::io::Read;

use crate::VzipError;
use crate::core::BoundedOrderedQueue;
use crate::telemetry::{self, tags};
use crate::types::{FrameSource, RawFrame, Result};

use super::types::OversizePolicy;

/// Reads one source frame and hands it to the queue.
///
/// The file is read in a single bounded pass; a file shorter than the bound
/// simply yields a shorter frame. Returns the number of bytes queued.
///
/// # Errors
/// [`VzipError::FrameRead`] if the file cannot be opened or read,
/// [`VzipError::FrameTooLarge`] for an oversized file under
/// [`OversizePolicy::Reject`], or any queue error from `push`.
pub fn produce(
    source: &FrameSource,
    queue: &BoundedOrderedQueue,
    max_frame_bytes: usize,
    policy: OversizePolicy,
) -> Result<u64> {
    let frame = read_frame(source, max_frame_bytes, policy)?;
    let bytes = frame.len() as u64;
    queue.push(frame)?;

    telemetry::increment_counter(tags::METRIC_PRODUCER_FRAME_COUNT, 1);
    telemetry::record_histogram(tags::METRIC_PRODUCER_BYTES, bytes);
    Ok(bytes)
}

/// Reads `source` into a [`RawFrame`] of at most `max_frame_bytes` bytes.
pub fn read_frame(
    source: &FrameSource,
    max_frame_bytes: usize,
    policy: OversizePolicy,
) -> Result<RawFrame> {
    let read_error = |error| VzipError::FrameRead {
        index: source.index,
        path: source.path.clone(),
        source: error,
    };

    let file = File::open(&source.path).map_err(read_error)?;
    // One extra byte tells an exactly-full frame apart from an oversized one.
    let read_limit = (max_frame_bytes as u64).saturating_add(1);
    let mut data = Vec::with_capacity(max_frame_bytes.min(1 << 20));
    file.take(read_limit)
        .read_to_end(&mut data)
        .map_err(read_error)?;

    if data.len() > max_frame_bytes {
        match policy {
            OversizePolicy::Reject => {
                let len = std::fs::metadata(&source.path)
                    .map(|metadata| metadata.len())
                    .unwrap_or(data.len() as u64);
                return Err(VzipError::FrameTooLarge {
                    index: source.index,
                    len,
                    max: max_frame_bytes,
                });
            }
            OversizePolicy::Truncate => {
                data.truncate(max_frame_bytes);
                telemetry::increment_counter(tags::METRIC_PRODUCER_TRUNCATED_COUNT, 1);
                tracing::warn!(
                    target: tags::TARGET_PIPELINE,
                    index = source.index,
                    path = %source.path.display(),
                    max_frame_bytes,
                    "frame truncated to size bound"
                );
            }
        }
    }

    Ok(RawFrame::new(source.index, data))
}
