use std::io::Write;

use crate::telemetry::{self, tags};
use crate::types::CompressedFrame;
use crate::{Result, VzipError};

use super::{LENGTH_PREFIX_SIZE, MAX_RECORD_LEN};

/// Appends length-prefixed records to a `.vzip` stream.
///
/// There is no header or footer; the archive is the concatenation of its
/// records. Frames must be written in index order starting at zero.
#[derive(Debug)]
pub struct ArchiveWriter<W: Write> {
    writer: W,
    records_written: usize,
    payload_bytes: u64,
}

impl<W: Write> ArchiveWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            records_written: 0,
            payload_bytes: 0,
        }
    }

    /// Writes one compressed frame as the next record.
    ///
    /// # Errors
    /// Returns [`VzipError::InvalidInput`] if `frame.index` is not the next
    /// expected index and [`VzipError::RecordTooLarge`] if the payload does
    /// not fit an `i32` length.
    pub fn write_record(&mut self, frame: &CompressedFrame) -> Result<()> {
        if frame.index != self.records_written {
            return Err(VzipError::InvalidInput(
                "archive records must be written in ascending frame order",
            ));
        }
        self.write_payload(frame.index, &frame.data)
    }

    /// Writes a raw payload as the next record, without index checks.
    pub fn write_payload(&mut self, index: usize, payload: &[u8]) -> Result<()> {
        if payload.len() > MAX_RECORD_LEN {
            return Err(VzipError::RecordTooLarge {
                index,
                len: payload.len(),
            });
        }
        let prefix = (payload.len() as i32).to_ne_bytes();
        self.writer.write_all(&prefix)?;
        self.writer.write_all(payload)?;

        self.records_written += 1;
        self.payload_bytes += payload.len() as u64;
        telemetry::increment_counter(tags::METRIC_ARCHIVE_RECORD_COUNT, 1);
        Ok(())
    }

    pub fn records_written(&self) -> usize {
        self.records_written
    }

    /// Sum of record payload lengths, excluding prefixes.
    pub fn payload_bytes(&self) -> u64 {
        self.payload_bytes
    }

    /// Total bytes written, prefixes included.
    pub fn archive_bytes(&self) -> u64 {
        self.payload_bytes + (self.records_written * LENGTH_PREFIX_SIZE) as u64
    }

    /// Flushes and returns the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        self.writer.flush()?;
        tracing::debug!(
            target: tags::TARGET_FORMAT,
            records = self.records_written,
            payload_bytes = self.payload_bytes,
            "archive records flushed"
        );
        Ok(self.writer)
    }
}
