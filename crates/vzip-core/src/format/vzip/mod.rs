mod reader;
mod writer;

pub use reader::{ArchiveReader, RecordIterator};
pub use writer::ArchiveWriter;

/// Size of the native-endian `i32` length prefix in front of every record.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Largest payload a record can describe.
pub const MAX_RECORD_LEN: usize = i32::MAX as usize;
