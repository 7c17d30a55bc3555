//! On-disk archive formats and payload probing.

pub mod ppm;
pub mod vzip;

pub use ppm::PpmHeader;
pub use vzip::{ArchiveReader, ArchiveWriter, LENGTH_PREFIX_SIZE, RecordIterator};
