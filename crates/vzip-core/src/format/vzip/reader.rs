use std::io::{ErrorKind, Read};

use crate::{Result, VzipError};

use super::LENGTH_PREFIX_SIZE;

/// Sequential reader over the records of a `.vzip` stream.
#[derive(Debug)]
pub struct ArchiveReader<R: Read> {
    reader: R,
    next_record: usize,
    finished: bool,
}

impl<R: Read> ArchiveReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            next_record: 0,
            finished: false,
        }
    }

    /// Reads the next record payload, or `None` at a clean end of stream.
    ///
    /// # Errors
    /// A partial prefix, a negative length, or a short payload is reported as
    /// [`VzipError::TruncatedArchive`]. The reader stops after any error.
    pub fn next_record(&mut self) -> Result<Option<Vec<u8>>> {
        if self.finished {
            return Ok(None);
        }
        let record = self.next_record;

        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        let read = fill(&mut self.reader, &mut prefix)?;
        if read == 0 {
            self.finished = true;
            return Ok(None);
        }
        if read < LENGTH_PREFIX_SIZE {
            self.finished = true;
            return Err(VzipError::TruncatedArchive {
                record,
                expected: LENGTH_PREFIX_SIZE,
                actual: read,
            });
        }

        let len = i32::from_ne_bytes(prefix);
        let Ok(expected) = usize::try_from(len) else {
            self.finished = true;
            return Err(VzipError::TruncatedArchive {
                record,
                expected: 0,
                actual: 0,
            });
        };

        let mut payload = Vec::with_capacity(expected.min(1 << 20));
        let actual = (&mut self.reader)
            .take(expected as u64)
            .read_to_end(&mut payload)?;
        if actual < expected {
            self.finished = true;
            return Err(VzipError::TruncatedArchive {
                record,
                expected,
                actual,
            });
        }

        self.next_record += 1;
        Ok(Some(payload))
    }

    /// Number of complete records read so far.
    pub fn records_read(&self) -> usize {
        self.next_record
    }

    pub fn records(&mut self) -> RecordIterator<'_, R> {
        RecordIterator { reader: self }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Iterator over `(index, payload)` pairs of an [`ArchiveReader`].
pub struct RecordIterator<'a, R: Read> {
    reader: &'a mut ArchiveReader<R>,
}

impl<R: Read> Iterator for RecordIterator<'_, R> {
    type Item = Result<(usize, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.reader.next_record;
        self.reader
            .next_record()
            .transpose()
            .map(|payload| payload.map(|payload| (index, payload)))
    }
}

/// Reads until `buf` is full or the stream ends; returns the bytes read.
fn fill<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(error) if error.kind() == ErrorKind::Interrupted => {}
            Err(error) => return Err(error),
        }
    }
    Ok(filled)
}
