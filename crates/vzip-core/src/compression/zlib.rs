use std::io::Read;

use flate2::read::ZlibDecoder;
use flate2::{Compress, Compression, FlushCompress, Status};

use crate::{Result, VzipError};

use super::{CompressOutcome, FrameCodec};

/// Highest zlib effort level.
pub const MAX_LEVEL: u32 = 9;

/// Single-shot zlib (RFC 1950) codec.
///
/// Each call compresses one whole frame into a fresh stream; no state is
/// carried between frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZlibCodec {
    level: u32,
}

impl ZlibCodec {
    /// Creates a codec with the given effort level, clamped to `0..=9`.
    pub fn new(level: u32) -> Self {
        Self {
            level: level.min(MAX_LEVEL),
        }
    }

    pub fn level(&self) -> u32 {
        self.level
    }
}

impl Default for ZlibCodec {
    fn default() -> Self {
        Self::new(MAX_LEVEL)
    }
}

impl FrameCodec for ZlibCodec {
    fn name(&self) -> &'static str {
        "zlib"
    }

    fn compress(&self, data: &[u8], limit: usize) -> Result<CompressOutcome> {
        let mut stream = Compress::new(Compression::new(self.level), true);
        let mut out = Vec::with_capacity(limit.min(worst_case_len(data.len())));

        // One call with Finish: the stream must end within the output buffer.
        let status = stream
            .compress_vec(data, &mut out, FlushCompress::Finish)
            .map_err(|err| VzipError::CompressionError(format!("zlib encode failed: {err}")))?;

        let finished = matches!(status, Status::StreamEnd)
            && stream.total_in() == data.len() as u64
            && out.len() <= limit;
        if finished {
            Ok(CompressOutcome::Complete(out))
        } else {
            Ok(CompressOutcome::Overflow)
        }
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = ZlibDecoder::new(data);
        let mut out = Vec::with_capacity(data.len().saturating_mul(4));
        decoder
            .read_to_end(&mut out)
            .map_err(|err| VzipError::DecompressionError(format!("zlib decode failed: {err}")))?;
        Ok(out)
    }
}

/// Output reservation that covers a finished zlib stream for `len` input
/// bytes at any level.
///
/// Incompressible input becomes stored blocks of 5 bytes overhead each;
/// `len / 1024` leaves room for blocks far smaller than 64 KiB, and the
/// constant covers the header, Adler-32 trailer and the final block.
fn worst_case_len(len: usize) -> usize {
    len.saturating_add(len >> 10).saturating_add(64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pseudo_random_bytes(len: usize, seed: u64) -> Vec<u8> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
                (state >> 56) as u8
            })
            .collect()
    }

    #[test]
    fn compresses_zeroes_below_input_size() -> Result<()> {
        let codec = ZlibCodec::default();
        let data = vec![0u8; 4096];
        let CompressOutcome::Complete(compressed) = codec.compress(&data, 4096)? else {
            panic!("zeroes must fit in the output bound");
        };
        assert!(compressed.len() < data.len());
        assert_eq!(codec.decompress(&compressed)?, data);
        Ok(())
    }

    #[test]
    fn output_is_a_standard_zlib_stream() -> Result<()> {
        let codec = ZlibCodec::default();
        let CompressOutcome::Complete(compressed) = codec.compress(b"frame payload", 1024)? else {
            panic!("short input must fit");
        };
        // CMF byte for deflate with a 32 KiB window.
        assert_eq!(compressed[0], 0x78);
        assert_eq!(u16::from_be_bytes([compressed[0], compressed[1]]) % 31, 0);
        Ok(())
    }

    #[test]
    fn random_input_overflows_equal_sized_bound() -> Result<()> {
        let codec = ZlibCodec::default();
        let data = pseudo_random_bytes(64 * 1024, 0xDEAD_BEEF);
        assert_eq!(codec.compress(&data, data.len())?, CompressOutcome::Overflow);

        let widened = data.len() + data.len() / 100 + 64;
        assert!(matches!(
            codec.compress(&data, widened)?,
            CompressOutcome::Complete(_)
        ));
        Ok(())
    }

    #[test]
    fn empty_input_produces_valid_stream() -> Result<()> {
        let codec = ZlibCodec::default();
        let CompressOutcome::Complete(compressed) = codec.compress(&[], 64)? else {
            panic!("empty input must fit");
        };
        assert!(!compressed.is_empty());
        assert!(codec.decompress(&compressed)?.is_empty());
        Ok(())
    }

    #[test]
    fn corrupt_stream_is_reported() {
        let codec = ZlibCodec::default();
        let err = codec.decompress(&[0x78, 0x9c, 0xff, 0xff, 0x00]).unwrap_err();
        assert!(matches!(err, VzipError::DecompressionError(_)));
    }

    #[test]
    fn huge_bound_reserves_only_what_the_input_needs() -> Result<()> {
        let data = pseudo_random_bytes(256 * 1024, 7);
        for level in [0, 6, MAX_LEVEL] {
            let codec = ZlibCodec::new(level);
            let CompressOutcome::Complete(compressed) = codec.compress(&data, usize::MAX)? else {
                panic!("level {level} must finish under an unbounded limit");
            };
            assert!(compressed.capacity() <= worst_case_len(data.len()));
            assert_eq!(codec.decompress(&compressed)?, data);
        }
        Ok(())
    }

    #[test]
    fn level_is_clamped() {
        assert_eq!(ZlibCodec::new(42).level(), MAX_LEVEL);
    }
}
