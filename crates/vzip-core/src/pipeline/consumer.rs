use crate::compression::{FrameCodec, apply_compression};
use crate::core::BoundedOrderedQueue;
use crate::types::{CompressedFrame, Result};

/// Takes the lowest pending frame from the queue and compresses it.
///
/// The raw buffer is released as soon as compression returns. The result
/// keeps the index of the frame that was popped, which is not necessarily
/// the index of the producer scheduled alongside this consumer.
pub fn consume(
    queue: &BoundedOrderedQueue,
    codec: &dyn FrameCodec,
    max_compressed_bytes: usize,
) -> Result<CompressedFrame> {
    let frame = queue.pop()?;
    apply_compression(codec, &frame, max_compressed_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::ZlibCodec;
    use crate::types::RawFrame;

    #[test]
    fn consumes_lowest_index_first() -> Result<()> {
        let queue = BoundedOrderedQueue::with_capacity(4);
        queue.push(RawFrame::new(3, vec![0; 300]))?;
        queue.push(RawFrame::new(1, vec![0; 100]))?;

        let codec = ZlibCodec::default();
        let first = consume(&queue, &codec, 1024)?;
        assert_eq!(first.index, 1);
        assert_eq!(first.original_len, 100);
        assert_eq!(consume(&queue, &codec, 1024)?.index, 3);
        Ok(())
    }
}
