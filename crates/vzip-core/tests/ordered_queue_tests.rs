use std::sync::Arc;
use std::thread;
use std::time::Duration;

use vzip_core::{BoundedOrderedQueue, ConcurrencyLimiter, RawFrame, VzipError};

#[test]
fn many_producers_and_consumers_respect_capacity() -> Result<(), Box<dyn std::error::Error>> {
    let queue = Arc::new(BoundedOrderedQueue::with_capacity(5));
    let frames = 200usize;

    let producers: Vec<_> = (0..4)
        .map(|lane| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || -> vzip_core::Result<()> {
                for index in (lane..frames).step_by(4) {
                    queue.push(RawFrame::new(index, vec![index as u8; 16]))?;
                }
                Ok(())
            })
        })
        .collect();

    let consumers: Vec<_> = (0..3)
        .map(|lane| {
            let queue = Arc::clone(&queue);
            let take = frames / 3 + usize::from(lane < frames % 3);
            thread::spawn(move || -> vzip_core::Result<Vec<usize>> {
                let mut seen = Vec::with_capacity(take);
                for _ in 0..take {
                    let frame = queue.pop()?;
                    assert_eq!(frame.data, vec![frame.index as u8; 16]);
                    seen.push(frame.index);
                }
                Ok(seen)
            })
        })
        .collect();

    for producer in producers {
        producer.join().expect("producer panicked")?;
    }
    let mut all = Vec::new();
    for consumer in consumers {
        all.extend(consumer.join().expect("consumer panicked")?);
    }

    all.sort_unstable();
    assert_eq!(all, (0..frames).collect::<Vec<_>>());
    assert!(queue.peak_len() <= 5);
    assert!(queue.is_empty());
    Ok(())
}

#[test]
fn abort_unblocks_full_queue_producers() {
    let queue = Arc::new(BoundedOrderedQueue::with_capacity(1));
    queue
        .push(RawFrame::new(0, vec![0]))
        .expect("first push fits");

    let blocked: Vec<_> = (1..4)
        .map(|index| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.push(RawFrame::new(index, vec![0])))
        })
        .collect();

    thread::sleep(Duration::from_millis(30));
    assert_eq!(queue.len(), 1);
    queue.abort();

    for pusher in blocked {
        assert!(matches!(
            pusher.join().expect("pusher panicked"),
            Err(VzipError::QueueAborted)
        ));
    }
    assert!(queue.is_aborted());
    assert!(queue.is_empty());
}

#[test]
fn duplicate_index_leaves_queued_frame_intact() -> Result<(), Box<dyn std::error::Error>> {
    let queue = BoundedOrderedQueue::with_capacity(3);
    queue.push(RawFrame::new(4, b"original".to_vec()))?;
    queue.push(RawFrame::new(6, b"other".to_vec()))?;

    let err = queue.push(RawFrame::new(4, b"impostor".to_vec())).unwrap_err();
    assert!(matches!(err, VzipError::DuplicateFrame { index: 4 }));

    let first = queue.pop()?;
    assert_eq!(first.index, 4);
    assert_eq!(first.data, b"original");
    assert_eq!(queue.len(), 1);
    Ok(())
}

#[test]
fn limiter_blocks_until_permit_released() {
    let limiter = Arc::new(ConcurrencyLimiter::new(1));
    let held = limiter.acquire();

    let waiter = {
        let limiter = Arc::clone(&limiter);
        thread::spawn(move || {
            let _permit = limiter.acquire();
            limiter.in_use()
        })
    };

    thread::sleep(Duration::from_millis(30));
    assert!(!waiter.is_finished());
    drop(held);

    assert_eq!(waiter.join().expect("waiter panicked"), 1);
    assert_eq!(limiter.in_use(), 0);
    assert_eq!(limiter.peak_in_use(), 1);
}
