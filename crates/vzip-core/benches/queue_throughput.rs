use std::sync::Arc;
use std::thread;

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use vzip_core::{ArchiveConfig, ArchivePipeline, BoundedOrderedQueue, FrameSource, RawFrame};

const FRAME_LEN: usize = 64 * 1024;

fn frame_payload(index: usize) -> Vec<u8> {
    let mut state = 0x9E37_79B9_7F4A_7C15u64 ^ index as u64;
    (0..FRAME_LEN)
        .map(|position| {
            // Mostly flat rows with some noise, roughly like video frames.
            if position % 16 == 0 {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                state as u8
            } else {
                (position / 256) as u8
            }
        })
        .collect()
}

fn run_queue(frames: usize, capacity: usize, consumers: usize) -> usize {
    let queue = Arc::new(BoundedOrderedQueue::with_capacity(capacity));

    let producer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            for index in (0..frames).rev() {
                queue
                    .push(RawFrame::new(index, vec![index as u8; 32]))
                    .expect("queue aborted");
            }
        })
    };

    let handles: Vec<_> = (0..consumers)
        .map(|lane| {
            let queue = Arc::clone(&queue);
            let take = frames / consumers + usize::from(lane < frames % consumers);
            thread::spawn(move || {
                (0..take)
                    .map(|_| queue.pop().expect("queue aborted").len())
                    .sum::<usize>()
            })
        })
        .collect();

    producer.join().expect("producer panicked");
    handles
        .into_iter()
        .map(|handle| handle.join().expect("consumer panicked"))
        .sum()
}

fn bench_ordered_queue(c: &mut Criterion) {
    let frames = 4096;
    let mut group = c.benchmark_group("ordered_queue");
    group.throughput(Throughput::Elements(frames as u64));

    for capacity in [1usize, 16, 100] {
        group.bench_with_input(
            BenchmarkId::new("push_pop", capacity),
            &capacity,
            |b, &capacity| b.iter(|| run_queue(black_box(frames), capacity, 4)),
        );
    }

    group.finish();
}

fn bench_archive_pipeline(c: &mut Criterion) {
    let dir = tempfile::tempdir().expect("temp dir");
    let frames = 48;
    let sources: Vec<FrameSource> = (0..frames)
        .map(|index| {
            let path = dir.path().join(format!("{index:04}.ppm"));
            std::fs::write(&path, frame_payload(index)).expect("write frame");
            FrameSource::new(index, path)
        })
        .collect();

    let mut group = c.benchmark_group("archive_pipeline");
    group.sample_size(10);
    group.throughput(Throughput::Bytes((frames * FRAME_LEN) as u64));

    for workers in [2usize, 8, 19] {
        let pipeline = ArchivePipeline::new(
            ArchiveConfig::default()
                .with_max_workers(workers)
                .with_compression_level(6),
        );
        group.bench_with_input(BenchmarkId::new("workers", workers), &workers, |b, _| {
            b.iter(|| {
                let (archive, _) = pipeline
                    .archive_sources(sources.clone(), Vec::new())
                    .expect("archive run");
                black_box(archive.len())
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_ordered_queue, bench_archive_pipeline);
criterion_main!(benches);
