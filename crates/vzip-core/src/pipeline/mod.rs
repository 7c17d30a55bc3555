use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tempfile::NamedTempFile;

use crate::VzipError;
use crate::compression::{FrameCodec, ZlibCodec, reverse_compression};
use crate::core::{BoundedOrderedQueue, WorkerPool, WorkerRuntimeSnapshot};
use crate::format::{ArchiveReader, ArchiveWriter, PpmHeader};
use crate::io::FrameScanner;
use crate::telemetry::{self, DefaultWorkerTelemetry, WorkerTelemetry, tags};
use crate::types::{CompressedFrame, FrameSource, FrameTask, Result, TaskOutput};

pub mod consumer;
pub mod producer;
pub mod types;

pub use types::{
    ArchiveConfig, ArchiveProgressSnapshot, ArchiveRunStats, DEFAULT_FRAME_BOUND, ExtractStats,
    OversizePolicy, RecordInfo, compression_ratio,
};

/// Poll interval used while waiting for worker results.
const RESULT_POLL_INTERVAL: Duration = Duration::from_millis(50);
/// Interval used when the caller does not want progress.
const NO_PROGRESS_INTERVAL: Duration = Duration::from_secs(3600);

/// Naming of files written by [`ArchivePipeline::extract_to_directory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameNaming {
    pub prefix: String,
    pub suffix: String,
}

impl FrameNaming {
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }

    /// File name for record `index`, zero-padded to six digits.
    pub fn file_name(&self, index: usize) -> String {
        format!("{}{index:06}{}", self.prefix, self.suffix)
    }
}

impl Default for FrameNaming {
    fn default() -> Self {
        Self::new("frame", crate::io::DEFAULT_FRAME_SUFFIX)
    }
}

/// Everything a run hands back before the archive is written.
struct CollectedRun {
    frames: Vec<CompressedFrame>,
    input_bytes_total: u64,
    peak_active_workers: usize,
    peak_queue_depth: usize,
    workers: Vec<WorkerRuntimeSnapshot>,
}

/// Producer/consumer pipeline that packs a directory of frames into a
/// `.vzip` archive.
///
/// Every frame gets one producer task and one consumer task on a fixed pool
/// whose size equals the limiter's permit count. Tasks are submitted as
/// `Produce(0), Consume, Produce(1), Consume, ...`; since the pool hands
/// tasks out in that order, a consumer never starts ahead of the producer
/// that feeds it and the workers cannot all end up blocked on the queue.
/// Consumers may finish in any order; results are sorted by frame index
/// before anything is written.
pub struct ArchivePipeline {
    config: ArchiveConfig,
    codec: Arc<dyn FrameCodec>,
    telemetry: Arc<dyn WorkerTelemetry>,
}

impl ArchivePipeline {
    /// Creates a pipeline using zlib at the configured level.
    pub fn new(config: ArchiveConfig) -> Self {
        let codec = Arc::new(ZlibCodec::new(config.compression_level));
        Self {
            config,
            codec,
            telemetry: Arc::new(DefaultWorkerTelemetry),
        }
    }

    /// Replaces the frame codec.
    pub fn with_codec(mut self, codec: Arc<dyn FrameCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Replaces the worker telemetry backend.
    pub fn with_telemetry(mut self, telemetry: Arc<dyn WorkerTelemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    pub fn codec(&self) -> &dyn FrameCodec {
        self.codec.as_ref()
    }

    /// Lists the frames of `dir` using the configured suffix.
    pub fn scan<P: AsRef<Path>>(&self, dir: P) -> Result<Vec<FrameSource>> {
        FrameScanner::new(self.config.frame_suffix.clone()).scan(dir.as_ref())
    }

    /// Archives every frame of `dir` into `writer`.
    pub fn archive_directory<P, W>(&self, dir: P, writer: W) -> Result<(W, ArchiveRunStats)>
    where
        P: AsRef<Path>,
        W: Write,
    {
        let sources = self.scan(dir)?;
        self.archive_sources(sources, writer)
    }

    /// Archives an explicit frame list into `writer`.
    ///
    /// Indices must be exactly `0..sources.len()`, in any order.
    pub fn archive_sources<W: Write>(
        &self,
        sources: Vec<FrameSource>,
        writer: W,
    ) -> Result<(W, ArchiveRunStats)> {
        self.archive_sources_with_progress(sources, writer, NO_PROGRESS_INTERVAL, |_snapshot| {})
    }

    /// Archives an explicit frame list and emits progress snapshots while
    /// results arrive.
    ///
    /// Nothing is written to `writer` unless every frame was read and
    /// compressed successfully.
    pub fn archive_sources_with_progress<W, F>(
        &self,
        sources: Vec<FrameSource>,
        writer: W,
        progress_interval: Duration,
        on_progress: F,
    ) -> Result<(W, ArchiveRunStats)>
    where
        W: Write,
        F: FnMut(ArchiveProgressSnapshot),
    {
        let started_at = Instant::now();
        let collected = self.collect_frames(sources, progress_interval, on_progress)?;
        let (writer, stats) = Self::write_frames(collected, writer, started_at)?;

        telemetry::increment_counter(tags::METRIC_ARCHIVE_RUN_COUNT, 1);
        tracing::info!(
            target: tags::TARGET_PIPELINE,
            frames = stats.frames,
            input_bytes = stats.input_bytes_total,
            output_bytes = stats.output_bytes_total,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            peak_active_workers = stats.peak_active_workers,
            peak_queue_depth = stats.peak_queue_depth,
            "archive run finished"
        );
        Ok((writer, stats))
    }

    /// Archives the frames of `dir` into a file at `output`.
    ///
    /// The archive is assembled in a temporary file next to `output` and
    /// renamed into place only once complete; on any error `output` is left
    /// untouched.
    pub fn archive_to_path<P, Q>(&self, dir: P, output: Q) -> Result<ArchiveRunStats>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        let sources = self.scan(dir)?;
        self.archive_sources_to_path(sources, output)
    }

    /// Same as [`archive_to_path`](Self::archive_to_path) with progress
    /// snapshots.
    pub fn archive_to_path_with_progress<P, Q, F>(
        &self,
        dir: P,
        output: Q,
        progress_interval: Duration,
        on_progress: F,
    ) -> Result<ArchiveRunStats>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
        F: FnMut(ArchiveProgressSnapshot),
    {
        let sources = self.scan(dir)?;
        self.archive_sources_to_path_with_progress(sources, output, progress_interval, on_progress)
    }

    /// Archives an explicit frame list into a file at `output`, all or nothing.
    pub fn archive_sources_to_path<Q: AsRef<Path>>(
        &self,
        sources: Vec<FrameSource>,
        output: Q,
    ) -> Result<ArchiveRunStats> {
        self.archive_sources_to_path_with_progress(
            sources,
            output,
            NO_PROGRESS_INTERVAL,
            |_snapshot| {},
        )
    }

    /// Archives an explicit frame list into a file at `output`, all or
    /// nothing, emitting progress snapshots.
    pub fn archive_sources_to_path_with_progress<Q, F>(
        &self,
        sources: Vec<FrameSource>,
        output: Q,
        progress_interval: Duration,
        on_progress: F,
    ) -> Result<ArchiveRunStats>
    where
        Q: AsRef<Path>,
        F: FnMut(ArchiveProgressSnapshot),
    {
        let output = output.as_ref();
        let parent = output
            .parent()
            .filter(|path| !path.as_os_str().is_empty())
            .unwrap_or(Path::new("."));

        let mut staging = NamedTempFile::new_in(parent).map_err(|error| {
            VzipError::from(error).with_context(format!("creating archive in {}", parent.display()))
        })?;

        let stats = {
            let writer = BufWriter::new(staging.as_file_mut());
            let (writer, stats) = self.archive_sources_with_progress(
                sources,
                writer,
                progress_interval,
                on_progress,
            )?;
            writer
                .into_inner()
                .map_err(|error| VzipError::Io(error.into_error()))?;
            stats
        };

        staging.persist(output).map_err(|error| {
            VzipError::Io(error.error).with_context(format!("publishing {}", output.display()))
        })?;
        tracing::debug!(
            target: tags::TARGET_FORMAT,
            path = %output.display(),
            bytes = stats.archive_bytes,
            "archive published"
        );
        Ok(stats)
    }

    /// Decompresses every record of an archive stream, in archive order.
    pub fn extract_archive<R: Read>(&self, reader: R) -> Result<Vec<Vec<u8>>> {
        let mut archive = ArchiveReader::new(reader);
        let mut frames = Vec::new();
        for record in archive.records() {
            let (index, payload) = record?;
            let frame = reverse_compression(self.codec.as_ref(), &payload)
                .map_err(|error| error.with_context(format!("record {index}")))?;
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Decompresses every record of the archive at `archive` into `out_dir`.
    ///
    /// Records are streamed one at a time; the directory is created if
    /// needed.
    pub fn extract_to_directory<P, Q>(
        &self,
        archive: P,
        out_dir: Q,
        naming: &FrameNaming,
    ) -> Result<ExtractStats>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        let started_at = Instant::now();
        let archive = archive.as_ref();
        let out_dir = out_dir.as_ref();
        let file = File::open(archive).map_err(|error| {
            VzipError::from(error).with_context(format!("opening {}", archive.display()))
        })?;
        fs::create_dir_all(out_dir)?;

        let mut reader = ArchiveReader::new(BufReader::new(file));
        let mut stats = ExtractStats {
            elapsed: Duration::ZERO,
            records: 0,
            input_bytes_total: 0,
            output_bytes_total: 0,
        };
        for record in reader.records() {
            let (index, payload) = record?;
            let frame = reverse_compression(self.codec.as_ref(), &payload)
                .map_err(|error| error.with_context(format!("record {index}")))?;
            fs::write(out_dir.join(naming.file_name(index)), &frame)?;

            stats.records += 1;
            stats.input_bytes_total += payload.len() as u64;
            stats.output_bytes_total += frame.len() as u64;
        }
        stats.elapsed = started_at.elapsed();

        tracing::info!(
            target: tags::TARGET_PIPELINE,
            records = stats.records,
            output_bytes = stats.output_bytes_total,
            dir = %out_dir.display(),
            "archive extracted"
        );
        Ok(stats)
    }

    /// Describes every record of an archive stream without keeping payloads.
    pub fn inspect_archive<R: Read>(&self, reader: R) -> Result<Vec<RecordInfo>> {
        let mut archive = ArchiveReader::new(reader);
        let mut records = Vec::new();
        for record in archive.records() {
            let (index, payload) = record?;
            let frame = reverse_compression(self.codec.as_ref(), &payload)
                .map_err(|error| error.with_context(format!("record {index}")))?;
            records.push(RecordInfo {
                index,
                compressed_len: payload.len(),
                original_len: frame.len(),
                dimensions: PpmHeader::parse(&frame).map(|header| (header.width, header.height)),
            });
        }
        Ok(records)
    }

    fn collect_frames<F>(
        &self,
        sources: Vec<FrameSource>,
        progress_interval: Duration,
        mut on_progress: F,
    ) -> Result<CollectedRun>
    where
        F: FnMut(ArchiveProgressSnapshot),
    {
        let sources = validate_sources(sources)?;
        let frames_total = sources.len();
        if frames_total == 0 {
            tracing::debug!(target: tags::TARGET_PIPELINE, "no frames to archive");
            return Ok(CollectedRun {
                frames: Vec::new(),
                input_bytes_total: 0,
                peak_active_workers: 0,
                peak_queue_depth: 0,
                workers: Vec::new(),
            });
        }

        let queue = Arc::new(BoundedOrderedQueue::with_capacity(
            self.config.queue_capacity,
        ));
        let pool = WorkerPool::with_telemetry(self.config.max_workers, Arc::clone(&self.telemetry));

        let task_queue = Arc::clone(&queue);
        let codec = Arc::clone(&self.codec);
        let max_frame_bytes = self.config.max_frame_bytes;
        let max_compressed_bytes = self.config.max_compressed_bytes;
        let policy = self.config.oversize_policy;
        let mut handle = pool.spawn(move |_worker_id, task| {
            let _guard = AbortOnPanic(&task_queue);
            if task_queue.is_aborted() {
                return Err(VzipError::QueueAborted);
            }
            let output = match task {
                FrameTask::Produce(source) => {
                    producer::produce(&source, &task_queue, max_frame_bytes, policy).map(
                        |bytes| TaskOutput::Produced {
                            index: source.index,
                            bytes,
                        },
                    )
                }
                FrameTask::Consume => {
                    consumer::consume(&task_queue, codec.as_ref(), max_compressed_bytes)
                        .map(TaskOutput::Consumed)
                }
            };
            if output
                .as_ref()
                .is_err_and(|error| !matches!(error, VzipError::QueueAborted))
            {
                task_queue.abort();
            }
            output
        })?;

        tracing::debug!(
            target: tags::TARGET_PIPELINE,
            frames = frames_total,
            workers = pool.num_workers(),
            queue_capacity = queue.capacity(),
            "archive run started"
        );

        for source in sources {
            let submitted = handle
                .submit(FrameTask::Produce(source))
                .and_then(|()| handle.submit(FrameTask::Consume));
            if let Err(error) = submitted {
                queue.abort();
                let _ = handle.finish();
                return Err(error);
            }
        }
        handle.close();

        let expected = frames_total * 2;
        let started_at = Instant::now();
        let emit_every = progress_interval.max(Duration::from_millis(10));
        let mut last_emit_at = Instant::now();
        let mut received = 0usize;
        let mut frames_read = 0usize;
        let mut input_bytes_total = 0u64;
        let mut output_bytes = 0u64;
        let mut frames = Vec::with_capacity(frames_total);
        let mut first_error: Option<VzipError> = None;

        while received < expected {
            match handle.recv_timeout(RESULT_POLL_INTERVAL) {
                Some(result) => {
                    received += 1;
                    match result {
                        Ok(TaskOutput::Produced { bytes, .. }) => {
                            frames_read += 1;
                            input_bytes_total += bytes;
                        }
                        Ok(TaskOutput::Consumed(frame)) => {
                            output_bytes += frame.len() as u64;
                            frames.push(frame);
                        }
                        Err(error) => {
                            queue.abort();
                            record_first_error(&mut first_error, error);
                        }
                    }
                }
                None if handle.is_drained() => break,
                None => {}
            }

            if last_emit_at.elapsed() >= emit_every || received == expected {
                on_progress(ArchiveProgressSnapshot {
                    elapsed: started_at.elapsed(),
                    frames_total,
                    frames_read,
                    frames_compressed: frames.len(),
                    input_bytes_read: input_bytes_total,
                    output_bytes_compressed: output_bytes,
                    runtime: handle.runtime_snapshot(),
                });
                last_emit_at = Instant::now();
            }
        }

        let runtime = handle.runtime_snapshot();
        let peak_active_workers = handle.peak_active();
        if let Err(join_error) = handle.join() {
            record_first_error(&mut first_error, join_error);
        }
        if let Some(error) = first_error {
            tracing::warn!(target: tags::TARGET_PIPELINE, %error, "archive run aborted");
            return Err(error);
        }
        if frames.len() != frames_total {
            return Err(VzipError::InvalidInput(
                "worker pool exited before every frame was compressed",
            ));
        }

        Ok(CollectedRun {
            frames,
            input_bytes_total,
            peak_active_workers,
            peak_queue_depth: queue.peak_len(),
            workers: runtime.workers,
        })
    }

    fn write_frames<W: Write>(
        collected: CollectedRun,
        writer: W,
        started_at: Instant,
    ) -> Result<(W, ArchiveRunStats)> {
        let CollectedRun {
            mut frames,
            input_bytes_total,
            peak_active_workers,
            peak_queue_depth,
            workers,
        } = collected;

        frames.sort_by_key(|frame| frame.index);

        let mut archive_writer = ArchiveWriter::new(writer);
        for frame in &frames {
            archive_writer.write_record(frame)?;
        }
        let output_bytes_total = archive_writer.payload_bytes();
        let archive_bytes = archive_writer.archive_bytes();
        let writer = archive_writer.finish()?;

        let stats = ArchiveRunStats {
            elapsed: started_at.elapsed(),
            frames: frames.len(),
            input_bytes_total,
            output_bytes_total,
            archive_bytes,
            peak_active_workers,
            peak_queue_depth,
            workers,
        };
        Ok((writer, stats))
    }
}

/// Aborts the queue if a task unwinds, so its peers are not left waiting.
struct AbortOnPanic<'a>(&'a BoundedOrderedQueue);

impl Drop for AbortOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.abort();
        }
    }
}

/// Keeps the first error that is not a consequence of an earlier abort.
fn record_first_error(slot: &mut Option<VzipError>, error: VzipError) {
    match slot {
        None => *slot = Some(error),
        Some(existing)
            if matches!(existing.root(), VzipError::QueueAborted)
                && !matches!(error.root(), VzipError::QueueAborted) =>
        {
            *slot = Some(error);
        }
        Some(_) => {}
    }
}

/// Orders sources by index and checks they number exactly `0..n`.
fn validate_sources(mut sources: Vec<FrameSource>) -> Result<Vec<FrameSource>> {
    sources.sort_by_key(|source| source.index);
    if let Some(pair) = sources
        .windows(2)
        .find(|pair| pair[0].index == pair[1].index)
    {
        return Err(VzipError::DuplicateFrame {
            index: pair[0].index,
        });
    }
    let contiguous = sources
        .iter()
        .enumerate()
        .all(|(position, source)| source.index == position);
    if !contiguous {
        return Err(VzipError::InvalidInput(
            "frame indices must be numbered 0..n without gaps",
        ));
    }
    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_source_index_is_reported() {
        let sources = vec![
            FrameSource::new(0, "a.ppm"),
            FrameSource::new(1, "b.ppm"),
            FrameSource::new(1, "c.ppm"),
        ];
        assert!(matches!(
            validate_sources(sources),
            Err(VzipError::DuplicateFrame { index: 1 })
        ));
    }

    #[test]
    fn gaps_in_source_indices_are_rejected() {
        let sources = vec![FrameSource::new(0, "a.ppm"), FrameSource::new(2, "b.ppm")];
        assert!(matches!(
            validate_sources(sources),
            Err(VzipError::InvalidInput(_))
        ));
    }

    #[test]
    fn sources_are_sorted_by_index() -> Result<()> {
        let sources = vec![FrameSource::new(1, "b.ppm"), FrameSource::new(0, "a.ppm")];
        let sorted = validate_sources(sources)?;
        assert_eq!(sorted[0].index, 0);
        assert_eq!(sorted[1].index, 1);
        Ok(())
    }

    #[test]
    fn abort_error_is_replaced_by_root_cause() {
        let mut slot = None;
        record_first_error(&mut slot, VzipError::QueueAborted);
        record_first_error(
            &mut slot,
            VzipError::CompressionOverflow { index: 2, limit: 8 },
        );
        record_first_error(&mut slot, VzipError::DuplicateFrame { index: 0 });
        assert!(matches!(
            slot,
            Some(VzipError::CompressionOverflow { index: 2, limit: 8 })
        ));
    }

    #[test]
    fn naming_pads_index() {
        let naming = FrameNaming::default();
        assert_eq!(naming.file_name(42), "frame000042.ppm");
    }
}
