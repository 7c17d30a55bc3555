#[cfg(feature = "telemetry")]
mod telemetry_enabled_tests {
    use std::fs;
    use std::sync::Mutex;

    use tempfile::TempDir;
    use vzip_core::compression::apply_compression;
    use vzip_core::telemetry;
    use vzip_core::telemetry::tags;
    use vzip_core::{ArchiveConfig, ArchivePipeline, RawFrame, VzipError, ZlibCodec};

    static TELEMETRY_TEST_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn archive_run_records_pipeline_metrics() -> Result<(), Box<dyn std::error::Error>> {
        let _guard = TELEMETRY_TEST_MUTEX
            .lock()
            .expect("telemetry test lock poisoned");

        telemetry::reset();

        let dir = TempDir::new()?;
        for index in 0..6 {
            fs::write(dir.path().join(format!("{index:03}.ppm")), vec![0u8; 4096])?;
        }

        let pipeline = ArchivePipeline::new(ArchiveConfig::default().with_max_workers(3));
        let (archive, stats) = pipeline.archive_directory(dir.path(), Vec::new())?;
        assert_eq!(stats.frames, 6);
        assert!(!archive.is_empty());

        let snapshot = telemetry::snapshot();
        assert!(snapshot.counter(tags::METRIC_ARCHIVE_RUN_COUNT).unwrap_or(0) >= 1);
        assert!(snapshot.counter(tags::METRIC_ARCHIVE_RECORD_COUNT).unwrap_or(0) >= 6);
        assert!(snapshot.counter(tags::METRIC_PRODUCER_FRAME_COUNT).unwrap_or(0) >= 6);
        assert!(
            snapshot
                .counter(tags::METRIC_COMPRESSION_APPLY_COUNT)
                .unwrap_or(0)
                >= 6
        );
        assert!(snapshot.counter(tags::METRIC_WORKER_TASK_COUNT).unwrap_or(0) >= 12);

        let bytes = snapshot
            .histogram(tags::METRIC_PRODUCER_BYTES)
            .ok_or("missing producer byte histogram")?;
        assert_eq!(bytes.max, 4096);
        assert!(snapshot.gauge(tags::METRIC_LIMITER_IN_USE).is_some());
        assert!(snapshot.gauge_peak(tags::METRIC_QUEUE_DEPTH).unwrap_or(0) >= 1);
        Ok(())
    }

    #[test]
    fn overflow_is_counted_separately() -> Result<(), Box<dyn std::error::Error>> {
        let _guard = TELEMETRY_TEST_MUTEX
            .lock()
            .expect("telemetry test lock poisoned");

        telemetry::reset();

        let noisy: Vec<u8> = (0..2048u32)
            .map(|value| (value.wrapping_mul(2_654_435_761) >> 13) as u8)
            .collect();
        let frame = RawFrame::new(3, noisy);
        let err = apply_compression(&ZlibCodec::default(), &frame, 16).unwrap_err();
        assert!(matches!(
            err,
            VzipError::CompressionOverflow {
                index: 3,
                limit: 16
            }
        ));

        let snapshot = telemetry::snapshot();
        assert_eq!(
            snapshot.counter(tags::METRIC_COMPRESSION_OVERFLOW_COUNT),
            Some(1)
        );
        Ok(())
    }

    #[test]
    fn reset_clears_collected_state() {
        let _guard = TELEMETRY_TEST_MUTEX
            .lock()
            .expect("telemetry test lock poisoned");

        telemetry::increment_counter(tags::METRIC_ARCHIVE_RUN_COUNT, 2);
        telemetry::reset();

        let snapshot = telemetry::snapshot();
        assert!(snapshot.counters.is_empty());
        assert!(snapshot.gauges.is_empty());
        assert!(snapshot.histograms.is_empty());
    }
}
