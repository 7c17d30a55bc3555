use std::ffi::OsString;
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::error::ErrorKind;
use clap::{Args, CommandFactory, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use vzip_core::{
    ArchiveConfig, ArchivePipeline, ArchiveProgressSnapshot, ArchiveRunStats, FrameNaming,
    OversizePolicy,
};

#[derive(Parser)]
#[command(
    name = "vzip",
    version,
    about = "Parallel frame archiver",
    long_about = "Pack a directory of image frames into a .vzip archive of zlib records, \
                  and unpack or inspect existing archives.\n\n\
                  `vzip <DIR>` is shorthand for `vzip archive <DIR>` with default settings.",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    /// Log debug events to stderr (RUST_LOG overrides).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Frame directory to archive with default settings.
    input: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl Cli {
    /// Resolves the bare `vzip <DIR>` form to an `archive` command.
    fn into_command(self) -> Result<Commands, clap::Error> {
        match (self.command, self.input) {
            (Some(command), _) => Ok(command),
            (None, Some(input)) => ArchiveArgs::defaults_for(input).map(Commands::Archive),
            (None, None) => Err(Cli::command().error(
                ErrorKind::MissingRequiredArgument,
                "expected a frame directory or a subcommand",
            )),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Compress every frame of a directory into one archive.
    Archive(ArchiveArgs),
    /// Decompress every record of an archive into numbered frame files.
    Extract {
        /// Archive to read.
        input: PathBuf,

        /// Destination directory.
        #[arg(short, long, default_value = "frames")]
        output: PathBuf,

        /// File name prefix of extracted frames.
        #[arg(long, default_value = "frame")]
        prefix: String,

        /// File name suffix of extracted frames.
        #[arg(long, default_value = vzip_core::io::DEFAULT_FRAME_SUFFIX)]
        suffix: String,
    },
    /// Print the size and image dimensions of every record.
    List {
        /// Archive to read.
        input: PathBuf,
    },
}

#[derive(Args)]
struct ArchiveArgs {
    /// Directory holding the frame files.
    input: PathBuf,

    /// Destination archive path.
    #[arg(short, long, default_value = "video.vzip")]
    output: PathBuf,

    /// Maximum producer and consumer tasks running at once.
    #[arg(long, default_value_t = vzip_core::core::DEFAULT_MAX_WORKERS)]
    workers: usize,

    /// Raw frames allowed to wait for a consumer.
    #[arg(long, default_value_t = vzip_core::core::DEFAULT_QUEUE_CAPACITY)]
    queue_capacity: usize,

    /// Largest accepted frame (supports suffixes K/M/G).
    #[arg(long, default_value = "1M", value_parser = parse_size)]
    max_frame_size: usize,

    /// Largest compressed record (supports suffixes K/M/G).
    #[arg(long, default_value = "1M", value_parser = parse_size)]
    max_compressed_size: usize,

    /// File name suffix selecting frames.
    #[arg(long, default_value = vzip_core::io::DEFAULT_FRAME_SUFFIX)]
    suffix: String,

    /// Keep the first max-frame-size bytes of oversized frames instead of failing.
    #[arg(long, default_value_t = false)]
    truncate_oversized: bool,

    /// zlib compression level (0-9).
    #[arg(long, default_value_t = 9, value_parser = clap::value_parser!(u32).range(0..=9))]
    level: u32,

    /// Print live progress and a run summary to stderr.
    #[arg(long, default_value_t = false)]
    progress: bool,

    /// Progress refresh interval in milliseconds.
    #[arg(long, default_value_t = 250)]
    stats_interval_ms: u64,
}

impl ArchiveArgs {
    /// Archive arguments with every flag at its default.
    fn defaults_for(input: PathBuf) -> Result<Self, clap::Error> {
        #[derive(Parser)]
        struct Defaults {
            #[command(flatten)]
            args: ArchiveArgs,
        }

        let argv = [OsString::from("vzip"), OsString::from("--"), input.into_os_string()];
        Defaults::try_parse_from(argv).map(|defaults| defaults.args)
    }

    fn config(&self) -> ArchiveConfig {
        let policy = if self.truncate_oversized {
            OversizePolicy::Truncate
        } else {
            OversizePolicy::Reject
        };
        ArchiveConfig::default()
            .with_max_workers(self.workers)
            .with_queue_capacity(self.queue_capacity)
            .with_max_frame_bytes(self.max_frame_size)
            .with_max_compressed_bytes(self.max_compressed_size)
            .with_frame_suffix(self.suffix.clone())
            .with_compression_level(self.level)
            .with_oversize_policy(policy)
    }
}

fn main() {
    let started_at = Instant::now();
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let command = cli.into_command().unwrap_or_else(|error| error.exit());

    if let Err(error) = run(command, started_at) {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default_directive = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(command: Commands, started_at: Instant) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Archive(args) => {
            let interval = Duration::from_millis(args.stats_interval_ms.max(50));
            archive_command(
                &args.input,
                &args.output,
                args.config(),
                args.progress,
                interval,
                started_at,
            )?;
        }
        Commands::Extract {
            input,
            output,
            prefix,
            suffix,
        } => extract_command(&input, &output, &FrameNaming::new(prefix, suffix))?,
        Commands::List { input } => list_command(&input)?,
    }

    Ok(())
}

fn archive_command(
    input: &Path,
    output: &Path,
    config: ArchiveConfig,
    progress: bool,
    progress_interval: Duration,
    started_at: Instant,
) -> Result<(), Box<dyn std::error::Error>> {
    let pipeline = ArchivePipeline::new(config);

    // An unreadable input directory is reported, not treated as a crash.
    let sources = match pipeline.scan(input) {
        Ok(sources) => sources,
        Err(error) => {
            tracing::debug!(%error, "input directory scan failed");
            println!("An error has occurred");
            return Ok(());
        }
    };

    let stats = if progress {
        let stats = pipeline.archive_sources_to_path_with_progress(
            sources,
            output,
            progress_interval,
            print_progress,
        )?;
        eprintln!();
        stats
    } else {
        pipeline.archive_sources_to_path(sources, output)?
    };

    match stats.compression_ratio() {
        Some(ratio) => println!("Compression rate: {ratio:.2}%"),
        None => println!("Compression rate: n/a"),
    }
    println!("Time: {:.2} seconds", started_at.elapsed().as_secs_f64());

    if progress {
        print_summary(output, &stats);
    }
    Ok(())
}

fn print_progress(snapshot: ArchiveProgressSnapshot) {
    let percent = if snapshot.frames_total > 0 {
        snapshot.frames_compressed as f64 / snapshot.frames_total as f64 * 100.0
    } else {
        100.0
    };
    eprint!(
        "\r\x1b[2K[{percent:6.2}%] read {}/{} | compressed {}/{} | in {} | out {} | active {}/{} | {}",
        snapshot.frames_read,
        snapshot.frames_total,
        snapshot.frames_compressed,
        snapshot.frames_total,
        format_bytes(snapshot.input_bytes_read),
        format_bytes(snapshot.output_bytes_compressed),
        snapshot.runtime.active,
        snapshot.runtime.workers.len(),
        format_duration(snapshot.elapsed),
    );
    let _ = io::stderr().flush();
}

fn print_summary(output: &Path, stats: &ArchiveRunStats) {
    eprintln!("archive complete");
    eprintln!("  output: {}", output.display());
    eprintln!("  frames: {}", stats.frames);
    eprintln!("  input bytes: {}", format_bytes(stats.input_bytes_total));
    eprintln!("  record bytes: {}", format_bytes(stats.output_bytes_total));
    eprintln!("  archive bytes: {}", format_bytes(stats.archive_bytes));
    eprintln!("  elapsed: {}", format_duration(stats.elapsed));
    eprintln!(
        "  peak active tasks: {} | peak queue depth: {}",
        stats.peak_active_workers, stats.peak_queue_depth
    );
    for worker in &stats.workers {
        eprintln!(
            "    w{:02} tasks {:>6} | busy {:>8} | idle {:>8} | util {:>6.2}%",
            worker.worker_id,
            worker.tasks_completed,
            format_duration(worker.busy),
            format_duration(worker.idle),
            worker.utilization * 100.0,
        );
    }
}

fn extract_command(
    input: &Path,
    output: &Path,
    naming: &FrameNaming,
) -> Result<(), Box<dyn std::error::Error>> {
    let pipeline = ArchivePipeline::new(ArchiveConfig::default());
    let stats = pipeline.extract_to_directory(input, output, naming)?;

    println!("extract complete");
    println!("  archive: {}", input.display());
    println!("  output: {}", output.display());
    println!("  records: {}", stats.records);
    println!("  archive bytes: {}", format_bytes(stats.input_bytes_total));
    println!("  restored bytes: {}", format_bytes(stats.output_bytes_total));
    println!("  elapsed: {}", format_duration(stats.elapsed));
    Ok(())
}

fn list_command(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let pipeline = ArchivePipeline::new(ArchiveConfig::default());
    let records = pipeline.inspect_archive(BufReader::new(File::open(input)?))?;

    println!("{:>7}  {:>12}  {:>12}  dimensions", "record", "compressed", "original");
    for record in &records {
        let dimensions = record
            .dimensions
            .map(|(width, height)| format!("{width}x{height}"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:>7}  {:>12}  {:>12}  {dimensions}",
            record.index,
            format_bytes(record.compressed_len as u64),
            format_bytes(record.original_len as u64),
        );
    }

    let compressed: u64 = records.iter().map(|record| record.compressed_len as u64).sum();
    let original: u64 = records.iter().map(|record| record.original_len as u64).sum();
    println!(
        "{} records | {} compressed | {} original",
        records.len(),
        format_bytes(compressed),
        format_bytes(original)
    );
    Ok(())
}

/// Parses `512`, `64k`, `1M`, `2GiB` and similar binary sizes.
fn parse_size(value: &str) -> Result<usize, String> {
    let text = value.trim();
    let digits_end = text
        .char_indices()
        .find(|(_, ch)| !ch.is_ascii_digit())
        .map_or(text.len(), |(position, _)| position);
    let (digits, unit) = text.split_at(digits_end);
    if digits.is_empty() {
        return Err(format!("invalid size: '{value}'"));
    }

    let shift = match unit.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 0,
        "K" | "KB" | "KIB" => 10,
        "M" | "MB" | "MIB" => 20,
        "G" | "GB" | "GIB" => 30,
        other => return Err(format!("unknown size unit '{other}' in '{value}'")),
    };

    digits
        .parse::<usize>()
        .ok()
        .and_then(|count| count.checked_mul(1usize << shift))
        .ok_or_else(|| format!("size out of range: '{value}'"))
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 3] = ["KiB", "MiB", "GiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }

    let exponent = ((bytes.ilog2() / 10) as usize).min(UNITS.len());
    let scaled = bytes as f64 / (1u64 << (10 * exponent)) as f64;
    format!("{scaled:.2} {}", UNITS[exponent - 1])
}

fn format_duration(duration: Duration) -> String {
    let seconds = duration.as_secs();
    if seconds >= 60 {
        format!("{:02}:{:02}", seconds / 60, seconds % 60)
    } else {
        format!("{:.3}s", duration.as_secs_f64())
    }
}
