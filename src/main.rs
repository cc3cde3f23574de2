#![deny(unsafe_code)]

//! Convert coordinate-sorted BAM files back to paired FASTQ.

use anyhow::Result;
use bamfq_lib::bam_io::{read_bam_header, reference_sequences};
use bamfq_lib::engine::{self, EngineConfig};
use bamfq_lib::fastq::{OutputMode, OutputSink, SinkConfig};
use bamfq_lib::intervals::{parse_region, partition_references, DEFAULT_PARTITION_SIZE};
use bamfq_lib::logging::format_count;
use bamfq_lib::metrics::ConversionMetrics;
use bamfq_lib::shards::DEFAULT_SHARD_COUNT;
use bamfq_lib::source::BamSourceFactory;
use bamfq_lib::validation::{validate_file_exists, validate_nonzero};
use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::Parser;
use env_logger::Env;
use log::{info, warn};
use std::path::PathBuf;

/// Custom styles for CLI help output
const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Convert a coordinate-sorted BAM back to paired FASTQ.
///
/// The genome is split into fixed-size partitions processed concurrently.
/// Pairs local to one partition resolve in memory; reads whose mates lie in
/// other partitions spill to hash-selected disk shards and are paired in a
/// second parallel pass, so peak memory stays bounded regardless of how far
/// apart an aligner placed the two mates.
#[derive(Debug, Parser)]
#[command(
    name = "bamfq",
    version,
    styles = STYLES,
    about = "Convert coordinate-sorted BAM to paired FASTQ",
    long_about = r#"
Convert a coordinate-sorted, indexed BAM file back to paired FASTQ.

The genome is split into fixed-size partitions that are processed
concurrently. Read pairs contained in one partition are paired in memory and
stream straight to the output; pairs split across partitions are routed to
disk shards by a hash of the read name and paired in a second parallel pass.
Unmapped reads are handled in a final pass unless --skip-unmapped is given
or --region restricts the input.

EXAMPLES:

  # Whole-genome conversion on 8 threads, gzipped output
  bamfq -i sample.bam -o sample --threads 8

  # Restrict to one region, uncompressed output
  bamfq -i sample.bam -o subset --region chr2:1,000,000-2,000,000 --no-gzip

  # One output file pair per read group, with a metrics file
  bamfq -i sample.bam -o sample --output-mode per-read-group \
    --metrics sample.conversion_metrics.txt
"#
)]
struct Args {
    /// Input BAM file (coordinate-sorted, with a .bai or .csi index).
    #[arg(short = 'i', long = "input")]
    input: PathBuf,

    /// Output path prefix; mate and slot suffixes are appended
    /// (e.g. PREFIX.r1.fastq.gz).
    #[arg(short = 'o', long = "output")]
    output: PathBuf,

    /// Number of partition worker threads.
    #[arg(short = '@', short_alias = 't', long = "threads", default_value = "1")]
    threads: usize,

    /// Number of disk shards for cross-partition read pairs.
    #[arg(long = "shards", default_value_t = DEFAULT_SHARD_COUNT)]
    shards: usize,

    /// Partition width in bases.
    #[arg(long = "partition-size", default_value_t = DEFAULT_PARTITION_SIZE)]
    partition_size: u32,

    /// How output files are split: single, per-thread, or per-read-group.
    #[arg(long = "output-mode", default_value = "single")]
    output_mode: OutputMode,

    /// Restrict conversion to one region (CONTIG or CONTIG:START-END).
    ///
    /// Implies --skip-unmapped, since mates outside the region are not
    /// extracted.
    #[arg(short = 'L', long = "region")]
    region: Option<String>,

    /// Do not append /1 and /2 to read names.
    #[arg(long = "no-read-suffix")]
    no_read_suffix: bool,

    /// Write uncompressed FASTQ instead of gzip.
    #[arg(long = "no-gzip")]
    no_gzip: bool,

    /// Skip the final pass over unmapped reads.
    #[arg(long = "skip-unmapped")]
    skip_unmapped: bool,

    /// Write per-run conversion metrics to this TSV file.
    #[arg(short = 'M', long = "metrics")]
    metrics: Option<PathBuf>,

    /// Directory for shard spill files.
    ///
    /// If not specified, uses the system default temp directory.
    /// For best performance, use a fast SSD.
    #[arg(short = 'T', long = "tmp-dir")]
    tmp_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    validate_file_exists(&args.input, "Input BAM")?;
    validate_nonzero(args.threads, "threads")?;
    validate_nonzero(args.shards, "shards")?;

    let header = read_bam_header(&args.input)?;
    let refs = reference_sequences(&header)?;

    let intervals = match &args.region {
        Some(region) => vec![parse_region(region, &refs)?],
        None => partition_references(&refs, args.partition_size)?,
    };

    if args.region.is_some() && !args.skip_unmapped {
        warn!("--region restricts the input; skipping the unmapped pass");
    }
    let include_unmapped = args.region.is_none() && !args.skip_unmapped;

    let config = EngineConfig {
        threads: args.threads,
        shard_count: args.shards,
        temp_dir: args.tmp_dir.clone(),
        include_unmapped,
        ..EngineConfig::default()
    };

    let sink = OutputSink::new(SinkConfig {
        prefix: args.output.clone(),
        mode: args.output_mode,
        threads: args.threads,
        gzip: !args.no_gzip,
        mate_suffix: !args.no_read_suffix,
    })?;

    let factory = BamSourceFactory::new(args.input.clone());
    let summary = engine::run(&config, &factory, intervals, &sink)?;
    let counts = sink.finish()?;

    info!("Wrote {} read pairs", format_count(summary.total_pairs()));
    info!(
        "  {} local, {} reconciled across partitions, {} unmapped",
        format_count(summary.local_pairs),
        format_count(summary.remote_pairs),
        format_count(summary.unmapped_pairs)
    );
    info!("Wrote {} unpaired reads", format_count(counts.singletons));
    if summary.unmatched > 0 {
        warn!(
            "{} paired reads had no mate anywhere in the input",
            format_count(summary.unmatched)
        );
    }

    if let Some(path) = &args.metrics {
        ConversionMetrics::from_run(&summary, &counts).write(path)?;
        info!("Wrote conversion metrics to {}", path.display());
    }

    Ok(())
}
