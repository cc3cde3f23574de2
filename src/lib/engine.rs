//! Two-phase conversion engine.
//!
//! Phase 1 drains a queue of genomic partitions across a pool of worker
//! threads; pairs local to one partition stream straight to the sink and
//! cross-partition reads spill to hash-selected shards. Finalizing the shard
//! set is the barrier between phases. Phase 2 replays each shard in parallel
//! to pair the remainder, and an optional sequential pass handles reads with
//! no placement at all.

use crate::fastq::PairSink;
use crate::intervals::GenomicInterval;
use crate::logging::OperationTimer;
use crate::partition::{process_partition, PartitionOutcome};
use crate::progress::ProgressTracker;
use crate::reconcile::reconcile_shards;
use crate::shards::{ShardRouter, DEFAULT_SHARD_COUNT};
use crate::source::{RecordSource, SourceFactory};
use crate::unmapped::process_unmapped;
use anyhow::{anyhow, Context, Result};
use crossbeam_queue::SegQueue;
use log::{debug, info};
use std::path::PathBuf;

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of partition worker threads.
    pub threads: usize,
    /// Number of disk shards for cross-partition reads.
    pub shard_count: usize,
    /// Directory for shard spill files; `None` uses the system temp dir.
    pub temp_dir: Option<PathBuf>,
    /// Whether to run the final pass over fully unmapped reads.
    pub include_unmapped: bool,
    /// Progress log interval in records.
    pub progress_interval: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threads: 1,
            shard_count: DEFAULT_SHARD_COUNT,
            temp_dir: None,
            include_unmapped: true,
            progress_interval: 1_000_000,
        }
    }
}

/// Aggregate counters for one engine run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Partitions processed.
    pub partitions: u64,
    /// Pairs resolved inside a single partition.
    pub local_pairs: u64,
    /// Reads spilled to shards during phase 1.
    pub remote_routed: u64,
    /// Reads that expected a local mate which never arrived.
    pub partition_leftovers: u64,
    /// Pairs resolved during shard reconciliation.
    pub remote_pairs: u64,
    /// Unpaired reads emitted as singletons.
    pub unpaired_reads: u64,
    /// Paired reads whose mate was never found anywhere.
    pub unmatched: u64,
    /// Overlap artifacts skipped at partition boundaries.
    pub skipped: u64,
    /// Secondary, supplementary and consensus records discarded.
    pub discarded: u64,
    /// Pairs formed in the unmapped pass.
    pub unmapped_pairs: u64,
}

impl RunSummary {
    /// Total pairs written across all phases.
    #[must_use]
    pub fn total_pairs(&self) -> u64 {
        self.local_pairs + self.remote_pairs + self.unmapped_pairs
    }

    fn absorb_partition(&mut self, outcome: PartitionOutcome) {
        self.partitions += 1;
        self.local_pairs += outcome.local_pairs;
        self.remote_routed += outcome.remote + outcome.leftovers;
        self.partition_leftovers += outcome.leftovers;
        self.unpaired_reads += outcome.unpaired;
        self.skipped += outcome.skipped;
        self.discarded += outcome.discarded;
    }
}

/// Runs the full conversion over the given partitions.
///
/// `factory` opens one source per worker thread; `sink` receives every pair
/// and singleton. Returns aggregate counters for the caller to log or write
/// as metrics.
pub fn run<F, S>(
    config: &EngineConfig,
    factory: &F,
    intervals: Vec<GenomicInterval>,
    sink: &S,
) -> Result<RunSummary>
where
    F: SourceFactory,
    S: PairSink + ?Sized,
{
    let router = ShardRouter::new(config.shard_count, config.temp_dir.as_deref())?;
    let progress =
        ProgressTracker::new("Processed records").with_interval(config.progress_interval);

    let partition_count = intervals.len();
    let queue = SegQueue::new();
    for interval in intervals {
        queue.push(interval);
    }

    let timer = OperationTimer::new(&format!(
        "Pairing reads across {partition_count} partitions on {} threads",
        config.threads
    ));

    let mut summary = RunSummary::default();
    let worker_outcomes = run_partition_phase(config, factory, &queue, &router, sink, &progress)?;
    for outcome in worker_outcomes {
        summary.absorb_partition(outcome);
    }
    progress.log_final();

    // All routing has stopped; finalize to flush writers and open the shard
    // set for reading.
    let shards = router.finalize()?;
    info!(
        "Phase 1 complete: {} local pairs, {} reads routed to {} shards",
        summary.local_pairs,
        summary.remote_routed,
        shards.len()
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.threads)
        .build()
        .context("Failed to build reconciliation thread pool")?;
    let reconcile = pool.install(|| reconcile_shards(&shards, sink))?;
    summary.remote_pairs = reconcile.remote_pairs;
    summary.unmatched += reconcile.unmatched;
    summary.unpaired_reads += reconcile.unpaired;
    summary.discarded += reconcile.discarded;

    if config.include_unmapped {
        let mut source = factory.open()?;
        let outcome = process_unmapped(source.unmapped_records()?, sink)?;
        summary.unmapped_pairs = outcome.pairs;
        summary.unpaired_reads += outcome.unpaired;
        summary.unmatched += outcome.unmatched;
        summary.discarded += outcome.discarded;
    } else {
        debug!("Skipping unmapped pass");
    }

    timer.log_completion(progress.count());
    Ok(summary)
}

/// Phase 1: workers drain the partition queue until it is empty.
fn run_partition_phase<F, S>(
    config: &EngineConfig,
    factory: &F,
    queue: &SegQueue<GenomicInterval>,
    router: &ShardRouter,
    sink: &S,
    progress: &ProgressTracker,
) -> Result<Vec<PartitionOutcome>>
where
    F: SourceFactory,
    S: PairSink + ?Sized,
{
    let threads = config.threads.max(1);

    std::thread::scope(|scope| {
        let mut handles = Vec::with_capacity(threads);
        for worker_id in 0..threads {
            handles.push(scope.spawn(move || -> Result<Vec<PartitionOutcome>> {
                let mut source = factory.open()?;
                let mut outcomes = Vec::new();
                while let Some(interval) = queue.pop() {
                    debug!("Worker {worker_id} processing {interval}");
                    let records = source.records_overlapping(&interval)?;
                    let outcome =
                        process_partition(&interval, records, router, sink, worker_id, progress)?;
                    outcomes.push(outcome);
                }
                Ok(outcomes)
            }));
        }

        let mut all = Vec::new();
        for handle in handles {
            let outcomes =
                handle.join().map_err(|_| anyhow!("partition worker thread panicked"))??;
            all.extend(outcomes);
        }
        Ok(all)
    })
}
