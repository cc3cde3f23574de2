//! Shard reconciliation: phase-2 cross-partition pairing.
//!
//! Once every partition has drained and the shard set is finalized, each
//! shard is replayed start to end with its own [`PairCache`]. Both mates of a
//! remote pair hashed to the same shard during phase 1, so a single
//! sequential pass over the shard is guaranteed to meet every pair that
//! exists in the input. Shards share no state and are processed in parallel.

use crate::fastq::PairSink;
use crate::pair_cache::PairCache;
use crate::shards::FinalizedShards;
use anyhow::Result;
use log::{debug, warn};
use rayon::prelude::*;

/// Aggregate counters returned by [`reconcile_shards`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Pairs whose halves were seen by different partitions.
    pub remote_pairs: u64,
    /// Reads whose mate was never found anywhere in the dataset; emitted as
    /// singletons.
    pub unmatched: u64,
    /// Unpaired reads forwarded straight to the sink.
    pub unpaired: u64,
    /// Records dropped by the defensive re-check (secondary, supplementary,
    /// consensus).
    pub discarded: u64,
}

impl ReconcileOutcome {
    fn absorb(&mut self, other: Self) {
        self.remote_pairs += other.remote_pairs;
        self.unmatched += other.unmatched;
        self.unpaired += other.unpaired;
        self.discarded += other.discarded;
    }
}

/// Reconciles every shard, pairing reads split across partitions.
///
/// Safe to call only after all routing has stopped; [`FinalizedShards`]
/// encodes that barrier in the type. Shards are dispatched across the current
/// rayon pool.
pub fn reconcile_shards<S: PairSink + ?Sized>(
    shards: &FinalizedShards,
    sink: &S,
) -> Result<ReconcileOutcome> {
    let outcomes: Vec<ReconcileOutcome> = (0..shards.len())
        .into_par_iter()
        .map(|index| reconcile_one(shards, index, sink))
        .collect::<Result<_>>()?;

    let mut total = ReconcileOutcome::default();
    for outcome in outcomes {
        total.absorb(outcome);
    }
    if total.unmatched > 0 {
        warn!("{} reads could not be matched to a mate in any partition", total.unmatched);
    }
    Ok(total)
}

fn reconcile_one<S: PairSink + ?Sized>(
    shards: &FinalizedShards,
    index: usize,
    sink: &S,
) -> Result<ReconcileOutcome> {
    let mut cache = PairCache::new();
    let mut outcome = ReconcileOutcome::default();

    for result in shards.reader(index)? {
        let record = result?;

        // Should have been filtered during partition processing; re-checked
        // because emitting one of these would duplicate output.
        if record.consensus || record.flags.is_secondary_or_supplementary() {
            outcome.discarded += 1;
            continue;
        }

        if !record.flags.is_paired() {
            sink.write_singleton(record)?;
            outcome.unpaired += 1;
            continue;
        }

        if let Some(pair) = cache.offer(record) {
            sink.write_pair(index, pair)?;
            outcome.remote_pairs += 1;
        }
    }

    for record in cache.drain() {
        debug!(
            "Mate for read '{}' (shard {}) was never seen; emitting as unpaired",
            record.name_lossy(),
            index
        );
        sink.write_singleton(record)?;
        outcome.unmatched += 1;
    }

    Ok(outcome)
}
