//! Final pass over reads with no genomic position.
//!
//! Unmapped reads never enter the partition or shard machinery: there is no
//! interval to attribute them to. Instead a single sequential pass pairs them
//! by name with one cache, applying the same discard rules as the mapped
//! passes. This pass only makes sense when the whole genome was converted;
//! with a region restriction the mates of unmapped reads may not have been
//! extracted, so the caller skips it.

use crate::fastq::PairSink;
use crate::pair_cache::PairCache;
use crate::partition::check_supported;
use crate::record::ReadRecord;
use anyhow::Result;
use log::{debug, warn};

/// Counters returned by [`process_unmapped`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnmappedOutcome {
    /// Pairs formed from two positionless mates.
    pub pairs: u64,
    /// Unpaired positionless reads.
    pub unpaired: u64,
    /// Paired reads whose mate never appeared; emitted as singletons.
    pub unmatched: u64,
    /// Secondary, supplementary and consensus records discarded.
    pub discarded: u64,
}

/// Pairs all positionless records in one sequential pass.
pub fn process_unmapped<S: PairSink + ?Sized>(
    records: impl Iterator<Item = Result<ReadRecord>>,
    sink: &S,
) -> Result<UnmappedOutcome> {
    let mut cache = PairCache::new();
    let mut outcome = UnmappedOutcome::default();

    for result in records {
        let record = result?;
        check_supported(&record)?;

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
            sink.write_pair(0, pair)?;
            outcome.pairs += 1;
        }
    }

    for record in cache.drain() {
        debug!(
            "Mate for unmapped read '{}' was never seen; emitting as unpaired",
            record.name_lossy()
        );
        sink.write_singleton(record)?;
        outcome.unmatched += 1;
    }
    if outcome.unmatched > 0 {
        warn!("{} unmapped reads had no mate in the unmapped pass", outcome.unmatched);
    }

    Ok(outcome)
}
