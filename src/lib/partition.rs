//! Partition worker: phase-1 local pairing over one genomic interval.
//!
//! Each worker scans the records overlapping one interval. Pairs whose two
//! halves both lie inside the interval resolve locally through a
//! [`PairCache`]; reads whose mate lies elsewhere are routed to the shard
//! files for phase-2 reconciliation. A record whose own alignment start falls
//! outside the interval was yielded by an overlapping query and belongs to a
//! neighbouring partition, so it is skipped to avoid double-processing.

use crate::errors::BamfqError;
use crate::fastq::PairSink;
use crate::intervals::GenomicInterval;
use crate::pair_cache::PairCache;
use crate::progress::ProgressTracker;
use crate::record::{ReadPair, ReadRecord};
use crate::shards::ShardRouter;
use anyhow::Result;
use log::{debug, warn};

/// Per-partition counters returned by [`process_partition`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartitionOutcome {
    /// Pairs resolved within this partition.
    pub local_pairs: u64,
    /// Reads routed to shards because their mate lies in another partition.
    pub remote: u64,
    /// Reads not flagged as paired, emitted directly as singletons.
    pub unpaired: u64,
    /// Overlap artifacts skipped because their start lies outside the interval.
    pub skipped: u64,
    /// Secondary, supplementary and consensus records discarded.
    pub discarded: u64,
    /// Reads whose mate was expected locally but never arrived; rerouted to
    /// shards. Expected to be rare.
    pub leftovers: u64,
}

/// Processes all records overlapping one partition.
///
/// Fatal conditions (a hard-clipped record the engine cannot re-emit) abort
/// with an error; every other anomaly is counted and recovered through the
/// remote path.
pub fn process_partition<S: PairSink + ?Sized>(
    interval: &GenomicInterval,
    records: impl Iterator<Item = Result<ReadRecord>>,
    router: &ShardRouter,
    sink: &S,
    worker_id: usize,
    progress: &ProgressTracker,
) -> Result<PartitionOutcome> {
    let mut cache = PairCache::new();
    let mut outcome = PartitionOutcome::default();

    for result in records {
        let record = result?;
        progress.log_if_needed(1);
        check_supported(&record)?;

        if record.consensus || record.flags.is_secondary_or_supplementary() {
            outcome.discarded += 1;
            continue;
        }

        // Overlapping interval scans yield records owned by the neighbouring
        // partition; only the record's own start decides ownership.
        let owned = match (record.ref_id, record.pos) {
            (Some(ref_id), Some(pos)) => interval.contains(ref_id, pos),
            _ => false,
        };
        if !owned {
            outcome.skipped += 1;
            continue;
        }

        if !record.flags.is_paired() {
            sink.write_singleton(record)?;
            outcome.unpaired += 1;
            continue;
        }

        if let Some(mate) = cache.remove_mate(&record.name) {
            sink.write_pair(worker_id, ReadPair::from_mates(record, mate))?;
            outcome.local_pairs += 1;
        } else if mate_is_local(&record, interval) {
            cache.insert(record);
        } else {
            router.route(&record)?;
            outcome.remote += 1;
        }
    }

    // Reads still cached expected a local mate that never arrived; recover
    // them through the remote path rather than dropping them.
    for record in cache.drain() {
        debug!(
            "Read '{}' in {} never met its local mate; rerouting through shards",
            record.name_lossy(),
            interval
        );
        router.route(&record)?;
        outcome.leftovers += 1;
    }
    if outcome.leftovers > 0 {
        warn!(
            "{} reads in {} expected a local mate that never arrived; rerouted to shards",
            outcome.leftovers, interval
        );
    }

    Ok(outcome)
}

/// Rejects records whose structure cannot be re-emitted as FASTQ.
pub(crate) fn check_supported(record: &ReadRecord) -> Result<()> {
    if record.has_hard_clip {
        return Err(BamfqError::UnsupportedRecord {
            name: record.name_lossy(),
            reason: "hard-clipped alignments cannot be restored to their original bases"
                .to_string(),
        }
        .into());
    }
    Ok(())
}

fn mate_is_local(record: &ReadRecord, interval: &GenomicInterval) -> bool {
    match (record.mate_ref_id, record.mate_pos) {
        (Some(ref_id), Some(pos)) => interval.contains(ref_id, pos),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::BamfqError;
    use crate::testutil::{CollectingSink, RecordBuilder};
    use bstr::BString;

    fn interval() -> GenomicInterval {
        GenomicInterval { ref_id: 0, name: BString::from("chr1"), start: 1, end: 10_000 }
    }

    fn run(
        records: Vec<ReadRecord>,
        shard_count: usize,
    ) -> (Result<PartitionOutcome>, CollectingSink, ShardRouter) {
        let router = ShardRouter::new(shard_count, None).unwrap();
        let sink = CollectingSink::default();
        let progress = ProgressTracker::new("Processed records");
        let outcome = process_partition(
            &interval(),
            records.into_iter().map(Ok),
            &router,
            &sink,
            0,
            &progress,
        );
        (outcome, sink, router)
    }

    #[test]
    fn test_both_mates_local_pair_with_no_shard_traffic() {
        let r1 = RecordBuilder::new("q").paired(true).at(0, 100).mate_at(0, 500).build();
        let r2 = RecordBuilder::new("q").paired(false).at(0, 500).mate_at(0, 100).build();

        let (outcome, sink, router) = run(vec![r1, r2], 4);
        let outcome = outcome.unwrap();

        assert_eq!(outcome.local_pairs, 1);
        assert_eq!(outcome.remote, 0);
        assert_eq!(router.routed(), 0);
        assert_eq!(sink.pairs().len(), 1);
    }

    #[test]
    fn test_remote_mate_routed_to_shard() {
        let record = RecordBuilder::new("q").paired(true).at(0, 100).mate_at(3, 999).build();

        let (outcome, sink, router) = run(vec![record], 4);
        let outcome = outcome.unwrap();

        assert_eq!(outcome.remote, 1);
        assert_eq!(router.routed(), 1);
        assert!(sink.pairs().is_empty());
    }

    #[test]
    fn test_mate_on_same_contig_but_outside_interval_is_remote() {
        let record = RecordBuilder::new("q").paired(true).at(0, 100).mate_at(0, 50_000).build();
        let (outcome, _, router) = run(vec![record], 4);
        assert_eq!(outcome.unwrap().remote, 1);
        assert_eq!(router.routed(), 1);
    }

    #[test]
    fn test_boundary_artifact_skipped() {
        // Overlaps the interval but starts before it: owned by the previous partition
        let record = RecordBuilder::new("q").paired(true).at(0, 20_000).mate_at(0, 100).build();
        let (outcome, sink, router) = run(vec![record], 4);
        let outcome = outcome.unwrap();

        assert_eq!(outcome.skipped, 1);
        assert_eq!(router.routed(), 0);
        assert!(sink.pairs().is_empty());
        assert!(sink.singletons().is_empty());
    }

    #[test]
    fn test_unpaired_read_emitted_as_singleton() {
        let record = RecordBuilder::new("frag").at(0, 100).build();
        let (outcome, sink, _) = run(vec![record], 4);
        assert_eq!(outcome.unwrap().unpaired, 1);
        assert_eq!(sink.singletons().len(), 1);
    }

    #[test]
    fn test_consensus_and_secondary_discarded() {
        let consensus = RecordBuilder::new("c").paired(true).at(0, 100).consensus().build();
        let secondary =
            RecordBuilder::new("s").paired(true).at(0, 200).mate_at(0, 300).secondary().build();

        let (outcome, sink, router) = run(vec![consensus, secondary], 4);
        assert_eq!(outcome.unwrap().discarded, 2);
        assert_eq!(router.routed(), 0);
        assert!(sink.pairs().is_empty());
    }

    #[test]
    fn test_hard_clip_is_fatal() {
        let record =
            RecordBuilder::new("hc").paired(true).at(0, 100).mate_at(0, 200).hard_clipped().build();
        let (outcome, _, _) = run(vec![record], 4);
        let err = outcome.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BamfqError>(),
            Some(BamfqError::UnsupportedRecord { .. })
        ));
    }

    #[test]
    fn test_leftover_local_read_rerouted() {
        // Claims its mate is local, but the mate never appears in the scan
        let record = RecordBuilder::new("lost").paired(true).at(0, 100).mate_at(0, 900).build();
        let (outcome, sink, router) = run(vec![record], 4);
        let outcome = outcome.unwrap();

        assert_eq!(outcome.local_pairs, 0);
        assert_eq!(outcome.leftovers, 1);
        assert_eq!(router.routed(), 1);
        assert!(sink.singletons().is_empty());
    }
}
