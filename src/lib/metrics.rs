//! Conversion run metrics.

use crate::engine::RunSummary;
use crate::fastq::SinkCounts;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One row of per-run conversion metrics, written as TSV.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionMetrics {
    /// Genomic partitions processed.
    pub partitions: u64,
    /// Pairs resolved inside a single partition.
    pub local_pairs: u64,
    /// Pairs resolved by shard reconciliation.
    pub remote_pairs: u64,
    /// Pairs formed in the unmapped pass.
    pub unmapped_pairs: u64,
    /// Total pairs written.
    pub total_pairs: u64,
    /// Reads spilled to shards during the partition phase.
    pub reads_routed: u64,
    /// Reads that expected a local mate which never arrived in its partition.
    pub partition_leftovers: u64,
    /// Unpaired reads written to the unpaired stream.
    pub unpaired_reads: u64,
    /// Paired reads whose mate was never found in the input.
    pub unmatched_reads: u64,
    /// Boundary overlap artifacts skipped.
    pub skipped_records: u64,
    /// Secondary, supplementary and consensus records discarded.
    pub discarded_records: u64,
}

impl ConversionMetrics {
    /// Assembles the metrics row from engine and sink counters.
    #[must_use]
    pub fn from_run(summary: &RunSummary, counts: &SinkCounts) -> Self {
        Self {
            partitions: summary.partitions,
            local_pairs: summary.local_pairs,
            remote_pairs: summary.remote_pairs,
            unmapped_pairs: summary.unmapped_pairs,
            total_pairs: summary.total_pairs(),
            reads_routed: summary.remote_routed,
            partition_leftovers: summary.partition_leftovers,
            unpaired_reads: counts.singletons,
            unmatched_reads: summary.unmatched,
            skipped_records: summary.skipped,
            discarded_records: summary.discarded,
        }
    }

    /// Writes this row to a TSV file with a header line.
    pub fn write(&self, path: &Path) -> Result<()> {
        fgoxide::io::DelimFile::default()
            .write_tsv(&path, vec![self.clone()])
            .with_context(|| format!("Failed to write metrics: {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fgoxide::io::DelimFile;
    use tempfile::TempDir;

    #[test]
    fn test_from_run_totals() {
        let summary = RunSummary {
            partitions: 4,
            local_pairs: 10,
            remote_pairs: 3,
            unmapped_pairs: 1,
            remote_routed: 7,
            partition_leftovers: 1,
            unmatched: 2,
            skipped: 5,
            discarded: 6,
            unpaired_reads: 0,
        };
        let counts = SinkCounts { pairs: 14, singletons: 4, paired_singletons: 2 };

        let metrics = ConversionMetrics::from_run(&summary, &counts);
        assert_eq!(metrics.total_pairs, 14);
        assert_eq!(metrics.unpaired_reads, 4);
        assert_eq!(metrics.unmatched_reads, 2);
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("metrics.txt");

        let metrics = ConversionMetrics {
            partitions: 2,
            local_pairs: 100,
            total_pairs: 100,
            ..ConversionMetrics::default()
        };
        metrics.write(&path).unwrap();

        let rows: Vec<ConversionMetrics> = DelimFile::default().read_tsv(&path).unwrap();
        assert_eq!(rows, vec![metrics]);
    }
}
