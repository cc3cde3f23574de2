//! Test helpers: record construction and in-memory sources/sinks.
//!
//! Everything in here exists so the pairing engine can be exercised without
//! touching a BAM file. `RecordBuilder` produces [`ReadRecord`]s with sensible
//! defaults, `CollectingSink` captures output in memory, and `MemorySource`
//! emulates the overlap semantics of an indexed query.

#![allow(clippy::missing_panics_doc)]

use crate::fastq::PairSink;
use crate::intervals::GenomicInterval;
use crate::record::{ReadFlags, ReadPair, ReadRecord};
use crate::source::{RecordIter, RecordSource, SourceFactory};
use anyhow::Result;
use bstr::BString;
use parking_lot::Mutex;

/// Builder for test records. Defaults to an unpaired, forward-strand read
/// with eight bases at quality 30 and no placement.
pub struct RecordBuilder {
    record: ReadRecord,
    quals: Option<Vec<u8>>,
}

impl RecordBuilder {
    /// Starts a builder for a read with the given name.
    #[must_use]
    pub fn new(name: impl AsRef<[u8]>) -> Self {
        Self {
            record: ReadRecord {
                name: BString::from(name.as_ref()),
                flags: ReadFlags::new(0),
                ref_id: None,
                pos: None,
                mate_ref_id: None,
                mate_pos: None,
                bases: b"ACGTACGT".to_vec(),
                quals: Vec::new(),
                read_group: None,
                consensus: false,
                has_hard_clip: false,
            },
            quals: None,
        }
    }

    /// Marks the read as paired; `first` selects first-of-pair vs last-of-pair.
    #[must_use]
    pub fn paired(mut self, first: bool) -> Self {
        let mate_bit = if first { ReadFlags::FIRST_OF_PAIR } else { ReadFlags::LAST_OF_PAIR };
        self.record.flags = ReadFlags::new(self.record.flags.bits() | ReadFlags::PAIRED | mate_bit);
        self
    }

    /// Places the read at a 1-based position on the given reference.
    #[must_use]
    pub fn at(mut self, ref_id: u32, pos: u32) -> Self {
        self.record.ref_id = Some(ref_id);
        self.record.pos = Some(pos);
        self
    }

    /// Records the mate's placement.
    #[must_use]
    pub fn mate_at(mut self, ref_id: u32, pos: u32) -> Self {
        self.record.mate_ref_id = Some(ref_id);
        self.record.mate_pos = Some(pos);
        self
    }

    /// Strips placement and sets the unmapped flag.
    #[must_use]
    pub fn unmapped(mut self) -> Self {
        self.record.flags = ReadFlags::new(self.record.flags.bits() | ReadFlags::UNMAPPED);
        self.record.ref_id = None;
        self.record.pos = None;
        self
    }

    /// Sets the reverse-strand flag.
    #[must_use]
    pub fn reverse(mut self) -> Self {
        self.record.flags = ReadFlags::new(self.record.flags.bits() | ReadFlags::REVERSE);
        self
    }

    /// Sets the secondary-alignment flag.
    #[must_use]
    pub fn secondary(mut self) -> Self {
        self.record.flags = ReadFlags::new(self.record.flags.bits() | ReadFlags::SECONDARY);
        self
    }

    /// Sets the supplementary-alignment flag.
    #[must_use]
    pub fn supplementary(mut self) -> Self {
        self.record.flags = ReadFlags::new(self.record.flags.bits() | ReadFlags::SUPPLEMENTARY);
        self
    }

    /// Marks the record as a synthetic consensus read.
    #[must_use]
    pub fn consensus(mut self) -> Self {
        self.record.consensus = true;
        self
    }

    /// Marks the record as hard-clipped.
    #[must_use]
    pub fn hard_clipped(mut self) -> Self {
        self.record.has_hard_clip = true;
        self
    }

    /// Replaces the default bases.
    #[must_use]
    pub fn bases(mut self, bases: &str) -> Self {
        self.record.bases = bases.as_bytes().to_vec();
        self
    }

    /// Replaces the default qualities.
    #[must_use]
    pub fn quals(mut self, quals: Vec<u8>) -> Self {
        self.quals = Some(quals);
        self
    }

    /// Attaches a read group.
    #[must_use]
    pub fn read_group(mut self, rg: &str) -> Self {
        self.record.read_group = Some(BString::from(rg));
        self
    }

    /// Finalizes the record.
    #[must_use]
    pub fn build(mut self) -> ReadRecord {
        self.record.quals = self.quals.unwrap_or_else(|| vec![30; self.record.bases.len()]);
        self.record
    }
}

/// Sink capturing everything written to it.
#[derive(Default)]
pub struct CollectingSink {
    pairs: Mutex<Vec<ReadPair>>,
    singletons: Mutex<Vec<ReadRecord>>,
}

impl CollectingSink {
    /// All pairs written so far.
    #[must_use]
    pub fn pairs(&self) -> Vec<ReadPair> {
        self.pairs.lock().clone()
    }

    /// All singletons written so far.
    #[must_use]
    pub fn singletons(&self) -> Vec<ReadRecord> {
        self.singletons.lock().clone()
    }
}

impl PairSink for CollectingSink {
    fn write_pair(&self, _worker_id: usize, pair: ReadPair) -> Result<()> {
        self.pairs.lock().push(pair);
        Ok(())
    }

    fn write_singleton(&self, record: ReadRecord) -> Result<()> {
        self.singletons.lock().push(record);
        Ok(())
    }
}

/// In-memory record source emulating indexed overlap queries.
pub struct MemorySource {
    records: Vec<ReadRecord>,
}

impl RecordSource for MemorySource {
    fn records_overlapping(&mut self, interval: &GenomicInterval) -> Result<RecordIter<'_>> {
        let interval = interval.clone();
        Ok(Box::new(
            self.records
                .iter()
                .filter(move |r| overlaps(r, &interval))
                .cloned()
                .map(Ok)
                .collect::<Vec<_>>()
                .into_iter(),
        ))
    }

    fn unmapped_records(&mut self) -> Result<RecordIter<'_>> {
        Ok(Box::new(
            self.records
                .iter()
                .filter(|r| r.pos.is_none())
                .cloned()
                .map(Ok)
                .collect::<Vec<_>>()
                .into_iter(),
        ))
    }
}

/// A record overlaps an interval when any of its bases land inside it, the
/// way an index query would report it.
fn overlaps(record: &ReadRecord, interval: &GenomicInterval) -> bool {
    match (record.ref_id, record.pos) {
        (Some(ref_id), Some(pos)) => {
            let len = record.bases.len().max(1) as u32;
            let end = pos + len - 1;
            ref_id == interval.ref_id && pos <= interval.end && end >= interval.start
        }
        _ => false,
    }
}

/// Factory handing each worker a clone of one fixed record set.
pub struct MemorySourceFactory {
    records: Vec<ReadRecord>,
}

impl MemorySourceFactory {
    /// Creates a factory over the given records.
    #[must_use]
    pub fn new(records: Vec<ReadRecord>) -> Self {
        Self { records }
    }
}

impl SourceFactory for MemorySourceFactory {
    type Source = MemorySource;

    fn open(&self) -> Result<MemorySource> {
        Ok(MemorySource { records: self.records.clone() })
    }
}
