//! Record source abstraction and the indexed-BAM implementation.
//!
//! The engine consumes [`ReadRecord`] streams through two small traits so the
//! pairing machinery can be driven by an in-memory source in tests. Each
//! worker thread opens its own [`RecordSource`] via the shared
//! [`SourceFactory`]; sources are never shared across threads.

use crate::bam_io::open_indexed_bam;
use crate::intervals::GenomicInterval;
use crate::record::{ReadFlags, ReadRecord};
use anyhow::{bail, Context, Result};
use bstr::BString;
use noodles::bam;
use noodles::core::{Position, Region};
use noodles::sam::alignment::record::cigar::op::Kind;
use noodles::sam::alignment::record::data::field::Tag;
use noodles::sam::alignment::record_buf::data::field::Value;
use noodles::sam::alignment::record_buf::RecordBuf;
use noodles::sam::Header;
use std::fs::File;
use std::path::PathBuf;

/// Consensus-depth tag written by consensus callers; its presence marks a
/// record as synthetic rather than sequenced.
const CONSENSUS_DEPTH_TAG: Tag = Tag::new(b'c', b'D');

/// A stream of records from one source handle.
pub type RecordIter<'a> = Box<dyn Iterator<Item = Result<ReadRecord>> + 'a>;

/// One worker's handle onto the input.
pub trait RecordSource {
    /// All records overlapping the given interval, in file order.
    fn records_overlapping(&mut self, interval: &GenomicInterval) -> Result<RecordIter<'_>>;

    /// All records with no genomic placement.
    fn unmapped_records(&mut self) -> Result<RecordIter<'_>>;
}

/// Thread-safe opener handing each worker its own [`RecordSource`].
pub trait SourceFactory: Sync {
    /// The source type produced.
    type Source: RecordSource;

    /// Opens a fresh source handle.
    fn open(&self) -> Result<Self::Source>;
}

/// Factory opening indexed readers onto one BAM file.
pub struct BamSourceFactory {
    path: PathBuf,
}

impl BamSourceFactory {
    /// Creates a factory for the given coordinate-sorted, indexed BAM.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl SourceFactory for BamSourceFactory {
    type Source = BamRecordSource;

    fn open(&self) -> Result<BamRecordSource> {
        let (reader, header) = open_indexed_bam(&self.path)?;
        Ok(BamRecordSource { reader, header })
    }
}

/// Indexed BAM reader yielding engine records.
pub struct BamRecordSource {
    reader: bam::io::IndexedReader<noodles::bgzf::Reader<File>>,
    header: Header,
}

impl RecordSource for BamRecordSource {
    fn records_overlapping(&mut self, interval: &GenomicInterval) -> Result<RecordIter<'_>> {
        let start = Position::try_from(interval.start as usize)
            .with_context(|| format!("Invalid interval start in {interval}"))?;
        let end = Position::try_from(interval.end as usize)
            .with_context(|| format!("Invalid interval end in {interval}"))?;
        let region = Region::new(interval.name.clone(), start..=end);

        let header = &self.header;
        let query = self
            .reader
            .query(header, &region)
            .with_context(|| format!("Failed to query BAM for {interval}"))?;

        Ok(Box::new(query.map(move |result| {
            let record = result.context("Failed to read BAM record")?;
            let buf = RecordBuf::try_from_alignment_record(header, &record)
                .context("Failed to decode BAM record")?;
            read_record_from_buf(&buf)
        })))
    }

    fn unmapped_records(&mut self) -> Result<RecordIter<'_>> {
        let header = &self.header;
        let query = self
            .reader
            .query_unmapped()
            .context("Failed to query BAM for unmapped records")?;

        Ok(Box::new(query.map(move |result| {
            let record = result.context("Failed to read BAM record")?;
            let buf = RecordBuf::try_from_alignment_record(header, &record)
                .context("Failed to decode BAM record")?;
            read_record_from_buf(&buf)
        })))
    }
}

/// Converts a decoded alignment record into the engine's representation.
fn read_record_from_buf(buf: &RecordBuf) -> Result<ReadRecord> {
    let name = match buf.name() {
        Some(name) => BString::from(name),
        None => bail!("BAM record is missing a read name"),
    };

    let read_group = match buf.data().get(&Tag::READ_GROUP) {
        Some(Value::String(rg)) => Some(rg.clone()),
        _ => None,
    };
    let consensus = buf.data().get(&CONSENSUS_DEPTH_TAG).is_some();
    let has_hard_clip =
        buf.cigar().as_ref().iter().any(|op| op.kind() == Kind::HardClip);

    Ok(ReadRecord {
        name,
        flags: ReadFlags::new(buf.flags().bits()),
        ref_id: buf.reference_sequence_id().map(|id| id as u32),
        pos: buf.alignment_start().map(|p| p.get() as u32),
        mate_ref_id: buf.mate_reference_sequence_id().map(|id| id as u32),
        mate_pos: buf.mate_alignment_start().map(|p| p.get() as u32),
        bases: buf.sequence().as_ref().to_vec(),
        quals: buf.quality_scores().as_ref().to_vec(),
        read_group,
        consensus,
        has_hard_clip,
    })
}
