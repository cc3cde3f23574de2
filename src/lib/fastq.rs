//! FASTQ output sink.
//!
//! Finished pairs and singletons funnel through a [`PairSink`]. The production
//! implementation, [`OutputSink`], maintains one R1/R2 writer pair per output
//! slot (a single shared pair, one per worker, or one per read group) and a
//! primary unpaired stream.
//!
//! Records are always serialized on the forward strand: a negative-strand
//! read has its bases reverse-complemented and its qualities reversed at
//! write time. Singletons are buffered until the end of the run and then
//! flushed to the primary unpaired stream, with a warning when a buffered
//! singleton claims to be half of a pair.

use crate::dna::reverse_complement_in_place;
use crate::errors::{BamfqError, Result as BamfqResult};
use crate::record::{ReadPair, ReadRecord};
use ahash::AHashMap;
use anyhow::{Context, Result};
use bstr::BString;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{debug, warn};
use parking_lot::Mutex;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lookup table for Phred to Phred+33 ASCII conversion (clamped to 126)
static QUAL_TO_ASCII: [u8; 256] = {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let val = (i as u8).saturating_add(33);
        table[i] = if val > 126 { 126 } else { val };
        i += 1;
    }
    table
};

/// Destination for completed pairs and singletons.
///
/// `worker_id` identifies the calling worker for per-thread output splitting;
/// implementations may ignore it. Pairs are handed over by value and not
/// retained by the caller.
pub trait PairSink: Send + Sync {
    /// Accepts a completed read pair.
    fn write_pair(&self, worker_id: usize, pair: ReadPair) -> Result<()>;

    /// Accepts a read emitted without its mate.
    fn write_singleton(&self, record: ReadRecord) -> Result<()>;
}

/// How R1/R2 output streams are split across physical files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// One shared R1/R2 file pair.
    #[default]
    Single,
    /// One R1/R2 file pair per worker thread.
    PerThread,
    /// One R1/R2 file pair per read group.
    PerReadGroup,
}

impl FromStr for OutputMode {
    type Err = BamfqError;

    fn from_str(s: &str) -> BamfqResult<Self> {
        match s {
            "single" => Ok(Self::Single),
            "per-thread" => Ok(Self::PerThread),
            "per-read-group" => Ok(Self::PerReadGroup),
            other => Err(BamfqError::InvalidParameter {
                parameter: "output-mode".to_string(),
                reason: format!(
                    "'{other}' is not one of: single, per-thread, per-read-group"
                ),
            }),
        }
    }
}

/// Configuration for [`OutputSink`].
#[derive(Debug, Clone)]
pub struct SinkConfig {
    /// Output path prefix; slot and mate suffixes are appended.
    pub prefix: PathBuf,
    /// Output splitting mode.
    pub mode: OutputMode,
    /// Number of worker threads (sizes the per-thread slot table).
    pub threads: usize,
    /// Gzip-compress output files.
    pub gzip: bool,
    /// Append `/1` and `/2` to read names.
    pub mate_suffix: bool,
}

/// Counts reported by [`OutputSink::finish`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SinkCounts {
    /// Pairs written across all slots.
    pub pairs: u64,
    /// Singletons flushed to the unpaired stream.
    pub singletons: u64,
    /// Flushed singletons that were flagged as paired (mate never found).
    pub paired_singletons: u64,
}

enum FastqOut {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl Write for FastqOut {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            FastqOut::Plain(w) => w.write(buf),
            FastqOut::Gzip(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            FastqOut::Plain(w) => w.flush(),
            FastqOut::Gzip(w) => w.flush(),
        }
    }
}

impl FastqOut {
    fn finish(self) -> std::io::Result<()> {
        match self {
            FastqOut::Plain(mut w) => w.flush(),
            FastqOut::Gzip(w) => w.finish()?.flush(),
        }
    }
}

struct MateWriters {
    r1: FastqOut,
    r2: FastqOut,
}

enum Slots {
    Single(Mutex<MateWriters>),
    PerThread(Vec<Mutex<MateWriters>>),
    PerReadGroup(Mutex<AHashMap<BString, MateWriters>>),
}

/// Writer cache serializing pairs and singletons to FASTQ files.
pub struct OutputSink {
    config: SinkConfig,
    slots: Slots,
    singletons: Mutex<Vec<ReadRecord>>,
    pairs: AtomicU64,
}

impl OutputSink {
    /// Opens output files according to the configured mode.
    ///
    /// Per-read-group files are created lazily as read groups are first seen.
    pub fn new(config: SinkConfig) -> Result<Self> {
        let slots = match config.mode {
            OutputMode::Single => Slots::Single(Mutex::new(open_mate_writers(&config, None)?)),
            OutputMode::PerThread => {
                let mut writers = Vec::with_capacity(config.threads.max(1));
                for worker in 0..config.threads.max(1) {
                    let slot = format!("t{worker}");
                    writers.push(Mutex::new(open_mate_writers(&config, Some(&slot))?));
                }
                Slots::PerThread(writers)
            }
            OutputMode::PerReadGroup => Slots::PerReadGroup(Mutex::new(AHashMap::new())),
        };

        Ok(Self {
            config,
            slots,
            singletons: Mutex::new(Vec::new()),
            pairs: AtomicU64::new(0),
        })
    }

    /// Flushes buffered singletons to the primary unpaired stream and closes
    /// every output file.
    ///
    /// A buffered singleton flagged as paired means its mate was never found
    /// anywhere in the dataset; this is surfaced as a warning so no silent
    /// data-quality loss occurs.
    pub fn finish(self) -> Result<SinkCounts> {
        let mut counts = SinkCounts { pairs: self.pairs.load(Ordering::Relaxed), ..Default::default() };

        let singletons = self.singletons.into_inner();
        if !singletons.is_empty() {
            let path = output_path(&self.config, None, "unpaired");
            let mut writer = open_fastq(&path, self.config.gzip)?;
            for record in singletons {
                if record.flags.is_paired() {
                    counts.paired_singletons += 1;
                    debug!(
                        "Writing paired read '{}' as unpaired; its mate was never found",
                        record.name_lossy()
                    );
                }
                write_fastq_record(&mut writer, &record, self.config.mate_suffix)
                    .with_context(|| format!("Failed to write: {}", path.display()))?;
                counts.singletons += 1;
            }
            writer.finish().with_context(|| format!("Failed to close: {}", path.display()))?;

            if counts.paired_singletons > 0 {
                warn!(
                    "{} singleton reads were flagged as paired but their mates were never \
                     found in any partition",
                    counts.paired_singletons
                );
            }
        }

        match self.slots {
            Slots::Single(writers) => close_mate_writers(writers.into_inner())?,
            Slots::PerThread(slots) => {
                for writers in slots {
                    close_mate_writers(writers.into_inner())?;
                }
            }
            Slots::PerReadGroup(map) => {
                for (_, writers) in map.into_inner() {
                    close_mate_writers(writers)?;
                }
            }
        }

        Ok(counts)
    }
}

impl PairSink for OutputSink {
    fn write_pair(&self, worker_id: usize, pair: ReadPair) -> Result<()> {
        match &self.slots {
            Slots::Single(writers) => {
                let mut writers = writers.lock();
                write_pair_records(&mut writers, &pair, self.config.mate_suffix)?;
            }
            Slots::PerThread(slots) => {
                let mut writers = slots[worker_id % slots.len()].lock();
                write_pair_records(&mut writers, &pair, self.config.mate_suffix)?;
            }
            Slots::PerReadGroup(map) => {
                let key = pair.first.read_group.clone().unwrap_or_else(|| BString::from("none"));
                let mut map = map.lock();
                if !map.contains_key(&key) {
                    let slot = sanitize_slot_name(&key);
                    map.insert(key.clone(), open_mate_writers(&self.config, Some(&slot))?);
                }
                let writers = map.get_mut(&key).expect("slot inserted above");
                write_pair_records(writers, &pair, self.config.mate_suffix)?;
            }
        }
        self.pairs.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn write_singleton(&self, record: ReadRecord) -> Result<()> {
        self.singletons.lock().push(record);
        Ok(())
    }
}

fn write_pair_records(writers: &mut MateWriters, pair: &ReadPair, suffix: bool) -> Result<()> {
    write_fastq_record(&mut writers.r1, &pair.first, suffix)
        .context("Failed to write R1 record")?;
    write_fastq_record(&mut writers.r2, &pair.second, suffix)
        .context("Failed to write R2 record")?;
    Ok(())
}

/// Writes one 4-line FASTQ record, normalized to the forward strand.
fn write_fastq_record<W: Write>(
    writer: &mut W,
    record: &ReadRecord,
    mate_suffix: bool,
) -> std::io::Result<()> {
    let suffix: &[u8] = if !mate_suffix {
        b""
    } else if record.flags.is_first_of_pair() && !record.flags.is_last_of_pair() {
        b"/1"
    } else if record.flags.is_last_of_pair() && !record.flags.is_first_of_pair() {
        b"/2"
    } else {
        b""
    };

    let mut bases = record.bases.clone();
    let mut quals: Vec<u8> =
        record.quals.iter().map(|&q| QUAL_TO_ASCII[q as usize]).collect();
    if record.flags.is_reverse() {
        reverse_complement_in_place(&mut bases);
        quals.reverse();
    }

    writer.write_all(b"@")?;
    writer.write_all(&record.name)?;
    writer.write_all(suffix)?;
    writer.write_all(b"\n")?;
    writer.write_all(&bases)?;
    writer.write_all(b"\n+\n")?;
    writer.write_all(&quals)?;
    writer.write_all(b"\n")
}

fn open_mate_writers(config: &SinkConfig, slot: Option<&str>) -> Result<MateWriters> {
    Ok(MateWriters {
        r1: open_fastq(&output_path(config, slot, "r1"), config.gzip)?,
        r2: open_fastq(&output_path(config, slot, "r2"), config.gzip)?,
    })
}

fn close_mate_writers(writers: MateWriters) -> Result<()> {
    writers.r1.finish().context("Failed to close R1 output")?;
    writers.r2.finish().context("Failed to close R2 output")?;
    Ok(())
}

fn output_path(config: &SinkConfig, slot: Option<&str>, mate: &str) -> PathBuf {
    let prefix = config.prefix.display();
    let ext = if config.gzip { ".gz" } else { "" };
    let name = match slot {
        Some(slot) => format!("{prefix}.{slot}.{mate}.fastq{ext}"),
        None => format!("{prefix}.{mate}.fastq{ext}"),
    };
    PathBuf::from(name)
}

fn open_fastq(path: &PathBuf, gzip: bool) -> Result<FastqOut> {
    let file =
        File::create(path).with_context(|| format!("Failed to create: {}", path.display()))?;
    let buffered = BufWriter::with_capacity(256 * 1024, file);
    Ok(if gzip {
        FastqOut::Gzip(GzEncoder::new(buffered, Compression::default()))
    } else {
        FastqOut::Plain(buffered)
    })
}

/// Replaces bytes that are unsafe in file names with underscores.
fn sanitize_slot_name(name: &BString) -> String {
    name.iter()
        .map(|&b| if b.is_ascii_alphanumeric() || b == b'-' || b == b'.' { b as char } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::RecordBuilder;
    use std::fs;
    use tempfile::TempDir;

    fn plain_config(dir: &TempDir, mode: OutputMode) -> SinkConfig {
        SinkConfig {
            prefix: dir.path().join("out"),
            mode,
            threads: 2,
            gzip: false,
            mate_suffix: true,
        }
    }

    fn read(path: PathBuf) -> String {
        fs::read_to_string(path).unwrap()
    }

    #[test]
    fn test_single_mode_writes_pair() {
        let dir = TempDir::new().unwrap();
        let sink = OutputSink::new(plain_config(&dir, OutputMode::Single)).unwrap();

        let r1 = RecordBuilder::new("q1").paired(true).at(0, 1).bases("ACGT").build();
        let r2 = RecordBuilder::new("q1").paired(false).at(0, 2).bases("TTAA").build();
        sink.write_pair(0, ReadPair::from_mates(r1, r2)).unwrap();

        let counts = sink.finish().unwrap();
        assert_eq!(counts.pairs, 1);
        assert_eq!(counts.singletons, 0);

        let r1_out = read(dir.path().join("out.r1.fastq"));
        assert_eq!(r1_out, "@q1/1\nACGT\n+\n????\n");
        let r2_out = read(dir.path().join("out.r2.fastq"));
        assert_eq!(r2_out, "@q1/2\nTTAA\n+\n????\n");
    }

    #[test]
    fn test_negative_strand_normalized_on_output() {
        let dir = TempDir::new().unwrap();
        let sink = OutputSink::new(plain_config(&dir, OutputMode::Single)).unwrap();

        let r1 = RecordBuilder::new("q1")
            .paired(true)
            .at(0, 1)
            .bases("AACG")
            .quals(vec![10, 20, 30, 40])
            .reverse()
            .build();
        let r2 = RecordBuilder::new("q1").paired(false).at(0, 2).bases("ACGT").build();
        sink.write_pair(0, ReadPair::from_mates(r1, r2)).unwrap();
        sink.finish().unwrap();

        // AACG reverse-complemented is CGTT; qualities reversed
        let r1_out = read(dir.path().join("out.r1.fastq"));
        assert_eq!(r1_out, "@q1/1\nCGTT\n+\nI?5+\n");
    }

    #[test]
    fn test_singletons_buffered_until_finish() {
        let dir = TempDir::new().unwrap();
        let sink = OutputSink::new(plain_config(&dir, OutputMode::Single)).unwrap();

        sink.write_singleton(RecordBuilder::new("solo").at(0, 5).bases("ACGT").build()).unwrap();
        // Paired orphan: mate never found anywhere
        sink.write_singleton(
            RecordBuilder::new("orphan").paired(true).at(0, 9).bases("GGCC").build(),
        )
        .unwrap();

        assert!(!dir.path().join("out.unpaired.fastq").exists());

        let counts = sink.finish().unwrap();
        assert_eq!(counts.singletons, 2);
        assert_eq!(counts.paired_singletons, 1);

        let unpaired = read(dir.path().join("out.unpaired.fastq"));
        assert!(unpaired.contains("@solo\n"));
        assert!(unpaired.contains("@orphan/1\n"));
    }

    #[test]
    fn test_per_thread_mode_splits_files() {
        let dir = TempDir::new().unwrap();
        let sink = OutputSink::new(plain_config(&dir, OutputMode::PerThread)).unwrap();

        for (worker, name) in [(0usize, "a"), (1usize, "b")] {
            let r1 = RecordBuilder::new(name).paired(true).at(0, 1).bases("ACGT").build();
            let r2 = RecordBuilder::new(name).paired(false).at(0, 2).bases("ACGT").build();
            sink.write_pair(worker, ReadPair::from_mates(r1, r2)).unwrap();
        }
        sink.finish().unwrap();

        assert!(read(dir.path().join("out.t0.r1.fastq")).contains("@a/1"));
        assert!(read(dir.path().join("out.t1.r1.fastq")).contains("@b/1"));
    }

    #[test]
    fn test_per_read_group_mode_creates_files_lazily() {
        let dir = TempDir::new().unwrap();
        let sink = OutputSink::new(plain_config(&dir, OutputMode::PerReadGroup)).unwrap();

        let r1 =
            RecordBuilder::new("q").paired(true).at(0, 1).bases("ACGT").read_group("lib A").build();
        let r2 =
            RecordBuilder::new("q").paired(false).at(0, 2).bases("ACGT").read_group("lib A").build();
        sink.write_pair(0, ReadPair::from_mates(r1, r2)).unwrap();
        sink.finish().unwrap();

        // Read group name sanitized for the file system
        assert!(dir.path().join("out.lib_A.r1.fastq").exists());
        assert!(dir.path().join("out.lib_A.r2.fastq").exists());
    }

    #[test]
    fn test_gzip_output_has_gz_magic() {
        let dir = TempDir::new().unwrap();
        let mut config = plain_config(&dir, OutputMode::Single);
        config.gzip = true;
        let sink = OutputSink::new(config).unwrap();

        let r1 = RecordBuilder::new("q").paired(true).at(0, 1).bases("ACGT").build();
        let r2 = RecordBuilder::new("q").paired(false).at(0, 2).bases("ACGT").build();
        sink.write_pair(0, ReadPair::from_mates(r1, r2)).unwrap();
        sink.finish().unwrap();

        let bytes = fs::read(dir.path().join("out.r1.fastq.gz")).unwrap();
        assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
    }

    #[test]
    fn test_mate_suffix_disabled() {
        let dir = TempDir::new().unwrap();
        let mut config = plain_config(&dir, OutputMode::Single);
        config.mate_suffix = false;
        let sink = OutputSink::new(config).unwrap();

        let r1 = RecordBuilder::new("q1").paired(true).at(0, 1).bases("ACGT").build();
        let r2 = RecordBuilder::new("q1").paired(false).at(0, 2).bases("ACGT").build();
        sink.write_pair(0, ReadPair::from_mates(r1, r2)).unwrap();
        sink.finish().unwrap();

        assert!(read(dir.path().join("out.r1.fastq")).starts_with("@q1\n"));
    }

    #[test]
    fn test_output_mode_from_str() {
        assert_eq!("single".parse::<OutputMode>().unwrap(), OutputMode::Single);
        assert_eq!("per-thread".parse::<OutputMode>().unwrap(), OutputMode::PerThread);
        assert_eq!("per-read-group".parse::<OutputMode>().unwrap(), OutputMode::PerReadGroup);
        assert!("sharded".parse::<OutputMode>().is_err());
    }
}
