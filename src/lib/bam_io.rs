//! Opening and inspecting indexed BAM inputs.

use anyhow::{bail, Context, Result};
use bstr::BString;
use noodles::bam;
use noodles::sam::Header;
use std::fs::File;
use std::path::Path;

/// Opens a BAM with its companion index and reads the header.
///
/// The index is resolved next to the BAM (`.bai` or `.csi`); without one the
/// engine cannot issue per-partition overlap queries.
pub fn open_indexed_bam(
    path: &Path,
) -> Result<(bam::io::IndexedReader<noodles::bgzf::Reader<File>>, Header)> {
    let mut reader = bam::io::indexed_reader::Builder::default()
        .build_from_path(path)
        .with_context(|| format!("Failed to open indexed BAM: {}", path.display()))?;
    let header = reader
        .read_header()
        .with_context(|| format!("Failed to read BAM header: {}", path.display()))?;
    Ok((reader, header))
}

/// Reads just the header of a BAM file.
pub fn read_bam_header(path: &Path) -> Result<Header> {
    let (_, header) = open_indexed_bam(path)?;
    Ok(header)
}

/// Extracts the reference dictionary as (name, length) in header order.
pub fn reference_sequences(header: &Header) -> Result<Vec<(BString, u64)>> {
    if header.reference_sequences().is_empty() {
        bail!("BAM header has no reference sequences; is the input aligned?");
    }

    Ok(header
        .reference_sequences()
        .iter()
        .map(|(name, seq)| (name.clone(), seq.length().get() as u64))
        .collect())
}
