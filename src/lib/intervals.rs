//! Genomic intervals and region partitioning.
//!
//! The engine processes the genome as a list of disjoint intervals
//! ("partitions"), each handled independently by one worker. Partitions are
//! fixed-size windows over the header's reference sequences, or a single
//! caller-supplied region restriction.

use crate::errors::{BamfqError, Result};
use bstr::BString;
use std::fmt;

/// Default partition width in bases (10 Mb).
pub const DEFAULT_PARTITION_SIZE: u32 = 10_000_000;

/// One genomic work unit: a 1-based, closed interval on a single contig.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenomicInterval {
    /// Index of the reference sequence in the header dictionary.
    pub ref_id: u32,
    /// Reference sequence name.
    pub name: BString,
    /// 1-based inclusive start.
    pub start: u32,
    /// 1-based inclusive end.
    pub end: u32,
}

impl GenomicInterval {
    /// True if the position lies on this interval's contig within its bounds.
    #[must_use]
    pub fn contains(&self, ref_id: u32, pos: u32) -> bool {
        ref_id == self.ref_id && pos >= self.start && pos <= self.end
    }
}

impl fmt::Display for GenomicInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.name, self.start, self.end)
    }
}

/// Splits reference sequences into disjoint fixed-size windows.
///
/// `references` pairs each contig name with its length, in header order.
/// The final window of each contig is truncated to the contig length.
pub fn partition_references(
    references: &[(BString, u64)],
    partition_size: u32,
) -> Result<Vec<GenomicInterval>> {
    if partition_size == 0 {
        return Err(BamfqError::InvalidParameter {
            parameter: "partition-size".to_string(),
            reason: "must be >= 1".to_string(),
        });
    }

    let mut intervals = Vec::new();
    for (ref_id, (name, length)) in references.iter().enumerate() {
        let length = u32::try_from(*length).map_err(|_| BamfqError::InvalidParameter {
            parameter: "reference length".to_string(),
            reason: format!("contig '{name}' is longer than u32::MAX"),
        })?;

        let mut start = 1u32;
        while start <= length {
            let end = start.saturating_add(partition_size - 1).min(length);
            intervals.push(GenomicInterval {
                ref_id: ref_id as u32,
                name: name.clone(),
                start,
                end,
            });
            start = match end.checked_add(1) {
                Some(next) => next,
                None => break,
            };
        }
    }
    Ok(intervals)
}

/// Parses a region restriction of the form `CONTIG` or `CONTIG:START-END`.
///
/// A bare contig name selects the whole contig.
pub fn parse_region(
    region: &str,
    references: &[(BString, u64)],
) -> Result<GenomicInterval> {
    let (name, range) = match region.rsplit_once(':') {
        Some((name, range)) if !name.is_empty() => (name, Some(range)),
        _ => (region, None),
    };

    let (ref_id, length) = references
        .iter()
        .enumerate()
        .find(|(_, (ref_name, _))| ref_name == name)
        .map(|(id, (_, len))| (id as u32, *len as u32))
        .ok_or_else(|| BamfqError::ReferenceNotFound { ref_name: name.to_string() })?;

    let (start, end) = match range {
        None => (1, length),
        Some(range) => {
            let invalid = |reason: &str| BamfqError::InvalidRegion {
                region: region.to_string(),
                reason: reason.to_string(),
            };
            let (start, end) =
                range.split_once('-').ok_or_else(|| invalid("expected START-END"))?;
            let start: u32 = start
                .replace(',', "")
                .parse()
                .map_err(|_| invalid("start position is not an integer"))?;
            let end: u32 = end
                .replace(',', "")
                .parse()
                .map_err(|_| invalid("end position is not an integer"))?;
            if start == 0 || end < start {
                return Err(invalid("positions must be 1-based with start <= end"));
            }
            (start, end.min(length))
        }
    };

    Ok(GenomicInterval { ref_id, name: BString::from(name), start, end })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs() -> Vec<(BString, u64)> {
        vec![(BString::from("chr1"), 25_000_000), (BString::from("chr2"), 9_999_999)]
    }

    #[test]
    fn test_partition_covers_references_exactly() {
        let intervals = partition_references(&refs(), 10_000_000).unwrap();
        assert_eq!(intervals.len(), 4);

        assert_eq!(intervals[0].to_string(), "chr1:1-10000000");
        assert_eq!(intervals[1].to_string(), "chr1:10000001-20000000");
        assert_eq!(intervals[2].to_string(), "chr1:20000001-25000000");
        assert_eq!(intervals[3].to_string(), "chr2:1-9999999");

        assert_eq!(intervals[0].ref_id, 0);
        assert_eq!(intervals[3].ref_id, 1);

        // Windows are disjoint and adjacent
        assert_eq!(intervals[0].end + 1, intervals[1].start);
        assert_eq!(intervals[1].end + 1, intervals[2].start);
    }

    #[test]
    fn test_partition_size_zero_rejected() {
        assert!(partition_references(&refs(), 0).is_err());
    }

    #[test]
    fn test_contains() {
        let interval =
            GenomicInterval { ref_id: 0, name: BString::from("chr1"), start: 100, end: 200 };
        assert!(interval.contains(0, 100));
        assert!(interval.contains(0, 200));
        assert!(!interval.contains(0, 99));
        assert!(!interval.contains(0, 201));
        assert!(!interval.contains(1, 150));
    }

    #[test]
    fn test_parse_region_whole_contig() {
        let interval = parse_region("chr2", &refs()).unwrap();
        assert_eq!(interval.ref_id, 1);
        assert_eq!(interval.start, 1);
        assert_eq!(interval.end, 9_999_999);
    }

    #[test]
    fn test_parse_region_with_range() {
        let interval = parse_region("chr1:1,000-2,000", &refs()).unwrap();
        assert_eq!(interval.ref_id, 0);
        assert_eq!(interval.start, 1000);
        assert_eq!(interval.end, 2000);

        // End clamped to contig length
        let interval = parse_region("chr2:1-99999999", &refs()).unwrap();
        assert_eq!(interval.end, 9_999_999);
    }

    #[test]
    fn test_parse_region_errors() {
        assert!(matches!(
            parse_region("chrX", &refs()),
            Err(BamfqError::ReferenceNotFound { .. })
        ));
        assert!(parse_region("chr1:10", &refs()).is_err());
        assert!(parse_region("chr1:a-b", &refs()).is_err());
        assert!(parse_region("chr1:200-100", &refs()).is_err());
        assert!(parse_region("chr1:0-100", &refs()).is_err());
    }
}
