//! Engine-internal read record types.
//!
//! [`ReadRecord`] is the owned representation the pairing engine operates on,
//! decoupled from any particular alignment-file library. Records are immutable
//! once produced by a source; strand normalization happens only at FASTQ
//! serialization time.
//!
//! Records routed to disk shards are encoded as length-prefixed little-endian
//! frames (the same framing style used for raw BAM spill files), so a shard is
//! a simple append-only log that can be replayed sequentially.

use bstr::BString;
use std::io;

/// SAM-style flag bits relevant to the pairing engine.
///
/// The bit layout matches the SAM specification so flags survive the
/// BAM -> engine -> shard round trip unmodified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadFlags(u16);

impl ReadFlags {
    /// Template has multiple segments.
    pub const PAIRED: u16 = 0x1;
    /// Segment is unmapped.
    pub const UNMAPPED: u16 = 0x4;
    /// Next segment in the template is unmapped.
    pub const MATE_UNMAPPED: u16 = 0x8;
    /// Sequence is reverse-complemented in the alignment.
    pub const REVERSE: u16 = 0x10;
    /// First segment in the template.
    pub const FIRST_OF_PAIR: u16 = 0x40;
    /// Last segment in the template.
    pub const LAST_OF_PAIR: u16 = 0x80;
    /// Secondary alignment.
    pub const SECONDARY: u16 = 0x100;
    /// Supplementary alignment.
    pub const SUPPLEMENTARY: u16 = 0x800;

    /// Creates flags from raw SAM flag bits.
    #[must_use]
    pub const fn new(bits: u16) -> Self {
        Self(bits)
    }

    /// Returns the raw flag bits.
    #[must_use]
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// True if the read is part of a pair.
    #[must_use]
    pub const fn is_paired(self) -> bool {
        self.0 & Self::PAIRED != 0
    }

    /// True if the read itself is unmapped.
    #[must_use]
    pub const fn is_unmapped(self) -> bool {
        self.0 & Self::UNMAPPED != 0
    }

    /// True if the read's mate is unmapped.
    #[must_use]
    pub const fn is_mate_unmapped(self) -> bool {
        self.0 & Self::MATE_UNMAPPED != 0
    }

    /// True if the read aligned to the negative strand.
    #[must_use]
    pub const fn is_reverse(self) -> bool {
        self.0 & Self::REVERSE != 0
    }

    /// True if the read is the first segment of its template.
    #[must_use]
    pub const fn is_first_of_pair(self) -> bool {
        self.0 & Self::FIRST_OF_PAIR != 0
    }

    /// True if the read is the last segment of its template.
    #[must_use]
    pub const fn is_last_of_pair(self) -> bool {
        self.0 & Self::LAST_OF_PAIR != 0
    }

    /// True if the read is a secondary or supplementary alignment.
    #[must_use]
    pub const fn is_secondary_or_supplementary(self) -> bool {
        self.0 & (Self::SECONDARY | Self::SUPPLEMENTARY) != 0
    }
}

/// One sequenced read as seen by the pairing engine.
///
/// Positions are 1-based; `ref_id` indexes into the header's reference
/// sequence dictionary. `quals` holds raw Phred scores (not ASCII-offset).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRecord {
    /// Read name, shared by both mates of a pair.
    pub name: BString,
    /// SAM-style flags.
    pub flags: ReadFlags,
    /// Reference sequence id, if placed.
    pub ref_id: Option<u32>,
    /// 1-based alignment start, if placed.
    pub pos: Option<u32>,
    /// Mate reference sequence id, if the mate is placed.
    pub mate_ref_id: Option<u32>,
    /// 1-based mate alignment start, if the mate is placed.
    pub mate_pos: Option<u32>,
    /// Base calls as upper-case ASCII.
    pub bases: Vec<u8>,
    /// Raw Phred base qualities, same length as `bases`.
    pub quals: Vec<u8>,
    /// Read group id from the RG tag, if present.
    pub read_group: Option<BString>,
    /// True for synthetic/consensus-derived records, which are never emitted.
    pub consensus: bool,
    /// True if the alignment carries a hard clip, which the engine cannot
    /// safely re-emit as FASTQ.
    pub has_hard_clip: bool,
}

impl ReadRecord {
    /// True if the read has no genomic placement at all.
    #[must_use]
    pub fn is_placed(&self) -> bool {
        self.ref_id.is_some() && self.pos.is_some()
    }

    /// Name as a lossy UTF-8 string for log and error messages.
    #[must_use]
    pub fn name_lossy(&self) -> String {
        String::from_utf8_lossy(&self.name).into_owned()
    }

    /// Encodes this record as a shard frame body into `buf` (cleared first).
    ///
    /// Layout, all little-endian:
    /// flags(u16), markers(u8), ref_id(i32), pos(u32), mate_ref_id(i32),
    /// mate_pos(u32), name_len(u16), rg_len(u8), seq_len(u32),
    /// then name, read group, bases and quals bytes.
    ///
    /// `None` positions encode as 0 and `None` reference ids as -1; a position
    /// of 0 is never valid in the 1-based coordinate space.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.clear();
        buf.extend_from_slice(&self.flags.bits().to_le_bytes());

        let mut markers = 0u8;
        if self.consensus {
            markers |= 0x1;
        }
        if self.has_hard_clip {
            markers |= 0x2;
        }
        buf.push(markers);

        buf.extend_from_slice(&ref_id_to_i32(self.ref_id).to_le_bytes());
        buf.extend_from_slice(&self.pos.unwrap_or(0).to_le_bytes());
        buf.extend_from_slice(&ref_id_to_i32(self.mate_ref_id).to_le_bytes());
        buf.extend_from_slice(&self.mate_pos.unwrap_or(0).to_le_bytes());

        let name_len = u16::try_from(self.name.len()).unwrap_or(u16::MAX);
        buf.extend_from_slice(&name_len.to_le_bytes());
        let rg_len = self.read_group.as_ref().map_or(0, |rg| rg.len().min(255) as u8);
        buf.push(rg_len);
        buf.extend_from_slice(&(self.bases.len() as u32).to_le_bytes());

        buf.extend_from_slice(&self.name[..name_len as usize]);
        if let Some(rg) = &self.read_group {
            buf.extend_from_slice(&rg[..rg_len as usize]);
        }
        buf.extend_from_slice(&self.bases);
        buf.extend_from_slice(&self.quals);
    }

    /// Decodes a record from a shard frame body produced by [`Self::encode_into`].
    pub fn decode(frame: &[u8]) -> io::Result<Self> {
        const HEADER_LEN: usize = 2 + 1 + 4 + 4 + 4 + 4 + 2 + 1 + 4;
        if frame.len() < HEADER_LEN {
            return Err(truncated());
        }

        let flags = ReadFlags::new(u16::from_le_bytes([frame[0], frame[1]]));
        let markers = frame[2];
        let ref_id = i32_to_ref_id(i32::from_le_bytes(frame[3..7].try_into().unwrap()));
        let pos = nonzero_pos(u32::from_le_bytes(frame[7..11].try_into().unwrap()));
        let mate_ref_id = i32_to_ref_id(i32::from_le_bytes(frame[11..15].try_into().unwrap()));
        let mate_pos = nonzero_pos(u32::from_le_bytes(frame[15..19].try_into().unwrap()));
        let name_len = u16::from_le_bytes([frame[19], frame[20]]) as usize;
        let rg_len = frame[21] as usize;
        let seq_len = u32::from_le_bytes(frame[22..26].try_into().unwrap()) as usize;

        let expected = HEADER_LEN + name_len + rg_len + 2 * seq_len;
        if frame.len() != expected {
            return Err(truncated());
        }

        let mut offset = HEADER_LEN;
        let name = BString::from(&frame[offset..offset + name_len]);
        offset += name_len;
        let read_group =
            (rg_len > 0).then(|| BString::from(&frame[offset..offset + rg_len]));
        offset += rg_len;
        let bases = frame[offset..offset + seq_len].to_vec();
        offset += seq_len;
        let quals = frame[offset..offset + seq_len].to_vec();

        Ok(Self {
            name,
            flags,
            ref_id,
            pos,
            mate_ref_id,
            mate_pos,
            bases,
            quals,
            read_group,
            consensus: markers & 0x1 != 0,
            has_hard_clip: markers & 0x2 != 0,
        })
    }
}

/// Two mates of one originating fragment, ordered first then second.
///
/// Formed exactly once per fragment by whichever component observes both
/// halves, then handed immediately to the output sink.
#[derive(Debug, Clone)]
pub struct ReadPair {
    /// First-of-pair read.
    pub first: ReadRecord,
    /// Second-of-pair read.
    pub second: ReadRecord,
}

impl ReadPair {
    /// Orders two mates by their first-of-pair flag.
    #[must_use]
    pub fn from_mates(a: ReadRecord, b: ReadRecord) -> Self {
        if a.flags.is_first_of_pair() || b.flags.is_last_of_pair() {
            Self { first: a, second: b }
        } else {
            Self { first: b, second: a }
        }
    }
}

fn ref_id_to_i32(id: Option<u32>) -> i32 {
    id.map_or(-1, |v| v as i32)
}

fn i32_to_ref_id(v: i32) -> Option<u32> {
    u32::try_from(v).ok()
}

fn nonzero_pos(v: u32) -> Option<u32> {
    (v > 0).then_some(v)
}

fn truncated() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, "truncated shard frame")
}
