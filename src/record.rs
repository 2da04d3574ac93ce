// mm2batch: Batch alignment boundary codec and buffer ownership.
//
// Copyright 2025 Tommi Mäklin [tommi@maklin.fi].
//
// Copyrights in this project are retained by contributors. No copyright assignment
// is required to contribute to this project.
//
// Except as otherwise noted (below and/or in individual files), this
// project is licensed under the Apache License, Version 2.0
// <LICENSE-APACHE> or <http://www.apache.org/licenses/LICENSE-2.0> or
// the MIT license, <LICENSE-MIT> or <http://opensource.org/licenses/MIT>,
// at your option.
//

//! Flattened alignment records.
//!
//! Each engine alignment is written as a 16 byte [RecordHeader] followed by
//! its CIGAR words:
//!
//! ```text
//! [ref_id: i32][ref_start: i32][mapq_or_strand: i32][n_cigar: i32][cigar_op: u32] ..
//! ```
//!
//! `mapq_or_strand` holds the map quality on the forward strand and its
//! bitwise complement (always negative) on the reverse strand. Query bases
//! outside the aligned region are written as soft clips before and after
//! the native operations.
//!
//! The record size and the record contents are both derived from one
//! [RecordLayout], so the two cannot disagree.

use crate::batch::read_word;
use crate::batch::WORD_LEN;
use crate::engine::EngineAlignment;
use crate::error::BridgeError;

use std::io::Cursor;
use std::io::Read;
use std::io::Write;

use bincode::{Encode, Decode};
use bincode::encode_into_std_write;
use bincode::decode_from_slice;

use noodles_sam::alignment::record::cigar::op::Kind;
use noodles_sam::alignment::record::cigar::Op;

/// CIGAR words packed as `len << 4 | op`.
pub mod op {
    pub const MATCH: u32 = 0;
    pub const INSERTION: u32 = 1;
    pub const DELETION: u32 = 2;
    pub const SKIP: u32 = 3;
    pub const SOFT_CLIP: u32 = 4;
    pub const HARD_CLIP: u32 = 5;
    pub const PAD: u32 = 6;
    pub const SEQUENCE_MATCH: u32 = 7;
    pub const SEQUENCE_MISMATCH: u32 = 8;

    /// Operation characters indexed by opcode.
    pub const OP_CHARS: &[u8; 9] = b"MIDNSHP=X";

    pub fn pack(
        len: u32,
        op: u32,
    ) -> u32 {
        (len << 4) | op
    }

    pub fn len(
        word: u32,
    ) -> u32 {
        word >> 4
    }

    pub fn code(
        word: u32,
    ) -> u32 {
        word & 0x0f
    }
}

pub const RECORD_HEADER_LEN: usize = 16;

#[derive(Encode, Decode, Debug, Clone, PartialEq, Eq)]
pub struct RecordHeader {
    pub ref_id: i32,
    pub ref_start: i32,
    pub mapq_or_strand: i32,
    pub n_cigar: i32,
}

/// Map quality with the strand folded into the sign.
pub fn strand_mapq(
    mapq: i32,
    reverse: bool,
) -> i32 {
    if reverse { !mapq } else { mapq }
}

/// Which CIGAR words a flattened record contains.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordLayout {
    pub leading_clip: Option<u32>,
    pub native_ops: usize,
    pub trailing_clip: Option<u32>,
}

impl RecordLayout {
    /// Layout of `aln` against a query of `query_len` bases.
    ///
    /// An alignment without CIGAR payload gets no words at all, clips
    /// included.
    pub fn plan(
        aln: &EngineAlignment,
        query_len: u32,
    ) -> Self {
        match &aln.cigar {
            None => RecordLayout::default(),
            Some(cigar) => RecordLayout {
                leading_clip: (aln.query_start > 0).then_some(aln.query_start),
                native_ops: cigar.len(),
                trailing_clip: (aln.query_end < query_len).then(|| query_len - aln.query_end),
            },
        }
    }

    pub fn n_cigar(&self) -> usize {
        self.native_ops + self.leading_clip.is_some() as usize + self.trailing_clip.is_some() as usize
    }

    pub fn encoded_len(&self) -> usize {
        RECORD_HEADER_LEN + WORD_LEN * self.n_cigar()
    }
}

/// Writes `aln` with the words given by `layout`.
///
/// Consumes the alignment; its CIGAR payload is dropped once copied,
/// whether or not the write succeeds.
pub fn write_record<W: Write>(
    aln: EngineAlignment,
    layout: &RecordLayout,
    conn: &mut W,
) -> Result<(), BridgeError> {
    let header = RecordHeader {
        ref_id: aln.ref_id,
        ref_start: aln.ref_start,
        mapq_or_strand: strand_mapq(aln.mapq, aln.reverse),
        n_cigar: layout.n_cigar() as i32,
    };
    let nbytes = encode_into_std_write(
        &header,
        conn,
        bincode::config::standard().with_fixed_int_encoding(),
    )?;
    debug_assert_eq!(nbytes, RECORD_HEADER_LEN);

    if let Some(clip) = layout.leading_clip {
        conn.write_all(&op::pack(clip, op::SOFT_CLIP).to_le_bytes())?;
    }
    if let Some(cigar) = aln.cigar.as_ref() {
        for word in cigar.iter().take(layout.native_ops) {
            conn.write_all(&word.to_le_bytes())?;
        }
    }
    if let Some(clip) = layout.trailing_clip {
        conn.write_all(&op::pack(clip, op::SOFT_CLIP).to_le_bytes())?;
    }

    Ok(())
}

/// Flattens `aln` into a new vector.
pub fn encode_record(
    aln: EngineAlignment,
    query_len: u32,
) -> Result<Vec<u8>, BridgeError> {
    let layout = RecordLayout::plan(&aln, query_len);
    let mut bytes: Vec<u8> = Vec::with_capacity(layout.encoded_len());
    write_record(aln, &layout, &mut bytes)?;
    Ok(bytes)
}

fn kind_from_code(
    code: u32,
) -> Result<Kind, BridgeError> {
    match code {
        op::MATCH => Ok(Kind::Match),
        op::INSERTION => Ok(Kind::Insertion),
        op::DELETION => Ok(Kind::Deletion),
        op::SKIP => Ok(Kind::Skip),
        op::SOFT_CLIP => Ok(Kind::SoftClip),
        op::HARD_CLIP => Ok(Kind::HardClip),
        op::PAD => Ok(Kind::Pad),
        op::SEQUENCE_MATCH => Ok(Kind::SequenceMatch),
        op::SEQUENCE_MISMATCH => Ok(Kind::SequenceMismatch),
        _ => Err(BridgeError::Codec(format!("unknown CIGAR opcode {}", code))),
    }
}

fn kind_char(
    kind: Kind,
) -> char {
    let code = match kind {
        Kind::Match => op::MATCH,
        Kind::Insertion => op::INSERTION,
        Kind::Deletion => op::DELETION,
        Kind::Skip => op::SKIP,
        Kind::SoftClip => op::SOFT_CLIP,
        Kind::HardClip => op::HARD_CLIP,
        Kind::Pad => op::PAD,
        Kind::SequenceMatch => op::SEQUENCE_MATCH,
        Kind::SequenceMismatch => op::SEQUENCE_MISMATCH,
    };
    op::OP_CHARS[code as usize] as char
}

/// A decoded alignment, as seen by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alignment {
    pub ref_id: i32,
    pub ref_start: i32,
    pub reverse: bool,
    pub mapq: i32,
    pub cigar: Vec<Op>,
}

impl Alignment {
    /// Reads one flattened record.
    pub fn read_from<R: Read>(
        conn: &mut R,
    ) -> Result<Self, BridgeError> {
        let mut header_bytes = [0_u8; RECORD_HEADER_LEN];
        conn.read_exact(&mut header_bytes)?;
        let header: RecordHeader = decode_from_slice(&header_bytes, bincode::config::standard().with_fixed_int_encoding())?.0;

        let (reverse, mapq) = if header.mapq_or_strand < 0 {
            (true, !header.mapq_or_strand)
        } else {
            (false, header.mapq_or_strand)
        };

        let mut cigar: Vec<Op> = Vec::new();
        let mut word_bytes = [0_u8; WORD_LEN];
        for _ in 0..header.n_cigar.max(0) {
            conn.read_exact(&mut word_bytes)?;
            let word = read_word(&word_bytes, 0);
            cigar.push(Op::new(kind_from_code(op::code(word))?, op::len(word) as usize));
        }

        Ok(Alignment { ref_id: header.ref_id, ref_start: header.ref_start, reverse, mapq, cigar })
    }

    /// CIGAR in SAM text form, `*` if empty.
    pub fn cigar_string(&self) -> String {
        if self.cigar.is_empty() {
            return "*".to_string();
        }
        self.cigar.iter().map(|op| format!("{}{}", op.len(), kind_char(op.kind()))).collect()
    }
}

/// Splits an alignment output back into one list per batch sequence.
///
/// ## Errors
///
/// Returns [BridgeError::Codec] if the output doesn't hold exactly
/// `n_seqs` result groups.
pub fn decode_alignments(
    bytes: &[u8],
    n_seqs: usize,
) -> Result<Vec<Vec<Alignment>>, BridgeError> {
    let mut conn = Cursor::new(bytes);
    let mut res: Vec<Vec<Alignment>> = Vec::with_capacity(n_seqs);
    let mut count_bytes = [0_u8; WORD_LEN];

    for seq_idx in 0..n_seqs {
        conn.read_exact(&mut count_bytes).map_err(|_| {
            BridgeError::Codec(format!("alignment output ends before sequence {}", seq_idx))
        })?;
        let n_alignments = read_word(&count_bytes, 0) as usize;
        let alignments = (0..n_alignments).map(|_| Alignment::read_from(&mut conn)).collect::<Result<Vec<Alignment>, BridgeError>>().map_err(|err| match err {
            BridgeError::Io(msg) => BridgeError::Codec(format!("alignment output ends inside a record of sequence {}: {}", seq_idx, msg)),
            other => other,
        })?;
        res.push(alignments);
    }

    if conn.position() as usize != bytes.len() {
        return Err(BridgeError::Codec(format!(
            "{} trailing bytes after {} result groups", bytes.len() - conn.position() as usize, n_seqs
        )));
    }

    Ok(res)
}

// Tests
#[cfg(test)]
mod tests {
    use crate::engine::EngineAlignment;

    fn aln(
        query_start: u32,
        query_end: u32,
        cigar: Option<Vec<u32>>,
        reverse: bool,
    ) -> EngineAlignment {
        EngineAlignment { ref_id: 3, ref_start: 1000, mapq: 60, reverse, cigar, query_start, query_end }
    }

    fn words(
        bytes: &[u8],
    ) -> Vec<u32> {
        bytes.chunks_exact(4).map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]])).collect()
    }

    #[test]
    fn full_coverage_has_no_clips() {
        use super::encode_record;
        use super::op;

        let native = op::pack(10, op::MATCH);
        let bytes = encode_record(aln(0, 10, Some(vec![native]), false), 10).unwrap();
        assert_eq!(words(&bytes), vec![3, 1000, 60, 1, native]);
    }

    #[test]
    fn partial_coverage_adds_both_clips() {
        use super::encode_record;
        use super::op;
        use super::RecordLayout;

        let native = op::pack(6, op::MATCH);
        let record = aln(2, 8, Some(vec![native]), false);
        let layout = RecordLayout::plan(&record, 10);
        assert_eq!(layout.n_cigar(), 3);
        assert_eq!(layout.encoded_len(), 28);

        let bytes = encode_record(record, 10).unwrap();
        assert_eq!(bytes.len(), 28);
        assert_eq!(words(&bytes), vec![3, 1000, 60, 3, (2 << 4) | 4, native, (2 << 4) | 4]);
    }

    #[test]
    fn leading_clip_only() {
        use super::encode_record;
        use super::op;

        let native = op::pack(7, op::MATCH);
        let bytes = encode_record(aln(3, 10, Some(vec![native]), false), 10).unwrap();
        let got = words(&bytes);
        assert_eq!(got[3], 2);
        assert_eq!(got[4], (3 << 4) | 4);
        assert_eq!(got[5], native);
    }

    #[test]
    fn trailing_clip_only() {
        use super::encode_record;
        use super::op;

        let cigar = vec![op::pack(4, op::MATCH), op::pack(1, op::INSERTION), op::pack(4, op::MATCH)];
        let bytes = encode_record(aln(0, 9, Some(cigar.clone()), false), 12).unwrap();
        let got = words(&bytes);
        assert_eq!(got[3], 4);
        assert_eq!(&got[4..7], cigar.as_slice());
        assert_eq!(*got.last().unwrap(), (3 << 4) | 4);
    }

    #[test]
    fn reverse_strand_stores_complement() {
        use super::encode_record;
        use super::op;

        let bytes = encode_record(aln(0, 5, Some(vec![op::pack(5, op::MATCH)]), true), 5).unwrap();
        let stored = words(&bytes)[2] as i32;
        assert!(stored < 0);
        assert_eq!(!stored, 60);

        let bytes = encode_record(EngineAlignment { mapq: 0, reverse: true, ..aln(0, 5, None, true) }, 5).unwrap();
        assert_eq!(words(&bytes)[2] as i32, -1);
    }

    #[test]
    fn missing_cigar_has_no_words() {
        use super::encode_record;

        let bytes = encode_record(aln(2, 5, None, false), 10).unwrap();
        assert_eq!(words(&bytes), vec![3, 1000, 60, 0]);
    }

    #[test]
    fn read_back_decodes_strand_and_cigar() {
        use super::encode_record;
        use super::op;
        use super::Alignment;
        use std::io::Cursor;

        let record = aln(2, 8, Some(vec![op::pack(3, op::MATCH), op::pack(1, op::DELETION), op::pack(3, op::MATCH)]), true);
        let bytes = encode_record(record, 10).unwrap();

        let got = Alignment::read_from(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(got.ref_id, 3);
        assert_eq!(got.ref_start, 1000);
        assert!(got.reverse);
        assert_eq!(got.mapq, 60);
        assert_eq!(got.cigar_string(), "2S3M1D3M2S");
    }

    #[test]
    fn read_rejects_unknown_opcode() {
        use super::Alignment;
        use crate::error::BridgeError;
        use std::io::Cursor;

        let mut bytes: Vec<u8> = Vec::new();
        for word in [0_u32, 0, 1, 1, (5 << 4) | 9] {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        assert!(matches!(Alignment::read_from(&mut Cursor::new(bytes)), Err(BridgeError::Codec(_))));
    }

    #[test]
    fn decode_output_per_sequence() {
        use super::{decode_alignments, encode_record, op};

        let mut bytes: Vec<u8> = Vec::new();
        bytes.extend_from_slice(&2_u32.to_le_bytes());
        bytes.extend(encode_record(aln(0, 4, Some(vec![op::pack(4, op::MATCH)]), false), 4).unwrap());
        bytes.extend(encode_record(aln(0, 4, None, true), 4).unwrap());
        bytes.extend_from_slice(&0_u32.to_le_bytes());

        let got = decode_alignments(&bytes, 2).unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].len(), 2);
        assert_eq!(got[0][0].cigar_string(), "4M");
        assert_eq!(got[0][1].cigar_string(), "*");
        assert!(got[0][1].reverse);
        assert!(got[1].is_empty());
    }

    #[test]
    fn decode_output_checks_group_count() {
        use super::decode_alignments;
        use crate::error::BridgeError;

        let bytes = [0_u8; 8];
        assert_eq!(decode_alignments(&bytes, 2).unwrap(), vec![Vec::new(), Vec::new()]);
        assert!(matches!(decode_alignments(&bytes, 1), Err(BridgeError::Codec(_))));
        assert!(matches!(decode_alignments(&bytes, 3), Err(BridgeError::Codec(_))));
        assert!(decode_alignments(&[], 0).unwrap().is_empty());
    }

    #[test]
    fn decode_output_rejects_oversized_cigar_count() {
        use super::decode_alignments;
        use crate::error::BridgeError;

        let mut bytes: Vec<u8> = Vec::new();
        for word in [1_u32, 0, 0, 0, i32::MAX as u32] {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        assert!(matches!(decode_alignments(&bytes, 1), Err(BridgeError::Codec(_))));

        // record header cut short
        assert!(matches!(decode_alignments(&bytes[0..12], 1), Err(BridgeError::Codec(_))));

        // more alignments declared than the output holds
        let bytes = u32::MAX.to_le_bytes();
        assert!(matches!(decode_alignments(&bytes, 1), Err(BridgeError::Codec(_))));
    }
}
