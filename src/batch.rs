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

//! Sequence batch layout.
//!
//! A batch is a flat little-endian buffer:
//!
//! ```text
//! [count: u32][length_0: u32] .. [length_{count-1}: u32][bases of seq_0][bases of seq_1]..
//! ```
//!
//! [SequenceBatch] is a view over a batch and never copies the bases.
//! [required_len] and [write_batch] fill a buffer on the host side.

use crate::error::BridgeError;

use std::io::Write;

/// Size of one count or length word.
pub const WORD_LEN: usize = 4;

pub(crate) fn read_word(
    bytes: &[u8],
    offset: usize,
) -> u32 {
    let mut word = [0_u8; WORD_LEN];
    word.copy_from_slice(&bytes[offset..(offset + WORD_LEN)]);
    u32::from_le_bytes(word)
}

/// Zero-copy view over an encoded sequence batch.
#[derive(Debug, Clone, Copy)]
pub struct SequenceBatch<'a> {
    count: usize,
    lengths: &'a [u8],
    bases: &'a [u8],
}

impl<'a> SequenceBatch<'a> {
    /// Locates the length table and the base region of `bytes`.
    ///
    /// ## Errors
    ///
    /// Returns [BridgeError::MalformedBatch] if the count prefix, the length
    /// table and the declared bases do not fill `bytes` exactly.
    pub fn new(
        bytes: &'a [u8],
    ) -> Result<Self, BridgeError> {
        if bytes.len() < WORD_LEN {
            return Err(BridgeError::MalformedBatch(format!(
                "buffer of {} bytes is too short for a sequence count", bytes.len()
            )));
        }
        let count = read_word(bytes, 0) as usize;

        let table_end = count.checked_mul(WORD_LEN)
            .and_then(|table_len| table_len.checked_add(WORD_LEN))
            .filter(|end| *end <= bytes.len())
            .ok_or_else(|| BridgeError::MalformedBatch(format!(
                "length table for {} sequences does not fit in {} bytes", count, bytes.len()
            )))?;

        let lengths = &bytes[WORD_LEN..table_end];
        let bases = &bytes[table_end..];

        let declared: u64 = lengths.chunks_exact(WORD_LEN).map(|word| read_word(word, 0) as u64).sum();
        if declared != bases.len() as u64 {
            return Err(BridgeError::MalformedBatch(format!(
                "{} sequences declare {} bases but the buffer holds {}", count, declared, bases.len()
            )));
        }

        Ok(SequenceBatch { count, lengths, bases })
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Length of the sequence at `idx`, if it exists.
    pub fn length(
        &self,
        idx: usize,
    ) -> Option<u32> {
        self.lengths.chunks_exact(WORD_LEN).nth(idx).map(|word| read_word(word, 0))
    }

    /// Bases of the sequence at `idx`, if it exists.
    pub fn sequence(
        &self,
        idx: usize,
    ) -> Option<&'a [u8]> {
        self.iter().nth(idx)
    }

    /// Sequences in batch order.
    pub fn iter(&self) -> SequenceIter<'a> {
        SequenceIter { lengths: self.lengths.chunks_exact(WORD_LEN), bases: self.bases }
    }
}

impl<'a> IntoIterator for &SequenceBatch<'a> {
    type Item = &'a [u8];
    type IntoIter = SequenceIter<'a>;

    fn into_iter(self) -> SequenceIter<'a> {
        self.iter()
    }
}

pub struct SequenceIter<'a> {
    lengths: std::slice::ChunksExact<'a, u8>,
    bases: &'a [u8],
}

impl<'a> Iterator for SequenceIter<'a> {
    type Item = &'a [u8];

    fn next(
        &mut self,
    ) -> Option<&'a [u8]> {
        let len = read_word(self.lengths.next()?, 0) as usize;
        let (seq, rest) = self.bases.split_at(len);
        self.bases = rest;
        Some(seq)
    }
}

/// Number of bytes needed to encode `seqs` as a batch.
pub fn required_len<S: AsRef<[u8]>>(
    seqs: &[S],
) -> usize {
    WORD_LEN * (seqs.len() + 1) + seqs.iter().map(|seq| seq.as_ref().len()).sum::<usize>()
}

/// Writes `seqs` in batch layout to `conn`.
///
/// `conn` is typically the slice of a buffer created with
/// [create_sequence_buffer](crate::Bridge::create_sequence_buffer) of
/// [required_len] bytes.
pub fn write_batch<S: AsRef<[u8]>, W: Write>(
    seqs: &[S],
    conn: &mut W,
) -> Result<(), BridgeError> {
    let count = u32::try_from(seqs.len()).map_err(|_| {
        BridgeError::MalformedBatch(format!("{} sequences do not fit in a batch", seqs.len()))
    })?;
    conn.write_all(&count.to_le_bytes())?;

    for seq in seqs {
        let len = u32::try_from(seq.as_ref().len()).map_err(|_| {
            BridgeError::MalformedBatch(format!("sequence of {} bases is too long", seq.as_ref().len()))
        })?;
        conn.write_all(&len.to_le_bytes())?;
    }
    for seq in seqs {
        conn.write_all(seq.as_ref())?;
    }

    Ok(())
}

/// Encodes `seqs` into a new vector.
pub fn encode_batch<S: AsRef<[u8]>>(
    seqs: &[S],
) -> Result<Vec<u8>, BridgeError> {
    let mut bytes: Vec<u8> = Vec::with_capacity(required_len(seqs));
    write_batch(seqs, &mut bytes)?;
    Ok(bytes)
}

// Tests
#[cfg(test)]
mod tests {

    #[test]
    fn decode_recovers_lengths_and_bases() {
        use super::encode_batch;
        use super::required_len;
        use super::SequenceBatch;

        let seqs: Vec<&[u8]> = vec![&b"ACGTACGTAC"[..], &b""[..], &b"GATTACA"[..]];
        let bytes = encode_batch(&seqs).unwrap();
        assert_eq!(bytes.len(), required_len(&seqs));
        assert_eq!(bytes.len(), 4 * 4 + 17);

        let batch = SequenceBatch::new(&bytes).unwrap();
        assert_eq!(batch.count(), 3);
        assert_eq!(batch.length(0), Some(10));
        assert_eq!(batch.length(1), Some(0));
        assert_eq!(batch.length(2), Some(7));
        assert_eq!(batch.length(3), None);
        assert_eq!(batch.length(usize::MAX), None);

        let got: Vec<&[u8]> = batch.iter().collect();
        assert_eq!(got, seqs);
        assert_eq!(batch.sequence(2), Some(&b"GATTACA"[..]));
        assert_eq!(batch.sequence(3), None);
    }

    #[test]
    fn layout_matches_wire_format() {
        use super::encode_batch;

        let bytes = encode_batch(&[b"AC".to_vec(), b"G".to_vec()]).unwrap();
        let expected: Vec<u8> = vec![
            2, 0, 0, 0,
            2, 0, 0, 0,
            1, 0, 0, 0,
            b'A', b'C', b'G',
        ];
        assert_eq!(bytes, expected);
    }

    #[test]
    fn empty_batch_is_valid() {
        use super::SequenceBatch;

        let bytes = vec![0_u8, 0, 0, 0];
        let batch = SequenceBatch::new(&bytes).unwrap();
        assert!(batch.is_empty());
        assert_eq!(batch.iter().count(), 0);
    }

    #[test]
    fn write_into_fixed_slice() {
        use super::required_len;
        use super::write_batch;
        use super::SequenceBatch;

        let seqs = vec!["ACGT", "TT"];
        let mut buffer = vec![0_u8; required_len(&seqs)];
        let mut slice: &mut [u8] = buffer.as_mut_slice();
        write_batch(&seqs, &mut slice).unwrap();

        let batch = SequenceBatch::new(&buffer).unwrap();
        assert_eq!(batch.iter().collect::<Vec<&[u8]>>(), vec![&b"ACGT"[..], &b"TT"[..]]);
    }

    #[test]
    fn rejects_short_buffer() {
        use super::SequenceBatch;
        use crate::error::BridgeError;

        assert!(matches!(SequenceBatch::new(&[1, 0]), Err(BridgeError::MalformedBatch(_))));
    }

    #[test]
    fn rejects_length_table_past_end() {
        use super::SequenceBatch;
        use crate::error::BridgeError;

        let bytes = vec![3_u8, 0, 0, 0, 1, 0, 0, 0];
        assert!(matches!(SequenceBatch::new(&bytes), Err(BridgeError::MalformedBatch(_))));
    }

    #[test]
    fn rejects_bases_not_filling_buffer() {
        use super::encode_batch;
        use super::SequenceBatch;
        use crate::error::BridgeError;

        let mut bytes = encode_batch(&["ACGT"]).unwrap();
        bytes.push(b'A');
        assert!(matches!(SequenceBatch::new(&bytes), Err(BridgeError::MalformedBatch(_))));

        bytes.truncate(bytes.len() - 2);
        assert!(matches!(SequenceBatch::new(&bytes), Err(BridgeError::MalformedBatch(_))));
    }
}
