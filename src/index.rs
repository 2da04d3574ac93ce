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

//! Reference index.
//!
//! An [Index] holds the reference contigs in index order. It is read-only
//! once loaded and is shared between alignment batches.
//!
//! [Index::open] accepts either a fasta/fastq file (optionally gzipped) or
//! an index written by [Index::save]. A saved index is the 4 byte magic
//! [INDEX_MAGIC] followed by the gzipped bincode encoding of the index.

use crate::error::BridgeError;

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::io::BufWriter;
use std::io::Read;
use std::io::Seek;
use std::io::Write;
use std::path::Path;

use bincode::{Encode, Decode};
use bincode::encode_into_std_write;
use bincode::decode_from_std_read;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

pub const INDEX_MAGIC: &[u8; 4] = b"MM2B";

/// k-mer length of an index built without a preset.
pub const DEFAULT_KMER_LEN: usize = 15;

/// A named reference sequence.
#[derive(Encode, Decode, Debug, Clone, PartialEq, Eq)]
pub struct Contig {
    pub name: String,
    pub seq: Vec<u8>,
}

#[derive(Encode, Decode, Debug, Clone, PartialEq, Eq)]
pub struct Index {
    contigs: Vec<Contig>,
    kmer_len: u32,
}

impl Index {
    pub fn new(
        contigs: Vec<Contig>,
        kmer_len: usize,
    ) -> Self {
        Index { contigs, kmer_len: kmer_len as u32 }
    }

    /// Loads an index from `path`.
    ///
    /// ## Errors
    ///
    /// Returns [BridgeError::Io] if the file is missing, unreadable or
    /// neither a saved index nor a fastX file.
    pub fn open<P: AsRef<Path>>(
        path: P,
    ) -> Result<Self, BridgeError> {
        let path = path.as_ref();
        let mut conn = File::open(path).map_err(|err| {
            BridgeError::Io(format!("can't open index file {}: {}", path.display(), err))
        })?;

        let mut magic = [0_u8; 4];
        let is_saved = conn.read_exact(&mut magic).is_ok() && &magic == INDEX_MAGIC;
        if is_saved {
            conn.rewind()?;
            let mut reader = BufReader::new(conn);
            Index::read_from(&mut reader).map_err(|err| {
                BridgeError::Io(format!("can't read index file {}: {}", path.display(), err.message()))
            })
        } else {
            Index::from_fastx(path, DEFAULT_KMER_LEN)
        }
    }

    /// Builds an index from the records of a fasta or fastq file.
    ///
    /// Contig names are the first whitespace separated word of each header.
    pub fn from_fastx<P: AsRef<Path>>(
        path: P,
        kmer_len: usize,
    ) -> Result<Self, BridgeError> {
        let path = path.as_ref();
        let mut reader = needletail::parse_fastx_file(path).map_err(|err| {
            BridgeError::Io(format!("can't read index file {}: {}", path.display(), err))
        })?;

        let mut contigs: Vec<Contig> = Vec::new();
        while let Some(record) = reader.next() {
            let record = record.map_err(|err| {
                BridgeError::Io(format!("can't read index file {}: {}", path.display(), err))
            })?;
            let id = String::from_utf8_lossy(record.id()).to_string();
            let name = id.split_whitespace().next().unwrap_or_default().to_string();
            let seq = record.seq().to_ascii_uppercase();
            contigs.push(Contig { name, seq });
        }
        log::info!("Read {} contigs from {}", contigs.len(), path.display());

        Ok(Index::new(contigs, kmer_len))
    }

    pub fn save<P: AsRef<Path>>(
        &self,
        path: P,
    ) -> Result<(), BridgeError> {
        let f = File::create(path.as_ref())?;
        let mut conn = BufWriter::new(f);
        self.write_to(&mut conn)?;
        conn.flush()?;
        Ok(())
    }

    pub fn write_to<W: Write>(
        &self,
        conn: &mut W,
    ) -> Result<(), BridgeError> {
        conn.write_all(INDEX_MAGIC)?;
        let mut encoder = GzEncoder::new(conn, Compression::default());
        encode_into_std_write(self, &mut encoder, bincode::config::standard())?;
        encoder.finish()?;
        Ok(())
    }

    pub fn read_from<R: Read>(
        conn: &mut R,
    ) -> Result<Self, BridgeError> {
        let mut magic = [0_u8; 4];
        conn.read_exact(&mut magic)?;
        if &magic != INDEX_MAGIC {
            return Err(BridgeError::Codec("not a saved index".to_string()));
        }
        let mut decoder = GzDecoder::new(conn);
        Ok(decode_from_std_read(&mut decoder, bincode::config::standard())?)
    }

    pub fn contigs(&self) -> &[Contig] {
        &self.contigs
    }

    pub fn len(&self) -> usize {
        self.contigs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contigs.is_empty()
    }

    pub fn kmer_len(&self) -> usize {
        self.kmer_len as usize
    }

    /// Contig names in index order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.contigs.iter().map(|contig| contig.name.as_str())
    }

    pub fn name(
        &self,
        ref_id: usize,
    ) -> Option<&str> {
        self.contigs.get(ref_id).map(|contig| contig.name.as_str())
    }

    /// Occurrence count above which a k-mer is considered repetitive.
    ///
    /// The count at the `1 - frac` quantile of distinct k-mer counts, plus
    /// one. A non-positive `frac` disables the threshold.
    pub fn occurrence_threshold(
        &self,
        frac: f32,
    ) -> i32 {
        if frac <= 0.0 {
            return i32::MAX;
        }
        let k = self.kmer_len();
        let mut counts: HashMap<&[u8], u32> = HashMap::new();
        self.contigs.iter().filter(|contig| k > 0 && contig.seq.len() >= k).for_each(|contig| {
            contig.seq.windows(k).for_each(|kmer| {
                *counts.entry(kmer).or_insert(0) += 1;
            });
        });
        if counts.is_empty() {
            return 1;
        }

        let mut sorted: Vec<u32> = counts.into_values().collect();
        sorted.sort_unstable();
        let idx = (((1.0 - frac as f64) * sorted.len() as f64) as usize).min(sorted.len() - 1);
        sorted[idx].saturating_add(1).min(i32::MAX as u32) as i32
    }
}

// Tests
#[cfg(test)]
mod tests {

    fn write_temp(
        name: &str,
        contents: &[u8],
    ) -> std::path::PathBuf {
        use std::io::Write;
        let path = std::env::temp_dir().join(format!("mm2batch-{}-{}", std::process::id(), name));
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents).unwrap();
        path
    }

    #[test]
    fn open_fasta_reads_names_in_order() {
        use super::Index;

        let path = write_temp("ref.fa", b">chr1 first contig\nACGTAC\ngtac\n>chr2\nTTTT\n");
        let index = Index::open(&path).unwrap();

        assert_eq!(index.names().collect::<Vec<&str>>(), vec!["chr1", "chr2"]);
        assert_eq!(index.contigs()[0].seq, b"ACGTACGTAC".to_vec());
        assert_eq!(index.name(1), Some("chr2"));
        assert_eq!(index.name(2), None);

        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn open_missing_file_is_io_error() {
        use super::Index;
        use crate::error::BridgeError;

        let got = Index::open("/nonexistent/mm2batch/ref.fa");
        assert!(matches!(got, Err(BridgeError::Io(_))));
    }

    #[test]
    fn saved_index_reopens_unchanged() {
        use super::{Contig, Index};

        let index = Index::new(vec![
            Contig { name: "chr1".to_string(), seq: b"ACGTTGCA".to_vec() },
            Contig { name: "plasmid".to_string(), seq: b"GGGCCC".to_vec() },
        ], 19);

        let path = std::env::temp_dir().join(format!("mm2batch-{}-saved.mm2b", std::process::id()));
        index.save(&path).unwrap();
        let got = Index::open(&path).unwrap();
        assert_eq!(got, index);
        assert_eq!(got.kmer_len(), 19);

        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn read_from_rejects_other_magic() {
        use super::Index;
        use crate::error::BridgeError;
        use std::io::Cursor;

        let mut conn = Cursor::new(b"NOPE and more".to_vec());
        assert!(matches!(Index::read_from(&mut conn), Err(BridgeError::Codec(_))));
    }

    #[test]
    fn occurrence_threshold_counts_repeats() {
        use super::{Contig, Index};

        let index = Index::new(vec![
            Contig { name: "rep".to_string(), seq: b"AAAAAAAA".to_vec() },
        ], 4);
        // 5 occurrences of AAAA
        assert_eq!(index.occurrence_threshold(2e-4), 6);
        assert_eq!(index.occurrence_threshold(0.0), i32::MAX);

        let empty = Index::new(Vec::new(), 4);
        assert_eq!(empty.occurrence_threshold(2e-4), 1);
    }
}
