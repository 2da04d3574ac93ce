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

//! mm2batch is a library and a command-line client for aligning batches of
//! sequences against a reference index across a process or language
//! boundary.
//!
//! Everything that crosses the boundary is either an integer handle or a
//! flat little-endian byte buffer:
//!
//!   - Sequence batches: `[n: u32][len_0: u32] .. [len_n-1: u32][bases ..]`.
//!   - Options: a fixed 192-byte [MapOptions] record.
//!   - Alignment output: per sequence `[n_alignments: u32]` followed by that
//!     many records `[ref_id: i32][ref_start: i32][mapq_or_strand: i32][n_cigar: i32][cigar: u32 ..]`.
//!   - Reference names: every contig name followed by a NUL byte.
//!
//! Soft clips for the unaligned ends of a query are added to the CIGAR of
//! each record, and the strand is folded into the sign of `mapq_or_strand`
//! (a reverse strand record stores the bitwise complement of its map
//! quality).
//!
//! ## Usage
//!
//! ### Command line
//!
//! The mm2batch CLI supports the following subcommands:
//!   - `mm2batch index` build an index from a FASTA/FASTQ file and save it.
//!   - `mm2batch align` align the sequences in a FASTA/FASTQ file in batches.
//!   - `mm2batch names` print the contig names of an index.
//!   - `mm2batch version` print the library version.
//!
//! ### Rust API
//!
//! [Bridge] implements the boundary operations on handles. Every buffer it
//! returns belongs to the caller until released with
//! [destroy_buffer](Bridge::destroy_buffer).
//!
//! ```rust
//! use mm2batch::{Bridge, Contig, Index};
//! use mm2batch::{decode_alignments, required_len, write_batch};
//!
//! let mut bridge = Bridge::new();
//! let index = bridge.insert_index(Index::new(vec![
//!     Contig { name: "chr1".to_string(), seq: b"TTTTGATTACATTTT".to_vec() },
//! ], 15));
//! let options = bridge.create_options(index, Some("sr")).unwrap();
//!
//! // Pack the batch into a sequence buffer
//! let seqs = ["GATTACA", "CCCC"];
//! let sequences = bridge.create_sequence_buffer(required_len(&seqs) as u32).unwrap();
//! let mut slice = bridge.buffer_mut(sequences).unwrap();
//! write_batch(&seqs, &mut slice).unwrap();
//!
//! let output = bridge.align(index, options, sequences).unwrap();
//! let alignments = decode_alignments(bridge.buffer(output).unwrap(), seqs.len()).unwrap();
//! assert_eq!(alignments[0][0].ref_start, 4);
//! assert_eq!(alignments[0][0].cigar_string(), "7M");
//! assert!(alignments[1].is_empty());
//!
//! for handle in [output, sequences, options] {
//!     bridge.destroy_buffer(handle).unwrap();
//! }
//! assert_eq!(bridge.live_buffers(), 0);
//! ```
//!
//! [Aligner] wraps the same calls for a caller that only wants decoded
//! alignments:
//!
//! ```rust
//! use mm2batch::{Aligner, Bridge, Contig, Index};
//!
//! let mut bridge = Bridge::new();
//! let index = bridge.insert_index(Index::new(vec![
//!     Contig { name: "chr1".to_string(), seq: b"TTTTGATTACATTTT".to_vec() },
//! ], 15));
//!
//! let mut aligner = Aligner::new(&mut bridge, index, None).unwrap();
//! let alignments = aligner.align_seqs(&["TGTAATC"]).unwrap();
//! assert!(alignments[0][0].reverse);
//! assert_eq!(alignments[0][0].mapq, 60);
//! assert_eq!(aligner.reference_names().unwrap(), vec!["chr1".to_string()]);
//! ```
//!
//! Alignment itself is delegated to an [AlignmentEngine]. The built-in
//! [ExactMatchEngine] reports exact whole-query matches; other engines plug
//! in through [Bridge::with_engine].
//!
//! ### C++ API
//!
//! With the `cxxbridge` feature, the boundary operations are exported to C++
//! through an opaque `MapBridge` type. The API is available in `cxx_api`.
//!

pub mod aggregate;
pub mod aligner;
pub mod batch;
pub mod bridge;
pub mod buffer;
pub mod engine;
pub mod error;
pub mod index;
pub mod names;
pub mod options;
pub mod record;

#[cfg(feature = "cxxbridge")]
pub mod cxx_api;

pub use aligner::Aligner;
pub use batch::encode_batch;
pub use batch::required_len;
pub use batch::write_batch;
pub use batch::SequenceBatch;
pub use bridge::version;
pub use bridge::Bridge;
pub use bridge::IndexHandle;
pub use buffer::BufferHandle;
pub use engine::exact::ExactMatchEngine;
pub use engine::AlignmentEngine;
pub use engine::EngineAlignment;
pub use engine::EngineConfig;
pub use error::BridgeError;
pub use index::Contig;
pub use index::Index;
pub use names::decode_reference_names;
pub use options::MapOptions;
pub use options::Preset;
pub use record::decode_alignments;
pub use record::Alignment;
