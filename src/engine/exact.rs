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

//! Exact-match alignment engine.
//!
//! Finds every occurrence of the whole query on either strand. It is enough
//! to drive the boundary end to end but does no seeding or extension.

use crate::engine::AlignmentEngine;
use crate::engine::EngineAlignment;
use crate::engine::EngineConfig;
use crate::index::Index;
use crate::options::flags;
use crate::options::MapOptions;
use crate::record::op;

/// Reports exact occurrences of the whole query on either strand.
///
/// A unique hit gets map quality 60, repeated hits get 0. At most
/// `best_n` hits are returned, forward strand first.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactMatchEngine;

pub struct ExactWorkspace {
    query: Vec<u8>,
    revcomp: Vec<u8>,
    verbosity: usize,
}

fn complement(
    base: u8,
) -> u8 {
    match base {
        b'A' => b'T',
        b'C' => b'G',
        b'G' => b'C',
        b'T' => b'A',
        _ => b'N',
    }
}

fn find_all(
    haystack: &[u8],
    needle: &[u8],
    mut hit: impl FnMut(usize),
) {
    haystack.windows(needle.len()).enumerate()
        .filter(|(_, window)| *window == needle)
        .for_each(|(pos, _)| hit(pos));
}

impl AlignmentEngine for ExactMatchEngine {
    type Workspace = ExactWorkspace;

    fn workspace(
        &self,
        config: &EngineConfig,
    ) -> ExactWorkspace {
        ExactWorkspace { query: Vec::new(), revcomp: Vec::new(), verbosity: config.verbosity }
    }

    fn map(
        &self,
        index: &Index,
        seq: &[u8],
        opts: &MapOptions,
        workspace: &mut ExactWorkspace,
    ) -> Vec<EngineAlignment> {
        if seq.is_empty() {
            return Vec::new();
        }

        workspace.query.clear();
        workspace.query.extend(seq.iter().map(|base| base.to_ascii_uppercase()));
        workspace.revcomp.clear();
        workspace.revcomp.extend(workspace.query.iter().rev().map(|base| complement(*base)));
        let palindrome = workspace.query == workspace.revcomp;

        let mut hits: Vec<(i32, i32, bool)> = Vec::new();
        for (ref_id, contig) in index.contigs().iter().enumerate() {
            if !opts.has_flag(flags::REV_ONLY) {
                find_all(&contig.seq, &workspace.query, |pos| hits.push((ref_id as i32, pos as i32, false)));
            }
            if !opts.has_flag(flags::FOR_ONLY) && !palindrome {
                find_all(&contig.seq, &workspace.revcomp, |pos| hits.push((ref_id as i32, pos as i32, true)));
            }
        }

        let mapq = if hits.len() == 1 { 60 } else { 0 };
        let n_hits = hits.len();
        hits.truncate(opts.best_n.max(1) as usize);

        if workspace.verbosity > 1 {
            log::debug!("query of {} bases: {} exact hits, reporting {}", seq.len(), n_hits, hits.len());
        }

        let len = seq.len() as u32;
        let cigar = if opts.has_flag(flags::CIGAR) { Some(vec![op::pack(len, op::MATCH)]) } else { None };

        hits.into_iter().map(|(ref_id, ref_start, reverse)| {
            EngineAlignment {
                ref_id, ref_start, mapq, reverse,
                cigar: cigar.clone(),
                query_start: 0,
                query_end: len,
            }
        }).collect()
    }
}

// Tests
#[cfg(test)]
mod tests {

    fn test_index() -> crate::index::Index {
        use crate::index::{Contig, Index};
        Index::new(vec![
            Contig { name: "chr1".to_string(), seq: b"TTTTGATTACATTTT".to_vec() },
            Contig { name: "chr2".to_string(), seq: b"CCCCCCCCCC".to_vec() },
        ], 15)
    }

    #[test]
    fn unique_forward_hit() {
        use super::ExactMatchEngine;
        use crate::engine::{AlignmentEngine, EngineAlignment, EngineConfig};
        use crate::options::MapOptions;

        let index = test_index();
        let opts = MapOptions::for_index(&index, None);
        let engine = ExactMatchEngine;
        let mut workspace = engine.workspace(&EngineConfig::default());

        let got = engine.map(&index, b"gattaca", &opts, &mut workspace);
        let expected = vec![EngineAlignment {
            ref_id: 0, ref_start: 4, mapq: 60, reverse: false,
            cigar: Some(vec![7 << 4]), query_start: 0, query_end: 7,
        }];
        assert_eq!(got, expected);
    }

    #[test]
    fn reverse_complement_hit() {
        use super::ExactMatchEngine;
        use crate::engine::{AlignmentEngine, EngineConfig};
        use crate::options::MapOptions;

        let index = test_index();
        let opts = MapOptions::for_index(&index, None);
        let engine = ExactMatchEngine;
        let mut workspace = engine.workspace(&EngineConfig::default());

        // reverse complement of GATTACA
        let got = engine.map(&index, b"TGTAATC", &opts, &mut workspace);
        assert_eq!(got.len(), 1);
        assert!(got[0].reverse);
        assert_eq!(got[0].ref_start, 4);
    }

    #[test]
    fn repeated_hits_have_zero_mapq_and_respect_best_n() {
        use super::ExactMatchEngine;
        use crate::engine::{AlignmentEngine, EngineConfig};
        use crate::options::MapOptions;

        let index = test_index();
        let mut opts = MapOptions::for_index(&index, None);
        opts.best_n = 2;
        let engine = ExactMatchEngine;
        let mut workspace = engine.workspace(&EngineConfig::default());

        let got = engine.map(&index, b"CCCC", &opts, &mut workspace);
        assert_eq!(got.len(), 2);
        assert!(got.iter().all(|aln| aln.mapq == 0 && aln.ref_id == 1));
    }

    #[test]
    fn no_cigar_without_flag() {
        use super::ExactMatchEngine;
        use crate::engine::{AlignmentEngine, EngineConfig};
        use crate::options::MapOptions;

        let index = test_index();
        let opts = MapOptions::default();
        let engine = ExactMatchEngine;
        let mut workspace = engine.workspace(&EngineConfig::default());

        let got = engine.map(&index, b"GATTACA", &opts, &mut workspace);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].cigar, None);
        assert!(engine.map(&index, b"", &opts, &mut workspace).is_empty());
        assert!(engine.map(&index, b"GGGGGGGGGGGGGGGGGGGGG", &opts, &mut workspace).is_empty());
    }

    #[test]
    fn workspace_takes_batch_verbosity() {
        use super::ExactMatchEngine;
        use crate::engine::{AlignmentEngine, EngineConfig};

        let engine = ExactMatchEngine;
        assert_eq!(engine.workspace(&EngineConfig::default()).verbosity, 0);
        assert_eq!(engine.workspace(&EngineConfig { verbosity: 2 }).verbosity, 2);
    }
}
