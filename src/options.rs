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

//! Alignment options record.
//!
//! [MapOptions] is a fixed 192 byte record, encoded with bincode's
//! fixed-int little-endian configuration in the field order the engine
//! expects. Options are built from the library defaults, optionally
//! overridden by a [Preset], with [flags::CIGAR] always set and the
//! occurrence threshold derived from the [Index].

use crate::error::BridgeError;
use crate::index::Index;

use bincode::{Encode, Decode};
use bincode::encode_into_std_write;
use bincode::decode_from_slice;

/// Encoded size of [MapOptions].
pub const OPTIONS_LEN: usize = 192;

/// Bits of [MapOptions::flag].
pub mod flags {
    pub const NO_DIAG: i64 = 0x001;
    pub const NO_DUAL: i64 = 0x002;
    pub const CIGAR: i64 = 0x004;
    pub const OUT_SAM: i64 = 0x008;
    pub const NO_QUAL: i64 = 0x010;
    pub const OUT_CG: i64 = 0x020;
    pub const OUT_CS: i64 = 0x040;
    pub const SPLICE: i64 = 0x080;
    pub const SPLICE_FOR: i64 = 0x100;
    pub const SPLICE_REV: i64 = 0x200;
    pub const NO_LJOIN: i64 = 0x400;
    pub const OUT_CS_LONG: i64 = 0x800;
    pub const SR: i64 = 0x1000;
    pub const FRAG_MODE: i64 = 0x2000;
    pub const NO_PRINT_2ND: i64 = 0x4000;
    pub const TWO_IO_THREADS: i64 = 0x8000;
    pub const LONG_CIGAR: i64 = 0x10000;
    pub const INDEPEND_SEG: i64 = 0x20000;
    pub const SPLICE_FLANK: i64 = 0x40000;
    pub const SOFTCLIP: i64 = 0x80000;
    pub const FOR_ONLY: i64 = 0x100000;
    pub const REV_ONLY: i64 = 0x200000;
    pub const HEAP_SORT: i64 = 0x400000;
    pub const ALL_CHAINS: i64 = 0x800000;
    pub const OUT_MD: i64 = 0x1000000;
    pub const COPY_COMMENT: i64 = 0x2000000;
    pub const EQX: i64 = 0x4000000;
    pub const PAF_NO_HIT: i64 = 0x8000000;
    pub const NO_END_FLT: i64 = 0x10000000;
    pub const HARD_MLEVEL: i64 = 0x20000000;
    pub const SAM_HIT_ONLY: i64 = 0x40000000;
}

/// Named option sets for different kinds of data.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    AvaOnt,
    AvaPb,
    Map10k,
    MapPb,
    MapOnt,
    Asm5,
    Asm10,
    Asm20,
    Short,
    Sr,
    Splice,
    Cdna,
}

impl std::str::FromStr for Preset {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ava-ont" => Ok(Preset::AvaOnt),
            "ava-pb" => Ok(Preset::AvaPb),
            "map10k" => Ok(Preset::Map10k),
            "map-pb" => Ok(Preset::MapPb),
            "map-ont" => Ok(Preset::MapOnt),
            "asm5" => Ok(Preset::Asm5),
            "asm10" => Ok(Preset::Asm10),
            "asm20" => Ok(Preset::Asm20),
            "short" => Ok(Preset::Short),
            "sr" => Ok(Preset::Sr),
            "splice" => Ok(Preset::Splice),
            "cdna" => Ok(Preset::Cdna),
            _ => Err(BridgeError::UnknownPreset(format!("'{}' is not a valid Preset", s))),
        }
    }
}

impl Preset {
    pub fn name(&self) -> &'static str {
        match self {
            Preset::AvaOnt => "ava-ont",
            Preset::AvaPb => "ava-pb",
            Preset::Map10k => "map10k",
            Preset::MapPb => "map-pb",
            Preset::MapOnt => "map-ont",
            Preset::Asm5 => "asm5",
            Preset::Asm10 => "asm10",
            Preset::Asm20 => "asm20",
            Preset::Short => "short",
            Preset::Sr => "sr",
            Preset::Splice => "splice",
            Preset::Cdna => "cdna",
        }
    }

    /// k-mer length used when building an index for this preset.
    pub fn kmer_len(&self) -> usize {
        match self {
            Preset::AvaOnt | Preset::MapOnt | Preset::Splice | Preset::Cdna => 15,
            Preset::AvaPb | Preset::Map10k | Preset::MapPb => 19,
            Preset::Asm5 | Preset::Asm10 | Preset::Asm20 => 19,
            Preset::Short | Preset::Sr => 21,
        }
    }

    /// Overrides the fields this preset changes.
    ///
    /// `map10k`, `map-pb` and `map-ont` only change how the index is built.
    pub fn apply(
        &self,
        opts: &mut MapOptions,
    ) {
        match self {
            Preset::MapOnt | Preset::Map10k | Preset::MapPb => {},
            Preset::AvaOnt | Preset::AvaPb => {
                opts.flag |= flags::ALL_CHAINS | flags::NO_DIAG | flags::NO_DUAL | flags::NO_LJOIN;
                opts.min_chain_score = 100;
                opts.pri_ratio = 0.0;
                opts.max_gap = 10000;
                opts.max_chain_skip = 25;
            },
            Preset::Asm5 => {
                opts.a = 1; opts.b = 19; opts.q = 39; opts.q2 = 81; opts.e = 3; opts.e2 = 1;
                assembly_common(opts);
            },
            Preset::Asm10 => {
                opts.a = 1; opts.b = 9; opts.q = 16; opts.q2 = 41; opts.e = 2; opts.e2 = 1;
                assembly_common(opts);
            },
            Preset::Asm20 => {
                opts.a = 1; opts.b = 4; opts.q = 6; opts.q2 = 26; opts.e = 2; opts.e2 = 1;
                assembly_common(opts);
            },
            Preset::Short | Preset::Sr => {
                opts.flag |= flags::SR | flags::FRAG_MODE | flags::NO_PRINT_2ND | flags::TWO_IO_THREADS | flags::HEAP_SORT;
                opts.pe_ori = 1; // FR
                opts.a = 2; opts.b = 8; opts.q = 12; opts.e = 2; opts.q2 = 24; opts.e2 = 1;
                opts.zdrop = 100;
                opts.zdrop_inv = 100;
                opts.end_bonus = 10;
                opts.max_frag_len = 800;
                opts.max_gap = 100;
                opts.bw = 100;
                opts.pri_ratio = 0.5;
                opts.min_cnt = 2;
                opts.min_chain_score = 25;
                opts.min_dp_max = 40;
                opts.best_n = 20;
                opts.mid_occ = 1000;
                opts.max_occ = 5000;
                opts.mini_batch_size = 50000000;
            },
            Preset::Splice | Preset::Cdna => {
                opts.flag |= flags::SPLICE | flags::SPLICE_FOR | flags::SPLICE_REV | flags::SPLICE_FLANK;
                opts.max_gap = 2000;
                opts.max_gap_ref = 200000;
                opts.bw = 200000;
                opts.a = 1; opts.b = 2; opts.q = 2; opts.e = 1; opts.q2 = 32; opts.e2 = 0;
                opts.noncan = 9;
                opts.junc_bonus = 9;
                opts.zdrop = 200;
                opts.zdrop_inv = 100;
            },
        }
    }
}

fn assembly_common(
    opts: &mut MapOptions,
) {
    opts.zdrop = 200;
    opts.zdrop_inv = 200;
    opts.min_dp_max = 200;
    opts.best_n = 50;
}

/// Options controlling a single alignment batch.
#[derive(Encode, Decode, Debug, Clone, PartialEq)]
pub struct MapOptions {
    /// See [flags].
    pub flag: i64,
    pub seed: i32,
    /// Score threshold for SDUST masking, 0 disables.
    pub sdust_thres: i32,
    pub max_qlen: i32,
    pub bw: i32,
    /// Break a chain if there are no minimizers in a `max_gap` window.
    pub max_gap: i32,
    pub max_gap_ref: i32,
    pub max_frag_len: i32,
    pub max_chain_skip: i32,
    pub max_chain_iter: i32,
    /// Minimum number of minimizers on each chain.
    pub min_cnt: i32,
    pub min_chain_score: i32,
    pub mask_level: f32,
    pub pri_ratio: f32,
    /// Top `best_n` chains are subjected to DP alignment.
    pub best_n: i32,
    pub max_join_long: i32,
    pub max_join_short: i32,
    pub min_join_flank_sc: i32,
    pub min_join_flank_ratio: f32,
    /// Matching score.
    pub a: i32,
    /// Mismatch penalty.
    pub b: i32,
    /// Gap open penalty.
    pub q: i32,
    /// Gap extension penalty.
    pub e: i32,
    pub q2: i32,
    pub e2: i32,
    /// Score when one or both bases are `N`.
    pub sc_ambi: i32,
    /// Cost of non-canonical splice sites.
    pub noncan: i32,
    pub junc_bonus: i32,
    pub zdrop: i32,
    pub zdrop_inv: i32,
    pub end_bonus: i32,
    pub min_dp_max: i32,
    pub min_ksw_len: i32,
    pub anchor_ext_len: i32,
    pub anchor_ext_shift: i32,
    /// Drop an alignment if both ends are clipped above this ratio.
    pub max_clip_ratio: f32,
    pub pe_ori: i32,
    pub pe_bonus: i32,
    pub mid_occ_frac: f32,
    pub min_mid_occ: i32,
    /// Ignore seeds with more occurrences than this. Derived from the index when not positive.
    pub mid_occ: i32,
    pub max_occ: i32,
    pub mini_batch_size: i32,
    pub max_sw_mat: i64,
    /// Reserved, always zero.
    pub split_prefix: u64,
}

impl Default for MapOptions {
    fn default() -> Self {
        let min_chain_score = 40;
        let a = 2;
        MapOptions {
            flag: 0,
            seed: 11,
            sdust_thres: 0,
            max_qlen: 0,
            bw: 500,
            max_gap: 5000,
            max_gap_ref: -1,
            max_frag_len: 0,
            max_chain_skip: 25,
            max_chain_iter: 5000,
            min_cnt: 3,
            min_chain_score,
            mask_level: 0.5,
            pri_ratio: 0.8,
            best_n: 5,
            max_join_long: 20000,
            max_join_short: 2000,
            min_join_flank_sc: 1000,
            min_join_flank_ratio: 0.5,
            a,
            b: 4,
            q: 4,
            e: 2,
            q2: 24,
            e2: 1,
            sc_ambi: 1,
            noncan: 0,
            junc_bonus: 0,
            zdrop: 400,
            zdrop_inv: 200,
            end_bonus: -1,
            min_dp_max: min_chain_score * a,
            min_ksw_len: 200,
            anchor_ext_len: 20,
            anchor_ext_shift: 6,
            max_clip_ratio: 1.0,
            pe_ori: 0,
            pe_bonus: 33,
            mid_occ_frac: 2e-4,
            min_mid_occ: 10,
            mid_occ: 0,
            max_occ: 0,
            mini_batch_size: 500000000,
            max_sw_mat: 100000000,
            split_prefix: 0,
        }
    }
}

impl MapOptions {
    /// Builds the options for aligning against `index`.
    ///
    /// Starts from the defaults, applies `preset` if given, enables CIGAR
    /// generation and derives the index-dependent fields.
    pub fn for_index(
        index: &Index,
        preset: Option<Preset>,
    ) -> Self {
        let mut opts = MapOptions::default();
        if let Some(preset) = preset {
            preset.apply(&mut opts);
        }
        opts.flag |= flags::CIGAR;
        opts.update_for_index(index);
        opts
    }

    /// Applies the tuning that depends on the index contents.
    pub fn update_for_index(
        &mut self,
        index: &Index,
    ) {
        if self.flag & (flags::SPLICE_FOR | flags::SPLICE_REV) != 0 {
            self.flag |= flags::SPLICE;
        }
        if self.mid_occ <= 0 {
            self.mid_occ = index.occurrence_threshold(self.mid_occ_frac).max(self.min_mid_occ);
        }
    }

    pub fn has_flag(
        &self,
        flag: i64,
    ) -> bool {
        self.flag & flag != 0
    }

    pub fn encode(&self) -> Result<Vec<u8>, BridgeError> {
        let mut bytes: Vec<u8> = Vec::with_capacity(OPTIONS_LEN);
        let nbytes = encode_into_std_write(
            self,
            &mut bytes,
            bincode::config::standard().with_fixed_int_encoding(),
        )?;
        if nbytes != OPTIONS_LEN {
            return Err(BridgeError::Codec(format!("options record encoded to {} bytes, expected {}", nbytes, OPTIONS_LEN)));
        }
        Ok(bytes)
    }

    pub fn decode(
        bytes: &[u8],
    ) -> Result<Self, BridgeError> {
        if bytes.len() != OPTIONS_LEN {
            return Err(BridgeError::Codec(format!(
                "options buffer is {} bytes, expected {}; wrong engine version?", bytes.len(), OPTIONS_LEN
            )));
        }
        Ok(decode_from_slice(bytes, bincode::config::standard().with_fixed_int_encoding())?.0)
    }
}
