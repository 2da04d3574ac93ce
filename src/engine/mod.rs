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

//! Alignment engine interface.
//!
//! An [AlignmentEngine] maps one query sequence against an [Index] and
//! returns zero or more [EngineAlignment] records. The engine may keep
//! reusable scratch state in a workspace, which is created at the start of a
//! batch from an [EngineConfig] and dropped when the batch ends. A
//! workspace belongs to exactly one in-flight batch.
//!
//! [ExactMatchEngine](exact::ExactMatchEngine) is a minimal engine that
//! reports exact occurrences of the whole query.

pub mod exact;

#[cfg(test)]
pub(crate) mod scripted;

use crate::index::Index;
use crate::options::MapOptions;

/// Per-batch engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineConfig {
    /// 0 is silent; higher values let the engine log more.
    pub verbosity: usize,
}

/// An alignment as produced by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineAlignment {
    pub ref_id: i32,
    /// 0-based start on the reference.
    pub ref_start: i32,
    pub mapq: i32,
    pub reverse: bool,
    /// Native CIGAR ops packed as `len << 4 | op`.
    ///
    /// None for approximate alignments that carry no base-level path.
    pub cigar: Option<Vec<u32>>,
    /// First aligned query base.
    pub query_start: u32,
    /// One past the last aligned query base.
    pub query_end: u32,
}

pub trait AlignmentEngine {
    type Workspace;

    /// Creates the scratch state for one batch.
    fn workspace(
        &self,
        config: &EngineConfig,
    ) -> Self::Workspace;

    /// Aligns `seq` against `index`.
    fn map(
        &self,
        index: &Index,
        seq: &[u8],
        opts: &MapOptions,
        workspace: &mut Self::Workspace,
    ) -> Vec<EngineAlignment>;
}
