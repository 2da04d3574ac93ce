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

//! Batch aggregation.
//!
//! Every sequence of a batch is aligned and its records are written into a
//! result group sized exactly to fit:
//!
//! ```text
//! [payload_len: u32][n_alignments: u32][record] ..
//! ```
//!
//! `payload_len` counts the bytes after itself. Only once every group has
//! been produced is the output allocated, and the groups are copied into it
//! in batch order without their `payload_len` prefix:
//!
//! ```text
//! [n_alignments_0: u32][records ..][n_alignments_1: u32][records ..] ..
//! ```
//!
//! If any group can't be produced, the groups produced so far are released
//! and no output is returned.

use crate::batch::read_word;
use crate::batch::SequenceBatch;
use crate::batch::WORD_LEN;
use crate::buffer::Allocator;
use crate::buffer::Block;
use crate::engine::AlignmentEngine;
use crate::engine::EngineConfig;
use crate::error::BridgeError;
use crate::index::Index;
use crate::options::MapOptions;
use crate::record::write_record;
use crate::record::RecordLayout;

use std::io::Write;

/// Progress of one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Encoding(usize),
    Verifying,
    Finalizing,
    Done,
    Aborted,
}

fn transition(
    state: &mut BatchState,
    next: BatchState,
) {
    log::debug!("batch {:?} -> {:?}", state, next);
    *state = next;
}

/// Payload length recorded in the prefix of a result group.
fn group_payload_len(
    group: &Block,
) -> usize {
    read_word(group.as_slice(), 0) as usize
}

/// Aligns `seq` and writes its result group.
fn encode_group<'a, G: AlignmentEngine>(
    engine: &G,
    workspace: &mut G::Workspace,
    index: &Index,
    opts: &MapOptions,
    seq: &[u8],
    allocator: &'a Allocator,
) -> Result<Block<'a>, BridgeError> {
    let query_len = seq.len() as u32;
    let alignments = engine.map(index, seq, opts, workspace);
    let layouts: Vec<RecordLayout> = alignments.iter().map(|aln| RecordLayout::plan(aln, query_len)).collect();

    let payload_len = WORD_LEN + layouts.iter().map(RecordLayout::encoded_len).sum::<usize>();
    let payload_word = u32::try_from(payload_len).map_err(|_| {
        BridgeError::Allocation(format!("{} bytes of alignments exceed the group size limit", payload_len))
    })?;

    let mut group = allocator.allocate(WORD_LEN + payload_len)?;
    group.write_all(&payload_word.to_le_bytes())?;
    group.write_all(&(alignments.len() as u32).to_le_bytes())?;
    for (aln, layout) in alignments.into_iter().zip(layouts.iter()) {
        write_record(aln, layout, &mut group)?;
    }

    if group.len() != group.reserved() {
        return Err(BridgeError::Codec(format!(
            "result group has {} bytes but {} were planned", group.len(), group.reserved()
        )));
    }
    Ok(group)
}

/// Aligns every sequence of `batch` and returns the concatenated output.
///
/// The engine workspace lives for exactly this call. A batch without
/// sequences produces an empty output.
///
/// ## Errors
///
/// Returns [BridgeError::Allocation] if a result group or the output can't
/// be allocated. Nothing allocated by this call outlives a failure.
pub fn align_batch<'a, G: AlignmentEngine>(
    engine: &G,
    index: &Index,
    opts: &MapOptions,
    batch: &SequenceBatch,
    config: &EngineConfig,
    allocator: &'a Allocator,
) -> Result<Block<'a>, BridgeError> {
    let mut state = BatchState::Encoding(0);
    let mut workspace = engine.workspace(config);
    let mut groups: Vec<Block<'a>> = Vec::with_capacity(batch.count());
    let mut failure: Option<(usize, BridgeError)> = None;

    for (seq_idx, seq) in batch.iter().enumerate() {
        transition(&mut state, BatchState::Encoding(seq_idx));
        match encode_group(engine, &mut workspace, index, opts, seq, allocator) {
            Ok(group) => groups.push(group),
            Err(err) => {
                failure = Some((seq_idx, err));
                break;
            },
        }
    }
    drop(workspace);

    transition(&mut state, BatchState::Verifying);
    if let Some((seq_idx, err)) = failure {
        transition(&mut state, BatchState::Aborted);
        log::warn!("Aborting batch of {} sequences at sequence {}: {}", batch.count(), seq_idx, err);
        return Err(err);
    }

    transition(&mut state, BatchState::Finalizing);
    let total = groups.iter().map(group_payload_len).try_fold(0_usize, |total, len| total.checked_add(len));
    let mut output = match total.map(|len| allocator.allocate(len)) {
        Some(Ok(output)) => output,
        Some(Err(err)) => {
            transition(&mut state, BatchState::Aborted);
            log::warn!("Aborting batch of {} sequences: {}", batch.count(), err);
            return Err(err);
        },
        None => {
            transition(&mut state, BatchState::Aborted);
            return Err(BridgeError::Allocation("can't size buffer for alignments".to_string()));
        },
    };
    for group in groups.iter() {
        output.write_all(&group.as_slice()[WORD_LEN..])?;
    }
    drop(groups);

    transition(&mut state, BatchState::Done);
    log::debug!("Aligned {} sequences into {} bytes", batch.count(), output.len());
    Ok(output)
}
