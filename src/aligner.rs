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

//! Host-side aligner.
//!
//! Drives the [Bridge] the way a caller across the boundary would: it
//! keeps one options buffer alive, packs each batch into a sequence
//! buffer, decodes the output and releases every buffer it created.

use crate::batch::required_len;
use crate::batch::write_batch;
use crate::bridge::Bridge;
use crate::bridge::IndexHandle;
use crate::buffer::BufferHandle;
use crate::engine::AlignmentEngine;
use crate::error::BridgeError;
use crate::names::decode_reference_names;
use crate::options::MapOptions;
use crate::options::Preset;
use crate::options::OPTIONS_LEN;
use crate::record::decode_alignments;
use crate::record::Alignment;

pub struct Aligner<'a, G: AlignmentEngine> {
    bridge: &'a mut Bridge<G>,
    index: IndexHandle,
    options: BufferHandle,
}

impl<'a, G: AlignmentEngine> Aligner<'a, G> {
    /// Creates an aligner for `index` with options from `preset`.
    pub fn new(
        bridge: &'a mut Bridge<G>,
        index: IndexHandle,
        preset: Option<Preset>,
    ) -> Result<Self, BridgeError> {
        let options = bridge.create_options(index, preset.as_ref().map(Preset::name))?;
        let len = bridge.buffer(options)?.len();
        if len != OPTIONS_LEN {
            bridge.destroy_buffer(options)?;
            return Err(BridgeError::Codec(format!(
                "options buffer is {} bytes, expected {}; wrong engine version?", len, OPTIONS_LEN
            )));
        }

        Ok(Aligner { bridge, index, options })
    }

    pub fn options(&self) -> Result<MapOptions, BridgeError> {
        MapOptions::decode(self.bridge.buffer(self.options)?)
    }

    /// Overwrites the options used for subsequent batches.
    pub fn set_options(
        &mut self,
        opts: &MapOptions,
    ) -> Result<(), BridgeError> {
        let bytes = opts.encode()?;
        self.bridge.buffer_mut(self.options)?.copy_from_slice(&bytes);
        Ok(())
    }

    /// Aligns `seqs` as one batch.
    ///
    /// Returns the alignments of each sequence in input order.
    pub fn align_seqs<S: AsRef<[u8]>>(
        &mut self,
        seqs: &[S],
    ) -> Result<Vec<Vec<Alignment>>, BridgeError> {
        let len = required_len(seqs);
        let len = u32::try_from(len).map_err(|_| {
            BridgeError::MalformedBatch(format!("batch of {} bytes is too large", len))
        })?;
        let sequences = self.bridge.create_sequence_buffer(len)?;

        let res = self.align_in(sequences, seqs);
        let released = self.bridge.destroy_buffer(sequences);

        let alignments = res?;
        released?;
        Ok(alignments)
    }

    fn align_in<S: AsRef<[u8]>>(
        &mut self,
        sequences: BufferHandle,
        seqs: &[S],
    ) -> Result<Vec<Vec<Alignment>>, BridgeError> {
        let mut slice = self.bridge.buffer_mut(sequences)?;
        write_batch(seqs, &mut slice)?;

        let output = self.bridge.align(self.index, self.options, sequences)?;
        let decoded = self.bridge.buffer(output).and_then(|bytes| decode_alignments(bytes, seqs.len()));
        self.bridge.destroy_buffer(output)?;

        decoded
    }

    /// Contig names of the index, in index order.
    pub fn reference_names(&mut self) -> Result<Vec<String>, BridgeError> {
        let handle = self.bridge.reference_names(self.index)?;
        let names = self.bridge.buffer(handle).map(decode_reference_names);
        self.bridge.destroy_buffer(handle)?;
        names
    }

    pub fn reference_name(
        &self,
        ref_id: i32,
    ) -> Result<Option<String>, BridgeError> {
        self.bridge.reference_name(self.index, ref_id)
    }
}

impl<G: AlignmentEngine> Drop for Aligner<'_, G> {
    fn drop(&mut self) {
        if let Err(e) = self.bridge.destroy_buffer(self.options) {
            log::warn!("Failed to release options buffer: {}", e);
        }
    }
}
