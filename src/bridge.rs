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

//! Boundary operations.
//!
//! A [Bridge] owns the index handle table, the buffer handle table and the
//! alignment engine. Handles are plain integers so they can cross a
//! language boundary; handle `0` is null for both kinds.
//!
//! Buffers returned by [create_options](Bridge::create_options),
//! [create_sequence_buffer](Bridge::create_sequence_buffer),
//! [align](Bridge::align) and [reference_names](Bridge::reference_names)
//! belong to the caller, who releases each of them exactly once with
//! [destroy_buffer](Bridge::destroy_buffer). A failed call returns no
//! buffer and leaves nothing allocated.

use crate::aggregate::align_batch;
use crate::batch::SequenceBatch;
use crate::buffer::BufferHandle;
use crate::buffer::BufferManager;
use crate::engine::AlignmentEngine;
use crate::engine::EngineConfig;
use crate::engine::exact::ExactMatchEngine;
use crate::error::BridgeError;
use crate::index::Index;
use crate::names::encode_reference_names;
use crate::options::MapOptions;
use crate::options::Preset;
use crate::options::OPTIONS_LEN;

use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use indexmap::IndexMap;

/// Boundary-visible reference to a loaded [Index].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexHandle(pub u64);

impl IndexHandle {
    pub const NULL: IndexHandle = IndexHandle(0);

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

/// Prefixes allocation failures with what was being allocated.
fn allocating(
    what: &str,
) -> impl Fn(BridgeError) -> BridgeError + '_ {
    move |err| match err {
        BridgeError::Allocation(msg) => BridgeError::Allocation(format!("can't allocate memory for {}: {}", what, msg)),
        other => other,
    }
}

/// Version of this library.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub struct Bridge<G: AlignmentEngine = ExactMatchEngine> {
    engine: G,
    config: EngineConfig,
    indexes: IndexMap<u64, Arc<Index>>,
    next_index: u64,
    buffers: BufferManager,
}

impl Bridge<ExactMatchEngine> {
    pub fn new() -> Self {
        Bridge::with_engine(ExactMatchEngine)
    }
}

impl Default for Bridge<ExactMatchEngine> {
    fn default() -> Self {
        Bridge::new()
    }
}

impl<G: AlignmentEngine> Bridge<G> {
    pub fn with_engine(
        engine: G,
    ) -> Self {
        Bridge {
            engine,
            config: EngineConfig::default(),
            indexes: IndexMap::new(),
            next_index: 1,
            buffers: BufferManager::new(),
        }
    }

    /// Caps the bytes held by live buffers.
    ///
    /// Replaces the buffer table, so call this before creating buffers.
    pub fn with_memory_limit(
        mut self,
        limit: usize,
    ) -> Self {
        self.buffers = BufferManager::with_limit(limit);
        self
    }

    /// Configuration handed to the engine at the start of every batch.
    pub fn with_config(
        mut self,
        config: EngineConfig,
    ) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn engine(&self) -> &G {
        &self.engine
    }

    /// Loads the index at `path`.
    pub fn open_index<P: AsRef<Path>>(
        &mut self,
        path: P,
    ) -> Result<IndexHandle, BridgeError> {
        let index = Index::open(path)?;
        Ok(self.insert_index(index))
    }

    /// Registers an index that is already in memory.
    pub fn insert_index(
        &mut self,
        index: Index,
    ) -> IndexHandle {
        let id = self.next_index;
        self.next_index += 1;
        self.indexes.insert(id, Arc::new(index));
        IndexHandle(id)
    }

    pub fn destroy_index(
        &mut self,
        handle: IndexHandle,
    ) -> Result<(), BridgeError> {
        if handle.is_null() {
            return Err(BridgeError::InvalidHandle("can't close null index".to_string()));
        }
        self.indexes.swap_remove(&handle.0).ok_or_else(|| {
            BridgeError::InvalidHandle(format!("can't close index {}: it is not open", handle.0))
        })?;
        Ok(())
    }

    pub fn index(
        &self,
        handle: IndexHandle,
    ) -> Result<&Arc<Index>, BridgeError> {
        if handle.is_null() {
            return Err(BridgeError::InvalidHandle("null index".to_string()));
        }
        self.indexes.get(&handle.0).ok_or_else(|| {
            BridgeError::InvalidHandle(format!("index {} is closed", handle.0))
        })
    }

    /// Builds an options record for `index`, optionally from a named preset.
    pub fn create_options(
        &mut self,
        index: IndexHandle,
        preset: Option<&str>,
    ) -> Result<BufferHandle, BridgeError> {
        let preset = preset.map(Preset::from_str).transpose()?;
        let bytes = MapOptions::for_index(self.index(index)?, preset).encode()?;

        let mut block = self.buffers.allocator().allocate(OPTIONS_LEN).map_err(allocating("options buffer"))?;
        block.write_all(&bytes)?;
        let owned = block.into_owned();

        Ok(self.buffers.adopt(owned))
    }

    /// Allocates a zero-filled buffer of `len` bytes for a sequence batch.
    pub fn create_sequence_buffer(
        &mut self,
        len: u32,
    ) -> Result<BufferHandle, BridgeError> {
        self.buffers.allocate(len as usize).map_err(allocating("sequence buffer"))
    }

    pub fn destroy_buffer(
        &mut self,
        handle: BufferHandle,
    ) -> Result<(), BridgeError> {
        self.buffers.release(handle)
    }

    pub fn buffer(
        &self,
        handle: BufferHandle,
    ) -> Result<&[u8], BridgeError> {
        self.buffers.address_of(handle)
    }

    pub fn buffer_mut(
        &mut self,
        handle: BufferHandle,
    ) -> Result<&mut [u8], BridgeError> {
        self.buffers.address_of_mut(handle)
    }

    /// Aligns every sequence in the batch buffer `sequences`.
    ///
    /// Returns the alignment output, see [aggregate](crate::aggregate).
    pub fn align(
        &mut self,
        index: IndexHandle,
        options: BufferHandle,
        sequences: BufferHandle,
    ) -> Result<BufferHandle, BridgeError> {
        let index = Arc::clone(self.index(index)?);
        let opts_bytes = self.buffers.address_of(options).map_err(|_| {
            BridgeError::Address(format!("can't get address for options buffer {}", options.0))
        })?;
        let opts = MapOptions::decode(opts_bytes)?;
        let seq_bytes = self.buffers.address_of(sequences).map_err(|_| {
            BridgeError::Address(format!("can't get address for sequence buffer {}", sequences.0))
        })?;
        let batch = SequenceBatch::new(seq_bytes)?;

        let output = align_batch(&self.engine, &index, &opts, &batch, &self.config, self.buffers.allocator())?;
        let owned = output.into_owned();

        Ok(self.buffers.adopt(owned))
    }

    /// Writes the NUL-terminated contig names of `index` into a new buffer.
    pub fn reference_names(
        &mut self,
        index: IndexHandle,
    ) -> Result<BufferHandle, BridgeError> {
        let index = Arc::clone(self.index(index)?);
        let block = encode_reference_names(&index, self.buffers.allocator()).map_err(allocating("ref names"))?;
        let owned = block.into_owned();

        Ok(self.buffers.adopt(owned))
    }

    /// Name of contig `ref_id`, as reported in decoded alignments.
    pub fn reference_name(
        &self,
        index: IndexHandle,
        ref_id: i32,
    ) -> Result<Option<String>, BridgeError> {
        let index = self.index(index)?;
        Ok(usize::try_from(ref_id).ok().and_then(|ref_id| index.name(ref_id)).map(str::to_string))
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.live_buffers()
    }

    pub fn live_bytes(&self) -> usize {
        self.buffers.live_bytes()
    }
}
