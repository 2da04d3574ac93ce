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

//! Reference name table: every contig name followed by a NUL byte, in
//! index order.

use crate::buffer::Allocator;
use crate::buffer::Block;
use crate::error::BridgeError;
use crate::index::Index;

use std::io::Write;

use bstr::ByteSlice;

/// Size of the name table for `index`.
pub fn names_len(
    index: &Index,
) -> Option<usize> {
    index.names().try_fold(0_usize, |total, name| total.checked_add(name.len())?.checked_add(1))
}

/// Writes the name table of `index` into a block of exactly its size.
pub fn encode_reference_names<'a>(
    index: &Index,
    allocator: &'a Allocator,
) -> Result<Block<'a>, BridgeError> {
    let len = names_len(index).ok_or_else(|| {
        BridgeError::Allocation("can't size buffer for ref names".to_string())
    })?;

    let mut block = allocator.allocate(len)?;
    for name in index.names() {
        block.write_all(name.as_bytes())?;
        block.write_all(&[0])?;
    }

    Ok(block)
}

/// Splits a name table back into names. Bytes after the last NUL are ignored.
pub fn decode_reference_names(
    bytes: &[u8],
) -> Vec<String> {
    let mut names: Vec<String> = bytes.split_str("\0").map(|name| name.to_str_lossy().into_owned()).collect();
    // the piece after the final terminator
    names.pop();
    names
}
