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

//! C++ bindings
//!
//! Handles are passed as `u64`, `0` is null. Every fallible function
//! returns a Result, which cxx raises as a `rust::Error` exception on the
//! C++ side.

use crate::bridge::Bridge;
use crate::bridge::IndexHandle;
use crate::buffer::BufferHandle;
use crate::error::BridgeError;

use cxx::CxxString;

#[cxx::bridge(namespace = "mm2batch")]
mod ffi {

    extern "Rust" {
        type MapBridge;

        fn new_bridge() -> Box<MapBridge>;

        fn open_index(
            self: &mut MapBridge,
            path: &CxxString,
        ) -> Result<u64>;

        fn destroy_index(
            self: &mut MapBridge,
            index: u64,
        ) -> Result<()>;

        fn create_options(
            self: &mut MapBridge,
            index: u64,
            preset: &CxxString,
        ) -> Result<u64>;

        fn create_sequence_buffer(
            self: &mut MapBridge,
            len: u32,
        ) -> Result<u64>;

        fn write_buffer(
            self: &mut MapBridge,
            buffer: u64,
            offset: usize,
            bytes: &[u8],
        ) -> Result<()>;

        fn read_buffer(
            self: &MapBridge,
            buffer: u64,
        ) -> Result<Vec<u8>>;

        fn destroy_buffer(
            self: &mut MapBridge,
            buffer: u64,
        ) -> Result<()>;

        fn align(
            self: &mut MapBridge,
            index: u64,
            options: u64,
            sequences: u64,
        ) -> Result<u64>;

        fn reference_names(
            self: &mut MapBridge,
            index: u64,
        ) -> Result<u64>;

        fn version() -> String;
    }
}

/// A [Bridge] owned by C++.
pub struct MapBridge {
    inner: Bridge,
}

pub fn new_bridge() -> Box<MapBridge> {
    Box::new(MapBridge { inner: Bridge::new() })
}

pub fn version() -> String {
    crate::bridge::version().to_string()
}

impl MapBridge {
    pub fn open_index(
        &mut self,
        path: &CxxString,
    ) -> Result<u64, BridgeError> {
        let path = path.to_string_lossy().to_string();
        Ok(self.inner.open_index(path)?.0)
    }

    pub fn destroy_index(
        &mut self,
        index: u64,
    ) -> Result<(), BridgeError> {
        self.inner.destroy_index(IndexHandle(index))
    }

    /// Options for `index`; an empty `preset` selects the defaults.
    pub fn create_options(
        &mut self,
        index: u64,
        preset: &CxxString,
    ) -> Result<u64, BridgeError> {
        let preset = preset.to_string_lossy();
        let preset = if preset.is_empty() { None } else { Some(&*preset) };
        Ok(self.inner.create_options(IndexHandle(index), preset)?.0)
    }

    pub fn create_sequence_buffer(
        &mut self,
        len: u32,
    ) -> Result<u64, BridgeError> {
        Ok(self.inner.create_sequence_buffer(len)?.0)
    }

    /// Copies `bytes` into `buffer` starting at `offset`.
    pub fn write_buffer(
        &mut self,
        buffer: u64,
        offset: usize,
        bytes: &[u8],
    ) -> Result<(), BridgeError> {
        let dst = self.inner.buffer_mut(BufferHandle(buffer))?;
        let end = offset.checked_add(bytes.len()).filter(|end| *end <= dst.len()).ok_or_else(|| {
            BridgeError::Address(format!("write of {} bytes at {} is outside buffer {}", bytes.len(), offset, buffer))
        })?;
        dst[offset..end].copy_from_slice(bytes);
        Ok(())
    }

    pub fn read_buffer(
        &self,
        buffer: u64,
    ) -> Result<Vec<u8>, BridgeError> {
        Ok(self.inner.buffer(BufferHandle(buffer))?.to_vec())
    }

    pub fn destroy_buffer(
        &mut self,
        buffer: u64,
    ) -> Result<(), BridgeError> {
        self.inner.destroy_buffer(BufferHandle(buffer))
    }

    pub fn align(
        &mut self,
        index: u64,
        options: u64,
        sequences: u64,
    ) -> Result<u64, BridgeError> {
        Ok(self.inner.align(IndexHandle(index), BufferHandle(options), BufferHandle(sequences))?.0)
    }

    pub fn reference_names(
        &mut self,
        index: u64,
    ) -> Result<u64, BridgeError> {
        Ok(self.inner.reference_names(IndexHandle(index))?.0)
    }
}

// Tests
#[cfg(test)]
mod tests {

    #[test]
    fn write_and_read_buffer() {
        use super::new_bridge;
        use crate::batch::encode_batch;

        let mut bridge = new_bridge();
        let bytes = encode_batch(&["ACGT"]).unwrap();
        let handle = bridge.create_sequence_buffer(bytes.len() as u32).unwrap();

        bridge.write_buffer(handle, 0, &bytes).unwrap();
        assert_eq!(bridge.read_buffer(handle).unwrap(), bytes);
        assert!(bridge.write_buffer(handle, 1, &bytes).is_err());
        assert!(bridge.write_buffer(handle, usize::MAX, &bytes).is_err());

        bridge.destroy_buffer(handle).unwrap();
        assert!(bridge.read_buffer(handle).is_err());
    }
}
