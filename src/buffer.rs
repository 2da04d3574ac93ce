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

//! Buffer ownership across the boundary.
//!
//! Memory is obtained from an [Allocator] as a [Block]. A block is scratch
//! memory owned by whoever holds it and is released when it is dropped. A
//! block that should outlive the call is converted with
//! [Block::into_owned] and registered in a [BufferManager], which hands out
//! a [BufferHandle] to the caller. The caller releases the handle exactly
//! once with [BufferManager::release].
//!
//! The allocator keeps a running total of live bytes and can be given a
//! budget, after which every allocation fails with
//! [BridgeError::Allocation].

use crate::error::BridgeError;

use std::io::Write;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use indexmap::IndexMap;

/// Boundary-visible reference to a registered buffer.
///
/// Handle `0` is never issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

impl BufferHandle {
    pub const NULL: BufferHandle = BufferHandle(0);

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

/// Source of all buffer memory.
#[derive(Debug, Default)]
pub struct Allocator {
    limit: Option<usize>,
    live: AtomicUsize,
}

impl Allocator {
    pub fn new() -> Self {
        Allocator { limit: None, live: AtomicUsize::new(0) }
    }

    /// Allocator that refuses to hold more than `limit` live bytes.
    pub fn with_limit(
        limit: usize,
    ) -> Self {
        Allocator { limit: Some(limit), live: AtomicUsize::new(0) }
    }

    /// Reserves exactly `size` bytes.
    ///
    /// The returned [Block] is empty and accepts writes up to `size` bytes.
    pub fn allocate(
        &self,
        size: usize,
    ) -> Result<Block<'_>, BridgeError> {
        let mut current = self.live.load(Ordering::Acquire);
        loop {
            let next = current.checked_add(size).ok_or_else(|| {
                BridgeError::Allocation(format!("can't allocate {} bytes: size overflows", size))
            })?;
            if let Some(limit) = self.limit {
                if next > limit {
                    return Err(BridgeError::Allocation(format!(
                        "can't allocate {} bytes: {} of {} bytes already in use",
                        size, current, limit
                    )));
                }
            }
            match self.live.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        let mut bytes: Vec<u8> = Vec::new();
        if let Err(err) = bytes.try_reserve_exact(size) {
            self.free(size);
            return Err(BridgeError::Allocation(format!("can't allocate {} bytes: {}", size, err)));
        }

        Ok(Block { bytes, reserved: size, allocator: self })
    }

    /// Number of bytes currently held by blocks and registered buffers.
    pub fn live_bytes(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    fn free(
        &self,
        size: usize,
    ) {
        self.live.fetch_sub(size, Ordering::AcqRel);
    }
}

/// Scratch memory of a fixed reserved size.
///
/// Released back to its [Allocator] on drop. Writing past the reserved size
/// fails instead of reallocating.
#[derive(Debug)]
pub struct Block<'a> {
    bytes: Vec<u8>,
    reserved: usize,
    allocator: &'a Allocator,
}

impl Block<'_> {
    /// Fills the unwritten part of the block with zeros.
    pub fn zeroed(
        mut self,
    ) -> Self {
        self.bytes.resize(self.reserved, 0);
        self
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn reserved(&self) -> usize {
        self.reserved
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Detaches the memory from the block so it can be registered in a
    /// [BufferManager]. The bytes stay accounted for until released there.
    pub fn into_owned(
        mut self,
    ) -> OwnedBuffer {
        let bytes = std::mem::take(&mut self.bytes);
        let reserved = std::mem::replace(&mut self.reserved, 0);
        OwnedBuffer { bytes, reserved }
    }
}

impl Write for Block<'_> {
    fn write(
        &mut self,
        buf: &[u8],
    ) -> std::io::Result<usize> {
        if self.bytes.len() + buf.len() > self.reserved {
            return Err(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                format!("write of {} bytes past the end of a {} byte block", buf.len(), self.reserved),
            ));
        }
        self.bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Drop for Block<'_> {
    fn drop(&mut self) {
        self.allocator.free(self.reserved);
    }
}

/// Memory detached from a [Block], waiting to be registered.
#[derive(Debug)]
pub struct OwnedBuffer {
    bytes: Vec<u8>,
    reserved: usize,
}

/// Handle table for buffers whose ownership crossed the boundary.
#[derive(Debug, Default)]
pub struct BufferManager {
    allocator: Allocator,
    table: IndexMap<u64, OwnedBuffer>,
    next_id: u64,
}

impl BufferManager {
    pub fn new() -> Self {
        BufferManager { allocator: Allocator::new(), table: IndexMap::new(), next_id: 1 }
    }

    pub fn with_limit(
        limit: usize,
    ) -> Self {
        BufferManager { allocator: Allocator::with_limit(limit), table: IndexMap::new(), next_id: 1 }
    }

    pub fn allocator(&self) -> &Allocator {
        &self.allocator
    }

    /// Allocates a zero-filled buffer of `size` bytes and registers it.
    pub fn allocate(
        &mut self,
        size: usize,
    ) -> Result<BufferHandle, BridgeError> {
        let owned = self.allocator.allocate(size)?.zeroed().into_owned();
        Ok(self.adopt(owned))
    }

    /// Registers detached memory and transfers it to the caller.
    pub fn adopt(
        &mut self,
        buffer: OwnedBuffer,
    ) -> BufferHandle {
        let id = self.next_id.max(1);
        self.next_id = id + 1;
        self.table.insert(id, buffer);
        BufferHandle(id)
    }

    /// Releases a registered buffer.
    pub fn release(
        &mut self,
        handle: BufferHandle,
    ) -> Result<(), BridgeError> {
        let buffer = self.table.swap_remove(&handle.0).ok_or_else(|| unresolved(handle))?;
        self.allocator.free(buffer.reserved);
        Ok(())
    }

    pub fn address_of(
        &self,
        handle: BufferHandle,
    ) -> Result<&[u8], BridgeError> {
        self.table.get(&handle.0).map(|buffer| buffer.bytes.as_slice()).ok_or_else(|| unresolved(handle))
    }

    pub fn address_of_mut(
        &mut self,
        handle: BufferHandle,
    ) -> Result<&mut [u8], BridgeError> {
        self.table.get_mut(&handle.0).map(|buffer| buffer.bytes.as_mut_slice()).ok_or_else(|| unresolved(handle))
    }

    /// Number of registered buffers not yet released.
    pub fn live_buffers(&self) -> usize {
        self.table.len()
    }

    pub fn live_bytes(&self) -> usize {
        self.allocator.live_bytes()
    }
}

fn unresolved(
    handle: BufferHandle,
) -> BridgeError {
    BridgeError::Address(format!("can't get address of buffer {}", handle.0))
}

// Tests
#[cfg(test)]
mod tests {

    #[test]
    fn allocate_and_release_balances_accounting() {
        use super::BufferManager;

        let mut manager = BufferManager::new();
        let a = manager.allocate(16).unwrap();
        let b = manager.allocate(4).unwrap();

        assert_ne!(a, b);
        assert!(!a.is_null());
        assert_eq!(manager.address_of(a).unwrap(), &[0_u8; 16]);
        assert_eq!(manager.live_bytes(), 20);
        assert_eq!(manager.live_buffers(), 2);

        manager.release(a).unwrap();
        manager.release(b).unwrap();
        assert_eq!(manager.live_bytes(), 0);
        assert_eq!(manager.live_buffers(), 0);
    }

    #[test]
    fn released_handle_does_not_resolve() {
        use super::BufferManager;
        use crate::error::BridgeError;

        let mut manager = BufferManager::new();
        let handle = manager.allocate(8).unwrap();
        manager.release(handle).unwrap();

        assert!(matches!(manager.address_of(handle), Err(BridgeError::Address(_))));
        assert!(matches!(manager.release(handle), Err(BridgeError::Address(_))));
    }

    #[test]
    fn limit_rejects_allocation() {
        use super::BufferManager;
        use crate::error::BridgeError;

        let mut manager = BufferManager::with_limit(10);
        let _kept = manager.allocate(8).unwrap();

        let got = manager.allocate(3);
        assert!(matches!(got, Err(BridgeError::Allocation(_))));
        assert_eq!(manager.live_bytes(), 8);
        assert_eq!(manager.live_buffers(), 1);
    }

    #[test]
    fn dropped_block_is_freed() {
        use super::Allocator;

        let allocator = Allocator::with_limit(32);
        {
            let block = allocator.allocate(32).unwrap();
            assert_eq!(block.reserved(), 32);
            assert!(allocator.allocate(1).is_err());
        }
        assert_eq!(allocator.live_bytes(), 0);
        assert!(allocator.allocate(1).is_ok());
    }

    #[test]
    fn block_refuses_write_past_reserved() {
        use super::Allocator;
        use std::io::Write;

        let allocator = Allocator::new();
        let mut block = allocator.allocate(4).unwrap();
        block.write_all(&[1, 2, 3]).unwrap();
        assert!(block.write_all(&[4, 5]).is_err());
        block.write_all(&[4]).unwrap();
        assert_eq!(block.as_slice(), &[1, 2, 3, 4]);
    }

    #[test]
    fn adopted_block_stays_accounted_until_release() {
        use super::BufferManager;
        use std::io::Write;

        let mut manager = BufferManager::new();
        let owned = {
            let mut block = manager.allocator().allocate(2).unwrap();
            block.write_all(&[7, 9]).unwrap();
            block.into_owned()
        };
        assert_eq!(manager.live_bytes(), 2);

        let handle = manager.adopt(owned);
        assert_eq!(manager.address_of(handle).unwrap(), &[7, 9]);
        manager.release(handle).unwrap();
        assert_eq!(manager.live_bytes(), 0);
    }
}
