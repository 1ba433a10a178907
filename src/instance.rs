//! The guest instance contract.
//!
//! Handlers and the call marshaller consume guest modules exclusively
//! through this trait: little-endian linear-memory access, the guest
//! allocator, pin/unpin against the guest collector, and export
//! invocation. Exclusivity for the duration of a call is the caller's
//! responsibility (instance pool or per-instance mutex).

use crate::cleanup::Cleanup;
use crate::error::{MarshalError, Result};

/// One guest module instance with a linear memory.
///
/// All integer accessors are little-endian. Memory failures surface as
/// [`MarshalError::MemoryFault`]; a zero return from the allocator is
/// [`MarshalError::AllocFault`].
pub trait GuestInstance {
    /// Read `len` bytes at `offset`.
    fn read_bytes(&self, offset: u32, len: u32) -> Result<Vec<u8>>;

    /// Write bytes at `offset`.
    fn write_bytes(&mut self, offset: u32, bytes: &[u8]) -> Result<()>;

    /// Reserve `size` bytes of guest memory bearing `class_id`.
    ///
    /// Profiles without object headers ignore the class id.
    fn allocate(&mut self, size: u32, class_id: u32) -> Result<u32>;

    /// Exclude an allocated object from collection or relocation.
    fn pin(&mut self, ptr: u32) -> Result<()>;

    /// Release a previously pinned object.
    fn unpin(&mut self, ptr: u32) -> Result<()>;

    /// Invoke a guest export with raw 64-bit argument slots.
    fn invoke(&mut self, name: &str, args: &[u64]) -> Result<Vec<u64>>;

    fn read_u8(&self, offset: u32) -> Result<u8> {
        let bytes = self.read_bytes(offset, 1)?;
        Ok(bytes[0])
    }

    fn read_u16(&self, offset: u32) -> Result<u16> {
        let bytes = self.read_bytes(offset, 2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn read_u32(&self, offset: u32) -> Result<u32> {
        let bytes = self.read_bytes(offset, 4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_u64(&self, offset: u32) -> Result<u64> {
        let bytes = self.read_bytes(offset, 8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&bytes);
        Ok(u64::from_le_bytes(buf))
    }

    fn write_u8(&mut self, offset: u32, value: u8) -> Result<()> {
        self.write_bytes(offset, &[value])
    }

    fn write_u16(&mut self, offset: u32, value: u16) -> Result<()> {
        self.write_bytes(offset, &value.to_le_bytes())
    }

    fn write_u32(&mut self, offset: u32, value: u32) -> Result<()> {
        self.write_bytes(offset, &value.to_le_bytes())
    }

    fn write_u64(&mut self, offset: u32, value: u64) -> Result<()> {
        self.write_bytes(offset, &value.to_le_bytes())
    }

    /// Allocate and immediately pin, appending the unpin to `cleanup`.
    ///
    /// Allocation and pin form a single critical section against the
    /// instance: nothing may run between them, or the guest collector
    /// could reclaim the object before it is pinned.
    fn allocate_and_pin(&mut self, size: u32, class_id: u32, cleanup: &mut Cleanup) -> Result<u32> {
        let ptr = self.allocate(size, class_id)?;
        if ptr == 0 {
            return Err(MarshalError::AllocFault { size, class_id });
        }
        self.pin(ptr)?;
        cleanup.push_unpin(ptr);
        Ok(ptr)
    }
}
