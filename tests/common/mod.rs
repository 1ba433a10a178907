#![allow(dead_code)]
//! In-memory fake guest used by the integration suites.
//!
//! Reproduces both profiles' allocator semantics: managed allocations
//! get a 16-byte header carrying the class id and byte length, native
//! allocations are a plain bump. Pins are tracked so tests can assert
//! that none are left outstanding after a call.

use gantry::error::{MarshalError, Result};
use gantry::GuestInstance;
use std::collections::HashMap;

/// Scripted outcome for one guest export.
pub enum ExportOutcome {
    Return(Vec<u64>),
    Fail(String),
}

pub struct FakeGuest {
    memory: Vec<u8>,
    next_alloc: u32,
    managed: bool,
    pins: Vec<u32>,
    /// Allocator calls observed, as `(size, class_id)`.
    pub alloc_calls: Vec<(u32, u32)>,
    /// Export invocations observed, as `(name, slots)`.
    pub invocations: Vec<(String, Vec<u64>)>,
    pub exports: HashMap<String, ExportOutcome>,
}

const MEMORY_SIZE: usize = 1 << 20;

impl FakeGuest {
    pub fn managed() -> Self {
        Self::new(true)
    }

    pub fn native() -> Self {
        Self::new(false)
    }

    fn new(managed: bool) -> Self {
        Self {
            memory: vec![0u8; MEMORY_SIZE],
            next_alloc: 0x1000,
            managed,
            pins: Vec::new(),
            alloc_calls: Vec::new(),
            invocations: Vec::new(),
            exports: HashMap::new(),
        }
    }

    /// Number of pins currently outstanding.
    pub fn live_pins(&self) -> usize {
        self.pins.len()
    }

    /// Reserve scratch memory outside the allocator, for write targets.
    pub fn scratch(&mut self, size: u32) -> u32 {
        let offset = (self.next_alloc + 15) & !15;
        self.next_alloc = offset + size;
        offset
    }

    pub fn script_export(&mut self, name: &str, outcome: ExportOutcome) {
        self.exports.insert(name.to_string(), outcome);
    }

    fn check_range(&self, offset: u32, len: u32, op: &'static str) -> Result<()> {
        if offset as usize + len as usize > self.memory.len() {
            return Err(MarshalError::MemoryFault { op, offset, len });
        }
        Ok(())
    }
}

impl GuestInstance for FakeGuest {
    fn read_bytes(&self, offset: u32, len: u32) -> Result<Vec<u8>> {
        self.check_range(offset, len, "read")?;
        Ok(self.memory[offset as usize..(offset + len) as usize].to_vec())
    }

    fn write_bytes(&mut self, offset: u32, bytes: &[u8]) -> Result<()> {
        self.check_range(offset, bytes.len() as u32, "write")?;
        self.memory[offset as usize..offset as usize + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn allocate(&mut self, size: u32, class_id: u32) -> Result<u32> {
        self.alloc_calls.push((size, class_id));
        let ptr = if self.managed {
            let base = (self.next_alloc + 15) & !15;
            let payload = base + 16;
            self.next_alloc = payload + size;
            self.check_range(base, 16 + size, "allocate")?;
            // Object header: class id and byte length in the last two words.
            self.memory[(base + 8) as usize..(base + 12) as usize]
                .copy_from_slice(&class_id.to_le_bytes());
            self.memory[(base + 12) as usize..(base + 16) as usize]
                .copy_from_slice(&size.to_le_bytes());
            payload
        } else {
            let ptr = (self.next_alloc + 7) & !7;
            self.next_alloc = ptr + size;
            self.check_range(ptr, size, "allocate")?;
            ptr
        };
        Ok(ptr)
    }

    fn pin(&mut self, ptr: u32) -> Result<()> {
        self.pins.push(ptr);
        Ok(())
    }

    fn unpin(&mut self, ptr: u32) -> Result<()> {
        match self.pins.iter().rposition(|&p| p == ptr) {
            Some(index) => {
                self.pins.remove(index);
                Ok(())
            }
            None => Err(MarshalError::GuestError {
                message: format!("unpin of unpinned pointer {ptr}"),
            }),
        }
    }

    fn invoke(&mut self, name: &str, args: &[u64]) -> Result<Vec<u64>> {
        self.invocations.push((name.to_string(), args.to_vec()));
        match self.exports.get(name) {
            Some(ExportOutcome::Return(slots)) => Ok(slots.clone()),
            Some(ExportOutcome::Fail(message)) => Err(MarshalError::GuestError {
                message: message.clone(),
            }),
            None => Err(MarshalError::GuestError {
                message: format!("no export named '{name}'"),
            }),
        }
    }
}
