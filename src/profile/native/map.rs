//! Native mapping and set handlers.
//!
//! Both are `{entries_ptr, count}` headers over a packed entry region in
//! insertion order. The host materialises entries only; hashing and
//! growth are left to the guest runtime, which rebuilds its index from
//! the entry region on first use.

use super::allocate;
use crate::cleanup::Cleanup;
use crate::error::{MarshalError, Result};
use crate::handler::{expect_slots, HandlerInfo, TypeHandler};
use crate::instance::GuestInstance;
use crate::profile::entry_layout;
use crate::value::HostValue;
use std::sync::Arc;

#[derive(Debug)]
pub struct NativeMapHandler {
    info: HandlerInfo,
    key: Arc<dyn TypeHandler>,
    value: Arc<dyn TypeHandler>,
}

impl NativeMapHandler {
    pub fn new(descriptor: &str, key: Arc<dyn TypeHandler>, value: Arc<dyn TypeHandler>) -> Self {
        Self {
            info: HandlerInfo::new(descriptor, 8, 4, 2),
            key,
            value,
        }
    }

    fn read_parts(
        &self,
        guest: &mut dyn GuestInstance,
        entries: u32,
        count: u32,
    ) -> Result<HostValue> {
        let layout = entry_layout(self.key.info(), Some(self.value.info()));
        let mut pairs = Vec::with_capacity(count as usize);
        for i in 0..count {
            let base = entries + i * layout.size;
            let k = self.key.read(guest, base)?;
            let v = self.value.read(guest, base + layout.value_offset)?;
            pairs.push((k, v));
        }
        Ok(HostValue::Map(pairs))
    }

    /// Write the entry region, returning `(entries_ptr, count)`.
    fn write_parts(
        &self,
        guest: &mut dyn GuestInstance,
        value: &HostValue,
        cleanup: &mut Cleanup,
    ) -> Result<(u32, u32)> {
        let pairs = match value {
            HostValue::Map(pairs) => pairs.as_slice(),
            HostValue::Null => {
                return Err(MarshalError::NullViolation {
                    descriptor: self.info.descriptor.clone(),
                })
            }
            other => {
                return Err(MarshalError::CoercionError {
                    descriptor: self.info.descriptor.clone(),
                    found: other.kind(),
                })
            }
        };

        for (i, (key, _)) in pairs.iter().enumerate() {
            if pairs[..i].iter().any(|(seen, _)| seen == key) {
                return Err(MarshalError::DuplicateKey {
                    key: key.to_string(),
                });
            }
        }
        if pairs.is_empty() {
            return Ok((0, 0));
        }

        let layout = entry_layout(self.key.info(), Some(self.value.info()));
        let entries = allocate(guest, pairs.len() as u32 * layout.size)?;
        for (i, (k, v)) in pairs.iter().enumerate() {
            let base = entries + i as u32 * layout.size;
            self.key.write(guest, base, k, cleanup)?;
            self.value
                .write(guest, base + layout.value_offset, v, cleanup)?;
        }
        Ok((entries, pairs.len() as u32))
    }
}

impl TypeHandler for NativeMapHandler {
    fn info(&self) -> &HandlerInfo {
        &self.info
    }

    fn read(&self, guest: &mut dyn GuestInstance, offset: u32) -> Result<HostValue> {
        let entries = guest.read_u32(offset)?;
        let count = guest.read_u32(offset + 4)?;
        self.read_parts(guest, entries, count)
    }

    fn write(
        &self,
        guest: &mut dyn GuestInstance,
        offset: u32,
        value: &HostValue,
        cleanup: &mut Cleanup,
    ) -> Result<()> {
        let (entries, count) = self.write_parts(guest, value, cleanup)?;
        guest.write_u32(offset, entries)?;
        guest.write_u32(offset + 4, count)
    }

    fn decode(&self, guest: &mut dyn GuestInstance, slots: &[u64]) -> Result<HostValue> {
        expect_slots(&self.info, slots)?;
        self.read_parts(guest, slots[0] as u32, slots[1] as u32)
    }

    fn encode(
        &self,
        guest: &mut dyn GuestInstance,
        value: &HostValue,
        slots: &mut Vec<u64>,
        cleanup: &mut Cleanup,
    ) -> Result<()> {
        let (entries, count) = self.write_parts(guest, value, cleanup)?;
        slots.push(u64::from(entries));
        slots.push(u64::from(count));
        Ok(())
    }
}

#[derive(Debug)]
pub struct NativeSetHandler {
    info: HandlerInfo,
    elem: Arc<dyn TypeHandler>,
}

impl NativeSetHandler {
    pub fn new(descriptor: &str, elem: Arc<dyn TypeHandler>) -> Self {
        Self {
            info: HandlerInfo::new(descriptor, 8, 4, 2),
            elem,
        }
    }

    fn read_parts(
        &self,
        guest: &mut dyn GuestInstance,
        entries: u32,
        count: u32,
    ) -> Result<HostValue> {
        let layout = entry_layout(self.elem.info(), None);
        let mut items = Vec::with_capacity(count as usize);
        for i in 0..count {
            items.push(self.elem.read(guest, entries + i * layout.size)?);
        }
        Ok(HostValue::Set(items))
    }

    fn write_parts(
        &self,
        guest: &mut dyn GuestInstance,
        value: &HostValue,
        cleanup: &mut Cleanup,
    ) -> Result<(u32, u32)> {
        let items = match value {
            HostValue::Set(items) | HostValue::Seq(items) => items.as_slice(),
            HostValue::Null => {
                return Err(MarshalError::NullViolation {
                    descriptor: self.info.descriptor.clone(),
                })
            }
            other => {
                return Err(MarshalError::CoercionError {
                    descriptor: self.info.descriptor.clone(),
                    found: other.kind(),
                })
            }
        };

        for (i, item) in items.iter().enumerate() {
            if items[..i].iter().any(|seen| seen == item) {
                return Err(MarshalError::DuplicateKey {
                    key: item.to_string(),
                });
            }
        }
        if items.is_empty() {
            return Ok((0, 0));
        }

        let layout = entry_layout(self.elem.info(), None);
        let entries = allocate(guest, items.len() as u32 * layout.size)?;
        for (i, item) in items.iter().enumerate() {
            self.elem
                .write(guest, entries + i as u32 * layout.size, item, cleanup)?;
        }
        Ok((entries, items.len() as u32))
    }
}

impl TypeHandler for NativeSetHandler {
    fn info(&self) -> &HandlerInfo {
        &self.info
    }

    fn read(&self, guest: &mut dyn GuestInstance, offset: u32) -> Result<HostValue> {
        let entries = guest.read_u32(offset)?;
        let count = guest.read_u32(offset + 4)?;
        self.read_parts(guest, entries, count)
    }

    fn write(
        &self,
        guest: &mut dyn GuestInstance,
        offset: u32,
        value: &HostValue,
        cleanup: &mut Cleanup,
    ) -> Result<()> {
        let (entries, count) = self.write_parts(guest, value, cleanup)?;
        guest.write_u32(offset, entries)?;
        guest.write_u32(offset + 4, count)
    }

    fn decode(&self, guest: &mut dyn GuestInstance, slots: &[u64]) -> Result<HostValue> {
        expect_slots(&self.info, slots)?;
        self.read_parts(guest, slots[0] as u32, slots[1] as u32)
    }

    fn encode(
        &self,
        guest: &mut dyn GuestInstance,
        value: &HostValue,
        slots: &mut Vec<u64>,
        cleanup: &mut Cleanup,
    ) -> Result<()> {
        let (entries, count) = self.write_parts(guest, value, cleanup)?;
        slots.push(u64::from(entries));
        slots.push(u64::from(count));
        Ok(())
    }
}
