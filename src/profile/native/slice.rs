//! Native slice handlers: `{data_ptr, len, cap}` structs.
//!
//! The byte handler carries raw bytes; the sequence handler lays its
//! elements out at the element stride in a single data allocation.

use super::allocate;
use crate::cleanup::Cleanup;
use crate::error::{MarshalError, Result};
use crate::handler::{expect_slots, stride, HandlerInfo, TypeHandler};
use crate::instance::GuestInstance;
use crate::value::HostValue;
use std::sync::Arc;

#[derive(Debug)]
pub struct NativeBytesHandler {
    info: HandlerInfo,
}

impl NativeBytesHandler {
    pub fn new(descriptor: &str) -> Self {
        Self {
            info: HandlerInfo::new(descriptor, 12, 4, 3),
        }
    }

    fn read_parts(&self, guest: &mut dyn GuestInstance, ptr: u32, len: u32) -> Result<HostValue> {
        let bytes = if len == 0 {
            Vec::new()
        } else {
            guest.read_bytes(ptr, len)?
        };
        Ok(HostValue::Bytes(bytes))
    }

    fn write_parts(
        &self,
        guest: &mut dyn GuestInstance,
        value: &HostValue,
    ) -> Result<(u32, u32)> {
        if value.is_null() {
            return Err(MarshalError::NullViolation {
                descriptor: self.info.descriptor.clone(),
            });
        }
        let bytes = value.coerce_bytes(&self.info.descriptor)?;
        if bytes.is_empty() {
            return Ok((0, 0));
        }
        let ptr = allocate(guest, bytes.len() as u32)?;
        guest.write_bytes(ptr, &bytes)?;
        Ok((ptr, bytes.len() as u32))
    }
}

impl TypeHandler for NativeBytesHandler {
    fn info(&self) -> &HandlerInfo {
        &self.info
    }

    fn read(&self, guest: &mut dyn GuestInstance, offset: u32) -> Result<HostValue> {
        let ptr = guest.read_u32(offset)?;
        let len = guest.read_u32(offset + 4)?;
        self.read_parts(guest, ptr, len)
    }

    fn write(
        &self,
        guest: &mut dyn GuestInstance,
        offset: u32,
        value: &HostValue,
        _cleanup: &mut Cleanup,
    ) -> Result<()> {
        let (ptr, len) = self.write_parts(guest, value)?;
        guest.write_u32(offset, ptr)?;
        guest.write_u32(offset + 4, len)?;
        guest.write_u32(offset + 8, len)
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
        _cleanup: &mut Cleanup,
    ) -> Result<()> {
        let (ptr, len) = self.write_parts(guest, value)?;
        slots.push(u64::from(ptr));
        slots.push(u64::from(len));
        slots.push(u64::from(len));
        Ok(())
    }
}

#[derive(Debug)]
pub struct NativeSliceHandler {
    info: HandlerInfo,
    elem: Arc<dyn TypeHandler>,
}

impl NativeSliceHandler {
    pub fn new(descriptor: &str, elem: Arc<dyn TypeHandler>) -> Self {
        Self {
            info: HandlerInfo::new(descriptor, 12, 4, 3),
            elem,
        }
    }

    fn read_parts(&self, guest: &mut dyn GuestInstance, ptr: u32, len: u32) -> Result<HostValue> {
        let step = stride(self.elem.info());
        let mut items = Vec::with_capacity(len as usize);
        for i in 0..len {
            items.push(self.elem.read(guest, ptr + i * step)?);
        }
        Ok(HostValue::Seq(items))
    }

    /// Write the element region, returning `(data_ptr, len)`.
    fn write_parts(
        &self,
        guest: &mut dyn GuestInstance,
        value: &HostValue,
        cleanup: &mut Cleanup,
    ) -> Result<(u32, u32)> {
        let items = match value {
            HostValue::Seq(items) => items.as_slice(),
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
        if items.is_empty() {
            return Ok((0, 0));
        }
        let step = stride(self.elem.info());
        let ptr = allocate(guest, items.len() as u32 * step)?;
        for (i, item) in items.iter().enumerate() {
            self.elem
                .write(guest, ptr + i as u32 * step, item, cleanup)?;
        }
        Ok((ptr, items.len() as u32))
    }
}

impl TypeHandler for NativeSliceHandler {
    fn info(&self) -> &HandlerInfo {
        &self.info
    }

    fn read(&self, guest: &mut dyn GuestInstance, offset: u32) -> Result<HostValue> {
        let ptr = guest.read_u32(offset)?;
        let len = guest.read_u32(offset + 4)?;
        self.read_parts(guest, ptr, len)
    }

    fn write(
        &self,
        guest: &mut dyn GuestInstance,
        offset: u32,
        value: &HostValue,
        cleanup: &mut Cleanup,
    ) -> Result<()> {
        let (ptr, len) = self.write_parts(guest, value, cleanup)?;
        guest.write_u32(offset, ptr)?;
        guest.write_u32(offset + 4, len)?;
        guest.write_u32(offset + 8, len)
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
        let (ptr, len) = self.write_parts(guest, value, cleanup)?;
        slots.push(u64::from(ptr));
        slots.push(u64::from(len));
        slots.push(u64::from(len));
        Ok(())
    }
}
