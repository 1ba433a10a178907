//! Native string handler: `{data_ptr, len}` struct, UTF-8 payload.

use super::allocate;
use crate::cleanup::Cleanup;
use crate::error::{MarshalError, Result};
use crate::handler::{expect_slots, HandlerInfo, TypeHandler};
use crate::instance::GuestInstance;
use crate::value::HostValue;

#[derive(Debug)]
pub struct NativeStringHandler {
    info: HandlerInfo,
}

impl NativeStringHandler {
    pub fn new(descriptor: &str) -> Self {
        Self {
            info: HandlerInfo::new(descriptor, 8, 4, 2),
        }
    }

    fn read_parts(&self, guest: &mut dyn GuestInstance, ptr: u32, len: u32) -> Result<HostValue> {
        if len == 0 {
            return Ok(HostValue::Text(String::new()));
        }
        let bytes = guest.read_bytes(ptr, len)?;
        Ok(HostValue::Text(
            String::from_utf8_lossy(&bytes).into_owned(),
        ))
    }

    /// Write the text payload, returning `(data_ptr, len)`.
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
        let text = value.coerce_text(&self.info.descriptor)?;
        if text.is_empty() {
            return Ok((0, 0));
        }
        let bytes = text.as_bytes();
        let ptr = allocate(guest, bytes.len() as u32)?;
        guest.write_bytes(ptr, bytes)?;
        Ok((ptr, bytes.len() as u32))
    }
}

impl TypeHandler for NativeStringHandler {
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
        guest.write_u32(offset + 4, len)
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
        Ok(())
    }
}
