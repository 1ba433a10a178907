//! Native nullable wrappers.
//!
//! A nullable primitive is stored as a presence envelope `{present: u8,
//! value}` aligned to the payload; anything else is stored boxed behind
//! a 32-bit pointer where 0 means absent.

use super::allocate;
use crate::cleanup::Cleanup;
use crate::error::Result;
use crate::handler::{expect_slots, HandlerInfo, TypeHandler};
use crate::instance::GuestInstance;
use crate::profile::Layout;
use crate::value::HostValue;
use std::sync::Arc;

#[derive(Debug)]
pub struct NullableEnvelopeHandler {
    info: HandlerInfo,
    inner: Arc<dyn TypeHandler>,
    payload_offset: u32,
}

impl NullableEnvelopeHandler {
    pub fn new(descriptor: &str, inner: Arc<dyn TypeHandler>) -> Self {
        let inner_info = inner.info();
        let payload_offset = inner_info.alignment;
        let info = HandlerInfo::new(
            descriptor,
            payload_offset + inner_info.size,
            inner_info.alignment,
            1 + inner_info.slot_count,
        )
        .nullable(true);
        Self {
            info,
            inner,
            payload_offset,
        }
    }
}

impl TypeHandler for NullableEnvelopeHandler {
    fn info(&self) -> &HandlerInfo {
        &self.info
    }

    fn read(&self, guest: &mut dyn GuestInstance, offset: u32) -> Result<HostValue> {
        if guest.read_u8(offset)? == 0 {
            return Ok(HostValue::Null);
        }
        self.inner.read(guest, offset + self.payload_offset)
    }

    fn write(
        &self,
        guest: &mut dyn GuestInstance,
        offset: u32,
        value: &HostValue,
        cleanup: &mut Cleanup,
    ) -> Result<()> {
        if value.is_null() {
            return guest.write_u8(offset, 0);
        }
        guest.write_u8(offset, 1)?;
        self.inner
            .write(guest, offset + self.payload_offset, value, cleanup)
    }

    fn decode(&self, guest: &mut dyn GuestInstance, slots: &[u64]) -> Result<HostValue> {
        expect_slots(&self.info, slots)?;
        if slots[0] == 0 {
            return Ok(HostValue::Null);
        }
        self.inner.decode(guest, &slots[1..])
    }

    fn encode(
        &self,
        guest: &mut dyn GuestInstance,
        value: &HostValue,
        slots: &mut Vec<u64>,
        cleanup: &mut Cleanup,
    ) -> Result<()> {
        if value.is_null() {
            slots.push(0);
            for _ in 0..self.inner.info().slot_count {
                slots.push(0);
            }
            return Ok(());
        }
        slots.push(1);
        self.inner.encode(guest, value, slots, cleanup)
    }
}

#[derive(Debug)]
pub struct NullableBoxHandler {
    info: HandlerInfo,
    inner: Arc<dyn TypeHandler>,
}

impl NullableBoxHandler {
    pub fn new(descriptor: &str, inner: Arc<dyn TypeHandler>) -> Self {
        let layout = Layout::POINTER;
        let info = HandlerInfo::new(descriptor, layout.size, layout.alignment, layout.slot_count)
            .nullable(true);
        Self { info, inner }
    }

    /// Box a non-null value, returning the allocation holding it.
    fn box_value(
        &self,
        guest: &mut dyn GuestInstance,
        value: &HostValue,
        cleanup: &mut Cleanup,
    ) -> Result<u32> {
        let ptr = allocate(guest, self.inner.info().size)?;
        self.inner.write(guest, ptr, value, cleanup)?;
        Ok(ptr)
    }
}

impl TypeHandler for NullableBoxHandler {
    fn info(&self) -> &HandlerInfo {
        &self.info
    }

    fn read(&self, guest: &mut dyn GuestInstance, offset: u32) -> Result<HostValue> {
        let ptr = guest.read_u32(offset)?;
        if ptr == 0 {
            return Ok(HostValue::Null);
        }
        self.inner.read(guest, ptr)
    }

    fn write(
        &self,
        guest: &mut dyn GuestInstance,
        offset: u32,
        value: &HostValue,
        cleanup: &mut Cleanup,
    ) -> Result<()> {
        if value.is_null() {
            return guest.write_u32(offset, 0);
        }
        let ptr = self.box_value(guest, value, cleanup)?;
        guest.write_u32(offset, ptr)
    }

    fn decode(&self, guest: &mut dyn GuestInstance, slots: &[u64]) -> Result<HostValue> {
        expect_slots(&self.info, slots)?;
        let ptr = slots[0] as u32;
        if ptr == 0 {
            return Ok(HostValue::Null);
        }
        self.inner.read(guest, ptr)
    }

    fn encode(
        &self,
        guest: &mut dyn GuestInstance,
        value: &HostValue,
        slots: &mut Vec<u64>,
        cleanup: &mut Cleanup,
    ) -> Result<()> {
        if value.is_null() {
            slots.push(0);
            return Ok(());
        }
        let ptr = self.box_value(guest, value, cleanup)?;
        slots.push(u64::from(ptr));
        Ok(())
    }
}
