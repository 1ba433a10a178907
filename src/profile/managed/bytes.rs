//! Managed byte-array handlers.
//!
//! Raw buffers are class-1 objects holding the bytes directly. Byte
//! views are separate 12-byte objects `{buffer_ptr, data_start,
//! byte_length}` with a per-view class id from plugin metadata,
//! referencing a class-1 backing buffer.

use super::{check_class, object_byte_length, ManagedObject, BUFFER_CLASS_ID};
use crate::cleanup::Cleanup;
use crate::error::Result;
use crate::handler::HandlerInfo;
use crate::instance::GuestInstance;
use crate::profile::Layout;
use crate::value::HostValue;

/// Handler for the raw buffer object itself.
#[derive(Debug)]
pub struct ManagedBufferHandler {
    info: HandlerInfo,
}

impl ManagedBufferHandler {
    pub fn new(descriptor: &str, nullable: bool) -> Self {
        let layout = Layout::POINTER;
        let info = HandlerInfo::new(descriptor, layout.size, layout.alignment, layout.slot_count)
            .nullable(nullable);
        Self { info }
    }
}

impl ManagedObject for ManagedBufferHandler {
    fn object_info(&self) -> &HandlerInfo {
        &self.info
    }

    fn read_object(&self, guest: &mut dyn GuestInstance, ptr: u32) -> Result<HostValue> {
        check_class(guest, ptr, BUFFER_CLASS_ID, &self.info.descriptor)?;
        let byte_len = object_byte_length(guest, ptr)?;
        let bytes = if byte_len == 0 {
            Vec::new()
        } else {
            guest.read_bytes(ptr, byte_len)?
        };
        Ok(HostValue::Bytes(bytes))
    }

    fn write_object(
        &self,
        guest: &mut dyn GuestInstance,
        value: &HostValue,
        cleanup: &mut Cleanup,
    ) -> Result<u32> {
        let bytes = value.coerce_bytes(&self.info.descriptor)?;
        let ptr = guest.allocate_and_pin(bytes.len() as u32, BUFFER_CLASS_ID, cleanup)?;
        guest.write_bytes(ptr, &bytes)?;
        Ok(ptr)
    }
}

/// Handler for a byte view over a backing buffer.
#[derive(Debug)]
pub struct ManagedByteViewHandler {
    info: HandlerInfo,
    class_id: u32,
}

// View object field offsets.
const VIEW_BUFFER: u32 = 0;
const VIEW_DATA_START: u32 = 4;
const VIEW_BYTE_LENGTH: u32 = 8;
const VIEW_SIZE: u32 = 12;

impl ManagedByteViewHandler {
    pub fn new(descriptor: &str, nullable: bool, class_id: u32) -> Self {
        let layout = Layout::POINTER;
        let info = HandlerInfo::new(descriptor, layout.size, layout.alignment, layout.slot_count)
            .nullable(nullable);
        Self { info, class_id }
    }
}

impl ManagedObject for ManagedByteViewHandler {
    fn object_info(&self) -> &HandlerInfo {
        &self.info
    }

    fn read_object(&self, guest: &mut dyn GuestInstance, ptr: u32) -> Result<HostValue> {
        check_class(guest, ptr, self.class_id, &self.info.descriptor)?;
        let data_start = guest.read_u32(ptr + VIEW_DATA_START)?;
        let byte_len = guest.read_u32(ptr + VIEW_BYTE_LENGTH)?;
        let bytes = if byte_len == 0 {
            Vec::new()
        } else {
            guest.read_bytes(data_start, byte_len)?
        };
        Ok(HostValue::Bytes(bytes))
    }

    fn write_object(
        &self,
        guest: &mut dyn GuestInstance,
        value: &HostValue,
        cleanup: &mut Cleanup,
    ) -> Result<u32> {
        let bytes = value.coerce_bytes(&self.info.descriptor)?;
        let buffer = guest.allocate_and_pin(bytes.len() as u32, BUFFER_CLASS_ID, cleanup)?;
        guest.write_bytes(buffer, &bytes)?;

        let view = guest.allocate_and_pin(VIEW_SIZE, self.class_id, cleanup)?;
        guest.write_u32(view + VIEW_BUFFER, buffer)?;
        guest.write_u32(view + VIEW_DATA_START, buffer)?;
        guest.write_u32(view + VIEW_BYTE_LENGTH, bytes.len() as u32)?;
        Ok(view)
    }
}
