//! Managed sequence handler.
//!
//! A sequence is a 16-byte object `{buffer_ptr, data_start, byte_length,
//! length}` with a per-element-type class id, backed by a class-1 buffer
//! holding the elements at the element stride. Element order is
//! preserved in both directions.

use super::{check_class, ManagedObject, BUFFER_CLASS_ID};
use crate::cleanup::Cleanup;
use crate::error::{MarshalError, Result};
use crate::handler::{stride, HandlerInfo, TypeHandler};
use crate::instance::GuestInstance;
use crate::profile::Layout;
use crate::value::HostValue;
use std::sync::Arc;

// Sequence object field offsets.
const SEQ_BUFFER: u32 = 0;
const SEQ_DATA_START: u32 = 4;
const SEQ_BYTE_LENGTH: u32 = 8;
const SEQ_LENGTH: u32 = 12;
const SEQ_SIZE: u32 = 16;

#[derive(Debug)]
pub struct ManagedSequenceHandler {
    info: HandlerInfo,
    class_id: u32,
    elem: Arc<dyn TypeHandler>,
}

impl ManagedSequenceHandler {
    pub fn new(
        descriptor: &str,
        nullable: bool,
        class_id: u32,
        elem: Arc<dyn TypeHandler>,
    ) -> Self {
        let layout = Layout::POINTER;
        let info = HandlerInfo::new(descriptor, layout.size, layout.alignment, layout.slot_count)
            .nullable(nullable);
        Self {
            info,
            class_id,
            elem,
        }
    }
}

impl ManagedObject for ManagedSequenceHandler {
    fn object_info(&self) -> &HandlerInfo {
        &self.info
    }

    fn read_object(&self, guest: &mut dyn GuestInstance, ptr: u32) -> Result<HostValue> {
        check_class(guest, ptr, self.class_id, &self.info.descriptor)?;
        let data_start = guest.read_u32(ptr + SEQ_DATA_START)?;
        let length = guest.read_u32(ptr + SEQ_LENGTH)?;
        let step = stride(self.elem.info());

        let mut items = Vec::with_capacity(length as usize);
        for i in 0..length {
            items.push(self.elem.read(guest, data_start + i * step)?);
        }
        Ok(HostValue::Seq(items))
    }

    fn write_object(
        &self,
        guest: &mut dyn GuestInstance,
        value: &HostValue,
        cleanup: &mut Cleanup,
    ) -> Result<u32> {
        let items = match value {
            HostValue::Seq(items) => items.as_slice(),
            other => {
                return Err(MarshalError::CoercionError {
                    descriptor: self.info.descriptor.clone(),
                    found: other.kind(),
                })
            }
        };

        let step = stride(self.elem.info());
        let byte_len = items.len() as u32 * step;
        let buffer = guest.allocate_and_pin(byte_len, BUFFER_CLASS_ID, cleanup)?;
        for (i, item) in items.iter().enumerate() {
            self.elem
                .write(guest, buffer + i as u32 * step, item, cleanup)?;
        }

        let arr = guest.allocate_and_pin(SEQ_SIZE, self.class_id, cleanup)?;
        guest.write_u32(arr + SEQ_BUFFER, buffer)?;
        guest.write_u32(arr + SEQ_DATA_START, buffer)?;
        guest.write_u32(arr + SEQ_BYTE_LENGTH, byte_len)?;
        guest.write_u32(arr + SEQ_LENGTH, items.len() as u32)?;
        Ok(arr)
    }
}
