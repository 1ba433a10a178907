//! Inline fixed-size array handler.
//!
//! Elements are laid out back to back at the element stride; element `i`
//! occupies exactly bytes `[offset + i*stride, offset + (i+1)*stride)`.

use crate::cleanup::Cleanup;
use crate::error::{MarshalError, Result};
use crate::handler::{expect_slots, stride, HandlerInfo, TypeHandler};
use crate::instance::GuestInstance;
use crate::value::HostValue;
use std::sync::Arc;

#[derive(Debug)]
pub struct InlineArrayHandler {
    info: HandlerInfo,
    elem: Arc<dyn TypeHandler>,
    len: u32,
}

impl InlineArrayHandler {
    pub fn new(descriptor: &str, elem: Arc<dyn TypeHandler>, len: u32) -> Self {
        let elem_info = elem.info();
        let step = stride(elem_info);
        let info = HandlerInfo::new(
            descriptor,
            step * len,
            elem_info.alignment,
            elem_info.slot_count * len,
        );
        Self { info, elem, len }
    }

    fn expect_seq<'v>(&self, value: &'v HostValue) -> Result<&'v [HostValue]> {
        match value {
            HostValue::Seq(items) if items.len() == self.len as usize => Ok(items),
            HostValue::Seq(items) => Err(MarshalError::OutOfRange {
                descriptor: self.info.descriptor.clone(),
                value: format!("sequence of {}", items.len()),
            }),
            HostValue::Null => Err(MarshalError::NullViolation {
                descriptor: self.info.descriptor.clone(),
            }),
            other => Err(MarshalError::CoercionError {
                descriptor: self.info.descriptor.clone(),
                found: other.kind(),
            }),
        }
    }
}

impl TypeHandler for InlineArrayHandler {
    fn info(&self) -> &HandlerInfo {
        &self.info
    }

    fn read(&self, guest: &mut dyn GuestInstance, offset: u32) -> Result<HostValue> {
        let step = stride(self.elem.info());
        let mut items = Vec::with_capacity(self.len as usize);
        for i in 0..self.len {
            items.push(self.elem.read(guest, offset + i * step)?);
        }
        Ok(HostValue::Seq(items))
    }

    fn write(
        &self,
        guest: &mut dyn GuestInstance,
        offset: u32,
        value: &HostValue,
        cleanup: &mut Cleanup,
    ) -> Result<()> {
        let items = self.expect_seq(value)?;
        let step = stride(self.elem.info());
        for (i, item) in items.iter().enumerate() {
            self.elem
                .write(guest, offset + i as u32 * step, item, cleanup)?;
        }
        Ok(())
    }

    fn decode(&self, guest: &mut dyn GuestInstance, slots: &[u64]) -> Result<HostValue> {
        expect_slots(&self.info, slots)?;
        let per_elem = self.elem.info().slot_count as usize;
        let mut items = Vec::with_capacity(self.len as usize);
        for chunk in slots.chunks(per_elem.max(1)) {
            items.push(self.elem.decode(guest, chunk)?);
        }
        Ok(HostValue::Seq(items))
    }

    fn encode(
        &self,
        guest: &mut dyn GuestInstance,
        value: &HostValue,
        slots: &mut Vec<u64>,
        cleanup: &mut Cleanup,
    ) -> Result<()> {
        let items = self.expect_seq(value)?;
        for item in items {
            self.elem.encode(guest, item, slots, cleanup)?;
        }
        Ok(())
    }
}
