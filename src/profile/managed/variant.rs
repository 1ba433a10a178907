//! Managed tagged-variant handler.
//!
//! The payload of the managed object is a 32-bit discriminator followed
//! by a payload union sized and aligned for the widest alternative.

use super::{check_class, ManagedObject};
use crate::cleanup::Cleanup;
use crate::error::{MarshalError, Result};
use crate::handler::HandlerInfo;
use crate::instance::GuestInstance;
use crate::profile::{case_index, variant_layout, CasePlan, Layout, VariantLayout};
use crate::value::HostValue;

#[derive(Debug)]
pub struct ManagedVariantHandler {
    info: HandlerInfo,
    class_id: u32,
    cases: Vec<CasePlan>,
    layout: VariantLayout,
}

impl ManagedVariantHandler {
    pub fn new(descriptor: &str, nullable: bool, class_id: u32, cases: Vec<CasePlan>) -> Self {
        let layout = variant_layout(&cases);
        let ptr = Layout::POINTER;
        let info =
            HandlerInfo::new(descriptor, ptr.size, ptr.alignment, ptr.slot_count).nullable(nullable);
        Self {
            info,
            class_id,
            cases,
            layout,
        }
    }
}

impl ManagedObject for ManagedVariantHandler {
    fn object_info(&self) -> &HandlerInfo {
        &self.info
    }

    fn read_object(&self, guest: &mut dyn GuestInstance, ptr: u32) -> Result<HostValue> {
        check_class(guest, ptr, self.class_id, &self.info.descriptor)?;
        let tag = guest.read_u32(ptr)?;
        let case = self.cases.get(tag as usize).ok_or_else(|| {
            MarshalError::InvalidDiscriminator {
                descriptor: self.info.descriptor.clone(),
                tag: tag.to_string(),
            }
        })?;
        let payload = match &case.handler {
            Some(handler) => handler.read(guest, ptr + self.layout.payload_offset)?,
            None => HostValue::Null,
        };
        Ok(HostValue::Variant {
            case: case.name.clone(),
            payload: Box::new(payload),
        })
    }

    fn write_object(
        &self,
        guest: &mut dyn GuestInstance,
        value: &HostValue,
        cleanup: &mut Cleanup,
    ) -> Result<u32> {
        let (case_name, payload) = match value {
            HostValue::Variant { case, payload } => (case.as_str(), payload.as_ref()),
            other => {
                return Err(MarshalError::CoercionError {
                    descriptor: self.info.descriptor.clone(),
                    found: other.kind(),
                })
            }
        };
        let index = case_index(&self.cases, case_name).ok_or_else(|| {
            MarshalError::InvalidDiscriminator {
                descriptor: self.info.descriptor.clone(),
                tag: case_name.to_string(),
            }
        })?;

        let ptr = guest.allocate_and_pin(self.layout.size, self.class_id, cleanup)?;
        guest.write_u32(ptr, index as u32)?;
        if let Some(handler) = &self.cases[index].handler {
            handler.write(guest, ptr + self.layout.payload_offset, payload, cleanup)?;
        }
        Ok(ptr)
    }
}
