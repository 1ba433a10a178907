//! Native tagged-variant handler: discriminator and payload union
//! stored inline.
//!
//! The slot form is one discriminator slot followed by the widest
//! alternative's slots; narrower alternatives zero-pad.

use crate::cleanup::Cleanup;
use crate::error::{MarshalError, Result};
use crate::handler::{expect_slots, HandlerInfo, TypeHandler};
use crate::instance::GuestInstance;
use crate::profile::{case_index, variant_layout, CasePlan, VariantLayout};
use crate::value::HostValue;

#[derive(Debug)]
pub struct NativeVariantHandler {
    info: HandlerInfo,
    cases: Vec<CasePlan>,
    layout: VariantLayout,
}

impl NativeVariantHandler {
    pub fn new(descriptor: &str, alignment: u32, cases: Vec<CasePlan>) -> Self {
        let layout = variant_layout(&cases);
        let info = HandlerInfo::new(
            descriptor,
            layout.size,
            alignment.max(4),
            1 + layout.payload_slots,
        );
        Self {
            info,
            cases,
            layout,
        }
    }

    fn case(&self, tag: u32) -> Result<&CasePlan> {
        self.cases
            .get(tag as usize)
            .ok_or_else(|| MarshalError::InvalidDiscriminator {
                descriptor: self.info.descriptor.clone(),
                tag: tag.to_string(),
            })
    }

    fn index_of(&self, value: &HostValue) -> Result<(usize, HostValue)> {
        let (case_name, payload) = match value {
            HostValue::Variant { case, payload } => (case.as_str(), payload.as_ref().clone()),
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
        Ok((index, payload))
    }
}

impl TypeHandler for NativeVariantHandler {
    fn info(&self) -> &HandlerInfo {
        &self.info
    }

    fn read(&self, guest: &mut dyn GuestInstance, offset: u32) -> Result<HostValue> {
        let tag = guest.read_u32(offset)?;
        let case = self.case(tag)?;
        let payload = match &case.handler {
            Some(handler) => handler.read(guest, offset + self.layout.payload_offset)?,
            None => HostValue::Null,
        };
        Ok(HostValue::Variant {
            case: case.name.clone(),
            payload: Box::new(payload),
        })
    }

    fn write(
        &self,
        guest: &mut dyn GuestInstance,
        offset: u32,
        value: &HostValue,
        cleanup: &mut Cleanup,
    ) -> Result<()> {
        let (index, payload) = self.index_of(value)?;
        guest.write_u32(offset, index as u32)?;
        if let Some(handler) = &self.cases[index].handler {
            handler.write(guest, offset + self.layout.payload_offset, &payload, cleanup)?;
        }
        Ok(())
    }

    fn decode(&self, guest: &mut dyn GuestInstance, slots: &[u64]) -> Result<HostValue> {
        expect_slots(&self.info, slots)?;
        let tag = slots[0] as u32;
        let case = self.case(tag)?;
        let payload = match &case.handler {
            Some(handler) => {
                let take = handler.info().slot_count as usize;
                handler.decode(guest, &slots[1..1 + take])?
            }
            None => HostValue::Null,
        };
        Ok(HostValue::Variant {
            case: case.name.clone(),
            payload: Box::new(payload),
        })
    }

    fn encode(
        &self,
        guest: &mut dyn GuestInstance,
        value: &HostValue,
        slots: &mut Vec<u64>,
        cleanup: &mut Cleanup,
    ) -> Result<()> {
        let (index, payload) = self.index_of(value)?;
        slots.push(index as u64);
        let written = match &self.cases[index].handler {
            Some(handler) => {
                handler.encode(guest, &payload, slots, cleanup)?;
                handler.info().slot_count
            }
            None => 0,
        };
        for _ in written..self.layout.payload_slots {
            slots.push(0);
        }
        Ok(())
    }
}
