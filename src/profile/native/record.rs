//! Native struct handler: fields laid out inline at metadata offsets.
//!
//! At a call boundary the struct is flattened: its register slots are
//! the concatenation of its fields' slots.

use crate::cleanup::Cleanup;
use crate::error::{MarshalError, Result};
use crate::handler::{expect_slots, HandlerInfo, TypeHandler};
use crate::instance::GuestInstance;
use crate::profile::{host_field, warn_excess_fields, FieldPlan};
use crate::value::HostValue;

#[derive(Debug)]
pub struct NativeStructHandler {
    info: HandlerInfo,
    fields: Vec<FieldPlan>,
}

impl NativeStructHandler {
    pub fn new(descriptor: &str, size: u32, alignment: u32, fields: Vec<FieldPlan>) -> Self {
        let slot_count = fields.iter().map(|f| f.handler.info().slot_count).sum();
        Self {
            info: HandlerInfo::new(descriptor, size, alignment, slot_count),
            fields,
        }
    }
}

impl TypeHandler for NativeStructHandler {
    fn info(&self) -> &HandlerInfo {
        &self.info
    }

    fn read(&self, guest: &mut dyn GuestInstance, offset: u32) -> Result<HostValue> {
        let mut fields = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            let value = field
                .handler
                .read(guest, offset + field.offset)
                .map_err(|e| e.in_field(&field.name))?;
            fields.push((field.name.clone(), value));
        }
        Ok(HostValue::Record(fields))
    }

    fn write(
        &self,
        guest: &mut dyn GuestInstance,
        offset: u32,
        value: &HostValue,
        cleanup: &mut Cleanup,
    ) -> Result<()> {
        if value.is_null() {
            return Err(MarshalError::NullViolation {
                descriptor: self.info.descriptor.clone(),
            });
        }
        if !matches!(value, HostValue::Record(_) | HostValue::Map(_)) {
            return Err(MarshalError::CoercionError {
                descriptor: self.info.descriptor.clone(),
                found: value.kind(),
            });
        }
        warn_excess_fields(value, &self.fields, &self.info.descriptor);

        for field in &self.fields {
            let field_value = host_field(value, &field.name).unwrap_or(&HostValue::Null);
            field
                .handler
                .write(guest, offset + field.offset, field_value, cleanup)
                .map_err(|e| e.in_field(&field.name))?;
        }
        Ok(())
    }

    fn decode(&self, guest: &mut dyn GuestInstance, slots: &[u64]) -> Result<HostValue> {
        expect_slots(&self.info, slots)?;
        let mut fields = Vec::with_capacity(self.fields.len());
        let mut cursor = 0usize;
        for field in &self.fields {
            let take = field.handler.info().slot_count as usize;
            let value = field
                .handler
                .decode(guest, &slots[cursor..cursor + take])
                .map_err(|e| e.in_field(&field.name))?;
            fields.push((field.name.clone(), value));
            cursor += take;
        }
        Ok(HostValue::Record(fields))
    }

    fn encode(
        &self,
        guest: &mut dyn GuestInstance,
        value: &HostValue,
        slots: &mut Vec<u64>,
        cleanup: &mut Cleanup,
    ) -> Result<()> {
        if value.is_null() {
            return Err(MarshalError::NullViolation {
                descriptor: self.info.descriptor.clone(),
            });
        }
        if !matches!(value, HostValue::Record(_) | HostValue::Map(_)) {
            return Err(MarshalError::CoercionError {
                descriptor: self.info.descriptor.clone(),
                found: value.kind(),
            });
        }
        warn_excess_fields(value, &self.fields, &self.info.descriptor);

        for field in &self.fields {
            let field_value = host_field(value, &field.name).unwrap_or(&HostValue::Null);
            field
                .handler
                .encode(guest, field_value, slots, cleanup)
                .map_err(|e| e.in_field(&field.name))?;
        }
        Ok(())
    }
}
