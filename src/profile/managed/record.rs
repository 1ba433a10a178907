//! Managed record handler.
//!
//! A record is a managed object whose payload holds the fields at the
//! offsets declared in plugin metadata. Missing host fields are
//! permitted only where the field handler is nullable; excess fields are
//! ignored with a warning.

use super::{check_class, ManagedObject};
use crate::cleanup::Cleanup;
use crate::error::{MarshalError, Result};
use crate::handler::HandlerInfo;
use crate::instance::GuestInstance;
use crate::profile::{host_field, warn_excess_fields, FieldPlan, Layout};
use crate::value::HostValue;

#[derive(Debug)]
pub struct ManagedRecordHandler {
    info: HandlerInfo,
    class_id: u32,
    payload_size: u32,
    fields: Vec<FieldPlan>,
}

impl ManagedRecordHandler {
    pub fn new(
        descriptor: &str,
        nullable: bool,
        class_id: u32,
        payload_size: u32,
        fields: Vec<FieldPlan>,
    ) -> Self {
        let layout = Layout::POINTER;
        let info = HandlerInfo::new(descriptor, layout.size, layout.alignment, layout.slot_count)
            .nullable(nullable);
        Self {
            info,
            class_id,
            payload_size,
            fields,
        }
    }
}

impl ManagedObject for ManagedRecordHandler {
    fn object_info(&self) -> &HandlerInfo {
        &self.info
    }

    fn read_object(&self, guest: &mut dyn GuestInstance, ptr: u32) -> Result<HostValue> {
        check_class(guest, ptr, self.class_id, &self.info.descriptor)?;
        let mut fields = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            let value = field
                .handler
                .read(guest, ptr + field.offset)
                .map_err(|e| e.in_field(&field.name))?;
            fields.push((field.name.clone(), value));
        }
        Ok(HostValue::Record(fields))
    }

    fn write_object(
        &self,
        guest: &mut dyn GuestInstance,
        value: &HostValue,
        cleanup: &mut Cleanup,
    ) -> Result<u32> {
        if !matches!(value, HostValue::Record(_) | HostValue::Map(_)) {
            return Err(MarshalError::CoercionError {
                descriptor: self.info.descriptor.clone(),
                found: value.kind(),
            });
        }
        warn_excess_fields(value, &self.fields, &self.info.descriptor);

        let ptr = guest.allocate_and_pin(self.payload_size, self.class_id, cleanup)?;
        for field in &self.fields {
            let field_value = host_field(value, &field.name).unwrap_or(&HostValue::Null);
            field
                .handler
                .write(guest, ptr + field.offset, field_value, cleanup)
                .map_err(|e| e.in_field(&field.name))?;
        }
        Ok(ptr)
    }
}
