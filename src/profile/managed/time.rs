//! Managed timestamp handler.
//!
//! A date is a managed object whose payload holds epoch milliseconds as
//! a little-endian i64. Timezone metadata is not preserved; all values
//! are UTC.

use super::{check_class, ManagedObject};
use crate::cleanup::Cleanup;
use crate::error::{MarshalError, Result};
use crate::handler::HandlerInfo;
use crate::instance::GuestInstance;
use crate::profile::Layout;
use crate::value::HostValue;
use chrono::DateTime;

const DATE_PAYLOAD_SIZE: u32 = 8;

#[derive(Debug)]
pub struct ManagedTimeHandler {
    info: HandlerInfo,
    class_id: u32,
}

impl ManagedTimeHandler {
    pub fn new(descriptor: &str, nullable: bool, class_id: u32) -> Self {
        let layout = Layout::POINTER;
        let info = HandlerInfo::new(descriptor, layout.size, layout.alignment, layout.slot_count)
            .nullable(nullable);
        Self { info, class_id }
    }
}

impl ManagedObject for ManagedTimeHandler {
    fn object_info(&self) -> &HandlerInfo {
        &self.info
    }

    fn read_object(&self, guest: &mut dyn GuestInstance, ptr: u32) -> Result<HostValue> {
        check_class(guest, ptr, self.class_id, &self.info.descriptor)?;
        let millis = guest.read_u64(ptr)? as i64;
        let instant =
            DateTime::from_timestamp_millis(millis).ok_or_else(|| MarshalError::OutOfRange {
                descriptor: self.info.descriptor.clone(),
                value: millis.to_string(),
            })?;
        Ok(HostValue::Timestamp(instant))
    }

    fn write_object(
        &self,
        guest: &mut dyn GuestInstance,
        value: &HostValue,
        cleanup: &mut Cleanup,
    ) -> Result<u32> {
        let instant = value.coerce_timestamp(&self.info.descriptor)?;
        let millis = instant.timestamp_millis();
        let ptr = guest.allocate_and_pin(DATE_PAYLOAD_SIZE, self.class_id, cleanup)?;
        guest.write_u64(ptr, millis as u64)?;
        Ok(ptr)
    }
}
