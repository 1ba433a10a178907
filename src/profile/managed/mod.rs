//! Managed-heap profile (UTF-16 guests).
//!
//! Every managed object is preceded by a 16-byte header whose last two
//! 32-bit words are the class id and the payload byte length; pointers
//! address the payload, so the header is read at `ptr-8` and `ptr-4`.
//! Host-side allocations go through the guest allocator with a class id
//! and must be pinned for the duration of the call.

mod bytes;
mod list;
mod map;
mod planner;
mod record;
mod strings;
mod time;
mod typeinfo;
mod variant;

pub use planner::ManagedPlanner;
pub use typeinfo::ManagedTypes;

use crate::cleanup::Cleanup;
use crate::error::{MarshalError, Result};
use crate::handler::{expect_slots, HandlerInfo, TypeHandler};
use crate::instance::GuestInstance;
use crate::value::HostValue;

/// Size of the object header preceding every managed allocation.
pub const OBJECT_HEADER_SIZE: u32 = 16;

/// Reserved class id of the raw buffer object backing byte and element
/// storage.
pub const BUFFER_CLASS_ID: u32 = 1;

/// Reserved class id of the string object.
pub const STRING_CLASS_ID: u32 = 2;

/// Verify the class id in the header of the object at `ptr`.
pub(crate) fn check_class(
    guest: &dyn GuestInstance,
    ptr: u32,
    expected: u32,
    descriptor: &str,
) -> Result<()> {
    let found = guest.read_u32(ptr - 8)?;
    if found != expected {
        return Err(MarshalError::TypeMismatch {
            descriptor: descriptor.to_string(),
            expected,
            found,
        });
    }
    Ok(())
}

/// Payload byte length from the header of the object at `ptr`.
pub(crate) fn object_byte_length(guest: &dyn GuestInstance, ptr: u32) -> Result<u32> {
    guest.read_u32(ptr - 4)
}

/// Every managed handler marshals through a payload pointer; the
/// pointer-vs-null plumbing is identical across kinds, so handler kinds
/// implement this trait and are wrapped in [`ManagedHandler`] for the
/// full [`TypeHandler`] surface.
pub(crate) trait ManagedObject: Send + Sync + std::fmt::Debug {
    fn object_info(&self) -> &HandlerInfo;

    /// Read the object behind a non-null payload pointer.
    fn read_object(&self, guest: &mut dyn GuestInstance, ptr: u32) -> Result<HostValue>;

    /// Allocate, pin, and fill a guest object for a non-null value,
    /// returning the payload pointer.
    fn write_object(
        &self,
        guest: &mut dyn GuestInstance,
        value: &HostValue,
        cleanup: &mut Cleanup,
    ) -> Result<u32>;
}

/// Adapter giving a [`ManagedObject`] kind the full [`TypeHandler`]
/// surface.
#[derive(Debug)]
pub(crate) struct ManagedHandler<K>(pub(crate) K);

impl<K: ManagedObject> TypeHandler for ManagedHandler<K> {
    fn info(&self) -> &HandlerInfo {
        self.0.object_info()
    }

    fn read(&self, guest: &mut dyn GuestInstance, offset: u32) -> Result<HostValue> {
        let info = self.0.object_info();
        let ptr = if offset == 0 { 0 } else { guest.read_u32(offset)? };
        if ptr == 0 {
            return if info.nullable {
                Ok(HostValue::Null)
            } else {
                Err(MarshalError::NullViolation {
                    descriptor: info.descriptor.clone(),
                })
            };
        }
        self.0.read_object(guest, ptr)
    }

    fn write(
        &self,
        guest: &mut dyn GuestInstance,
        offset: u32,
        value: &HostValue,
        cleanup: &mut Cleanup,
    ) -> Result<()> {
        let info = self.0.object_info();
        if value.is_null() {
            if !info.nullable {
                return Err(MarshalError::NullViolation {
                    descriptor: info.descriptor.clone(),
                });
            }
            return guest.write_u32(offset, 0);
        }
        let ptr = self.0.write_object(guest, value, cleanup)?;
        guest.write_u32(offset, ptr)
    }

    fn decode(&self, guest: &mut dyn GuestInstance, slots: &[u64]) -> Result<HostValue> {
        let info = self.0.object_info();
        expect_slots(info, slots)?;
        let ptr = slots[0] as u32;
        if ptr == 0 {
            return if info.nullable {
                Ok(HostValue::Null)
            } else {
                Err(MarshalError::NullViolation {
                    descriptor: info.descriptor.clone(),
                })
            };
        }
        self.0.read_object(guest, ptr)
    }

    fn encode(
        &self,
        guest: &mut dyn GuestInstance,
        value: &HostValue,
        slots: &mut Vec<u64>,
        cleanup: &mut Cleanup,
    ) -> Result<()> {
        let info = self.0.object_info();
        if value.is_null() {
            if !info.nullable {
                return Err(MarshalError::NullViolation {
                    descriptor: info.descriptor.clone(),
                });
            }
            slots.push(0);
            return Ok(());
        }
        let ptr = self.0.write_object(guest, value, cleanup)?;
        slots.push(u64::from(ptr));
        Ok(())
    }
}
