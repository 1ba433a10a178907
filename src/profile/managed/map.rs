//! Managed mapping and set handlers.
//!
//! A mapping is a 16-byte object `{entries_ptr, buckets_ptr, count,
//! capacity}`. Entries live in a class-1 buffer, packed at the entry
//! stride in insertion order; the buckets buffer is written zeroed and
//! left for the guest to populate under its own rehash discipline. A set
//! is a mapping whose entries carry no value.

use super::{check_class, ManagedObject, BUFFER_CLASS_ID};
use crate::cleanup::Cleanup;
use crate::error::{MarshalError, Result};
use crate::handler::{HandlerInfo, TypeHandler};
use crate::instance::GuestInstance;
use crate::profile::{entry_layout, Layout};
use crate::value::HostValue;
use std::sync::Arc;

// Mapping object field offsets.
const MAP_ENTRIES: u32 = 0;
const MAP_BUCKETS: u32 = 4;
const MAP_COUNT: u32 = 8;
const MAP_CAPACITY: u32 = 12;
const MAP_SIZE: u32 = 16;

fn bucket_capacity(count: usize) -> u32 {
    (count.max(4) as u32).next_power_of_two()
}

fn duplicate_key(key: &HostValue) -> MarshalError {
    MarshalError::DuplicateKey {
        key: key.to_string(),
    }
}

#[derive(Debug)]
pub struct ManagedMapHandler {
    info: HandlerInfo,
    class_id: u32,
    key: Arc<dyn TypeHandler>,
    value: Arc<dyn TypeHandler>,
}

impl ManagedMapHandler {
    pub fn new(
        descriptor: &str,
        nullable: bool,
        class_id: u32,
        key: Arc<dyn TypeHandler>,
        value: Arc<dyn TypeHandler>,
    ) -> Self {
        let layout = Layout::POINTER;
        let info = HandlerInfo::new(descriptor, layout.size, layout.alignment, layout.slot_count)
            .nullable(nullable);
        Self {
            info,
            class_id,
            key,
            value,
        }
    }
}

impl ManagedObject for ManagedMapHandler {
    fn object_info(&self) -> &HandlerInfo {
        &self.info
    }

    fn read_object(&self, guest: &mut dyn GuestInstance, ptr: u32) -> Result<HostValue> {
        check_class(guest, ptr, self.class_id, &self.info.descriptor)?;
        let entries = guest.read_u32(ptr + MAP_ENTRIES)?;
        let count = guest.read_u32(ptr + MAP_COUNT)?;
        let layout = entry_layout(self.key.info(), Some(self.value.info()));

        let mut pairs = Vec::with_capacity(count as usize);
        for i in 0..count {
            let base = entries + i * layout.size;
            let k = self.key.read(guest, base)?;
            let v = self.value.read(guest, base + layout.value_offset)?;
            pairs.push((k, v));
        }
        Ok(HostValue::Map(pairs))
    }

    fn write_object(
        &self,
        guest: &mut dyn GuestInstance,
        value: &HostValue,
        cleanup: &mut Cleanup,
    ) -> Result<u32> {
        let pairs = match value {
            HostValue::Map(pairs) => pairs.as_slice(),
            other => {
                return Err(MarshalError::CoercionError {
                    descriptor: self.info.descriptor.clone(),
                    found: other.kind(),
                })
            }
        };

        for (i, (key, _)) in pairs.iter().enumerate() {
            if pairs[..i].iter().any(|(seen, _)| seen == key) {
                return Err(duplicate_key(key));
            }
        }

        let layout = entry_layout(self.key.info(), Some(self.value.info()));
        let entries = guest.allocate_and_pin(
            pairs.len() as u32 * layout.size,
            BUFFER_CLASS_ID,
            cleanup,
        )?;
        for (i, (k, v)) in pairs.iter().enumerate() {
            let base = entries + i as u32 * layout.size;
            self.key.write(guest, base, k, cleanup)?;
            self.value
                .write(guest, base + layout.value_offset, v, cleanup)?;
        }

        let capacity = bucket_capacity(pairs.len());
        let buckets = guest.allocate_and_pin(capacity * 4, BUFFER_CLASS_ID, cleanup)?;
        guest.write_bytes(buckets, &vec![0u8; (capacity * 4) as usize])?;

        let map = guest.allocate_and_pin(MAP_SIZE, self.class_id, cleanup)?;
        guest.write_u32(map + MAP_ENTRIES, entries)?;
        guest.write_u32(map + MAP_BUCKETS, buckets)?;
        guest.write_u32(map + MAP_COUNT, pairs.len() as u32)?;
        guest.write_u32(map + MAP_CAPACITY, capacity)?;
        Ok(map)
    }
}

#[derive(Debug)]
pub struct ManagedSetHandler {
    info: HandlerInfo,
    class_id: u32,
    elem: Arc<dyn TypeHandler>,
}

impl ManagedSetHandler {
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

impl ManagedObject for ManagedSetHandler {
    fn object_info(&self) -> &HandlerInfo {
        &self.info
    }

    fn read_object(&self, guest: &mut dyn GuestInstance, ptr: u32) -> Result<HostValue> {
        check_class(guest, ptr, self.class_id, &self.info.descriptor)?;
        let entries = guest.read_u32(ptr + MAP_ENTRIES)?;
        let count = guest.read_u32(ptr + MAP_COUNT)?;
        let layout = entry_layout(self.elem.info(), None);

        let mut items = Vec::with_capacity(count as usize);
        for i in 0..count {
            items.push(self.elem.read(guest, entries + i * layout.size)?);
        }
        Ok(HostValue::Set(items))
    }

    fn write_object(
        &self,
        guest: &mut dyn GuestInstance,
        value: &HostValue,
        cleanup: &mut Cleanup,
    ) -> Result<u32> {
        let items = match value {
            HostValue::Set(items) | HostValue::Seq(items) => items.as_slice(),
            other => {
                return Err(MarshalError::CoercionError {
                    descriptor: self.info.descriptor.clone(),
                    found: other.kind(),
                })
            }
        };

        for (i, item) in items.iter().enumerate() {
            if items[..i].iter().any(|seen| seen == item) {
                return Err(duplicate_key(item));
            }
        }

        let layout = entry_layout(self.elem.info(), None);
        let entries = guest.allocate_and_pin(
            items.len() as u32 * layout.size,
            BUFFER_CLASS_ID,
            cleanup,
        )?;
        for (i, item) in items.iter().enumerate() {
            self.elem
                .write(guest, entries + i as u32 * layout.size, item, cleanup)?;
        }

        let capacity = bucket_capacity(items.len());
        let buckets = guest.allocate_and_pin(capacity * 4, BUFFER_CLASS_ID, cleanup)?;
        guest.write_bytes(buckets, &vec![0u8; (capacity * 4) as usize])?;

        let set = guest.allocate_and_pin(MAP_SIZE, self.class_id, cleanup)?;
        guest.write_u32(set + MAP_ENTRIES, entries)?;
        guest.write_u32(set + MAP_BUCKETS, buckets)?;
        guest.write_u32(set + MAP_COUNT, items.len() as u32)?;
        guest.write_u32(set + MAP_CAPACITY, capacity)?;
        Ok(set)
    }
}
