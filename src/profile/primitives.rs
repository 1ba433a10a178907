//! Fixed-width little-endian primitive handlers, shared by both
//! profiles.

use crate::cleanup::Cleanup;
use crate::error::{MarshalError, Result};
use crate::handler::{expect_slots, HandlerInfo, TypeHandler};
use crate::instance::GuestInstance;
use crate::profile::Primitive;
use crate::value::HostValue;

#[derive(Debug)]
pub struct PrimitiveHandler {
    info: HandlerInfo,
    prim: Primitive,
}

impl PrimitiveHandler {
    pub fn new(descriptor: &str, prim: Primitive) -> Self {
        let info = HandlerInfo::new(descriptor, prim.size(), prim.alignment(), 1);
        Self { info, prim }
    }

    fn range_error(&self, value: impl std::fmt::Display) -> MarshalError {
        MarshalError::OutOfRange {
            descriptor: self.info.descriptor.clone(),
            value: value.to_string(),
        }
    }

    /// Coerce a host value into this primitive's raw slot representation.
    fn to_slot(&self, value: &HostValue) -> Result<u64> {
        let d = self.info.descriptor.as_str();
        match self.prim {
            Primitive::Bool => Ok(u64::from(value.coerce_bool(d)?)),
            Primitive::I8 => {
                let v = value.coerce_i64(d)?;
                let v = i8::try_from(v).map_err(|_| self.range_error(v))?;
                Ok(v as u8 as u64)
            }
            Primitive::I16 => {
                let v = value.coerce_i64(d)?;
                let v = i16::try_from(v).map_err(|_| self.range_error(v))?;
                Ok(v as u16 as u64)
            }
            Primitive::I32 => {
                let v = value.coerce_i64(d)?;
                let v = i32::try_from(v).map_err(|_| self.range_error(v))?;
                Ok(v as u32 as u64)
            }
            Primitive::I64 => Ok(value.coerce_i64(d)? as u64),
            Primitive::U8 => {
                let v = value.coerce_u64(d)?;
                let v = u8::try_from(v).map_err(|_| self.range_error(v))?;
                Ok(u64::from(v))
            }
            Primitive::U16 => {
                let v = value.coerce_u64(d)?;
                let v = u16::try_from(v).map_err(|_| self.range_error(v))?;
                Ok(u64::from(v))
            }
            Primitive::U32 => {
                let v = value.coerce_u64(d)?;
                let v = u32::try_from(v).map_err(|_| self.range_error(v))?;
                Ok(u64::from(v))
            }
            Primitive::U64 => value.coerce_u64(d),
            Primitive::F32 => {
                let v = value.coerce_f64(d)? as f32;
                Ok(u64::from(v.to_bits()))
            }
            Primitive::F64 => Ok(value.coerce_f64(d)?.to_bits()),
        }
    }

    /// Interpret a raw slot as a host value.
    ///
    /// Floating-point NaN payloads are canonicalised to a single quiet
    /// NaN on decode.
    fn from_slot(&self, slot: u64) -> HostValue {
        match self.prim {
            Primitive::Bool => HostValue::Bool(slot & 0xFF != 0),
            Primitive::I8 => HostValue::Int(i64::from(slot as u8 as i8)),
            Primitive::I16 => HostValue::Int(i64::from(slot as u16 as i16)),
            Primitive::I32 => HostValue::Int(i64::from(slot as u32 as i32)),
            Primitive::I64 => HostValue::Int(slot as i64),
            Primitive::U8 => HostValue::UInt(u64::from(slot as u8)),
            Primitive::U16 => HostValue::UInt(u64::from(slot as u16)),
            Primitive::U32 => HostValue::UInt(u64::from(slot as u32)),
            Primitive::U64 => HostValue::UInt(slot),
            Primitive::F32 => {
                let v = f32::from_bits(slot as u32);
                let v = if v.is_nan() { f32::NAN } else { v };
                HostValue::Float(f64::from(v))
            }
            Primitive::F64 => {
                let v = f64::from_bits(slot);
                let v = if v.is_nan() { f64::NAN } else { v };
                HostValue::Float(v)
            }
        }
    }
}

impl TypeHandler for PrimitiveHandler {
    fn info(&self) -> &HandlerInfo {
        &self.info
    }

    fn read(&self, guest: &mut dyn GuestInstance, offset: u32) -> Result<HostValue> {
        let slot = match self.info.size {
            1 => u64::from(guest.read_u8(offset)?),
            2 => u64::from(guest.read_u16(offset)?),
            4 => u64::from(guest.read_u32(offset)?),
            _ => guest.read_u64(offset)?,
        };
        Ok(self.from_slot(slot))
    }

    fn write(
        &self,
        guest: &mut dyn GuestInstance,
        offset: u32,
        value: &HostValue,
        _cleanup: &mut Cleanup,
    ) -> Result<()> {
        if value.is_null() {
            return Err(MarshalError::NullViolation {
                descriptor: self.info.descriptor.clone(),
            });
        }
        let slot = self.to_slot(value)?;
        match self.info.size {
            1 => guest.write_u8(offset, slot as u8),
            2 => guest.write_u16(offset, slot as u16),
            4 => guest.write_u32(offset, slot as u32),
            _ => guest.write_u64(offset, slot),
        }
    }

    fn decode(&self, _guest: &mut dyn GuestInstance, slots: &[u64]) -> Result<HostValue> {
        expect_slots(&self.info, slots)?;
        Ok(self.from_slot(slots[0]))
    }

    fn encode(
        &self,
        _guest: &mut dyn GuestInstance,
        value: &HostValue,
        slots: &mut Vec<u64>,
        _cleanup: &mut Cleanup,
    ) -> Result<()> {
        if value.is_null() {
            return Err(MarshalError::NullViolation {
                descriptor: self.info.descriptor.clone(),
            });
        }
        slots.push(self.to_slot(value)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_roundtrips() {
        let h = PrimitiveHandler::new("i32", Primitive::I32);
        let slot = h.to_slot(&HostValue::Int(-42)).unwrap();
        assert_eq!(h.from_slot(slot), HostValue::Int(-42));

        let h = PrimitiveHandler::new("f32", Primitive::F32);
        let slot = h.to_slot(&HostValue::Float(1.5)).unwrap();
        assert_eq!(h.from_slot(slot), HostValue::Float(1.5));
    }

    #[test]
    fn out_of_range_is_rejected() {
        let h = PrimitiveHandler::new("u8", Primitive::U8);
        let err = h.to_slot(&HostValue::Int(300)).unwrap_err();
        assert!(matches!(err, MarshalError::OutOfRange { .. }));
    }

    #[test]
    fn nan_payloads_canonicalise_on_decode() {
        let h = PrimitiveHandler::new("f64", Primitive::F64);
        // A signalling NaN with a payload.
        let slot = 0x7FF0_0000_0000_0001u64;
        match h.from_slot(slot) {
            HostValue::Float(v) => {
                assert!(v.is_nan());
                assert_eq!(v.to_bits(), f64::NAN.to_bits());
            }
            other => panic!("expected float, got {other:?}"),
        }
    }
}
