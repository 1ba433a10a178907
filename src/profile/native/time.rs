//! Native timestamp handler.
//!
//! A timestamp is a 20-byte struct `{wall: u64, ext: i64, loc_ptr:
//! u32}`. The two 64-bit words follow the guest standard library's
//! encoding: without the monotonic flag, `wall` holds only the
//! nanosecond part and `ext` the seconds since year 1; with the flag
//! set, the seconds live in bits 1..34 of `wall`, counted from 1885.
//! Words are computed with host timestamp arithmetic. The location
//! pointer is always written 0 and never read: values are UTC.

use crate::cleanup::Cleanup;
use crate::error::{MarshalError, Result};
use crate::handler::{expect_slots, HandlerInfo, TypeHandler};
use crate::instance::GuestInstance;
use crate::value::HostValue;
use chrono::{DateTime, Timelike, Utc};

/// Seconds from year 1 to the Unix epoch.
const UNIX_TO_ABSOLUTE: i64 = (1969 * 365 + 1969 / 4 - 1969 / 100 + 1969 / 400) * 86_400;

/// Seconds from year 1 to 1885, the monotonic wall epoch.
const WALL_EPOCH: i64 = (1884 * 365 + 1884 / 4 - 1884 / 100 + 1884 / 400) * 86_400;

const HAS_MONOTONIC: u64 = 1 << 63;
const NSEC_MASK: u64 = (1 << 30) - 1;
const NSEC_SHIFT: u32 = 30;

#[derive(Debug)]
pub struct NativeTimeHandler {
    info: HandlerInfo,
}

impl NativeTimeHandler {
    pub fn new(descriptor: &str) -> Self {
        Self {
            info: HandlerInfo::new(descriptor, 20, 8, 3),
        }
    }

    fn from_words(&self, wall: u64, ext: i64) -> Result<HostValue> {
        let nsec = (wall & NSEC_MASK) as u32;
        let absolute_seconds = if wall & HAS_MONOTONIC != 0 {
            WALL_EPOCH + ((wall << 1) >> (NSEC_SHIFT + 1)) as i64
        } else {
            ext
        };
        let unix = absolute_seconds - UNIX_TO_ABSOLUTE;
        let instant =
            DateTime::from_timestamp(unix, nsec).ok_or_else(|| MarshalError::OutOfRange {
                descriptor: self.info.descriptor.clone(),
                value: format!("seconds {unix}"),
            })?;
        Ok(HostValue::Timestamp(instant))
    }

    fn to_words(&self, instant: DateTime<Utc>) -> Result<(u64, i64)> {
        // Always emit the stripped (non-monotonic) form.
        let wall = u64::from(instant.nanosecond() % 1_000_000_000);
        let ext = instant
            .timestamp()
            .checked_add(UNIX_TO_ABSOLUTE)
            .ok_or_else(|| MarshalError::OutOfRange {
                descriptor: self.info.descriptor.clone(),
                value: instant.to_rfc3339(),
            })?;
        Ok((wall, ext))
    }
}

impl TypeHandler for NativeTimeHandler {
    fn info(&self) -> &HandlerInfo {
        &self.info
    }

    fn read(&self, guest: &mut dyn GuestInstance, offset: u32) -> Result<HostValue> {
        let wall = guest.read_u64(offset)?;
        let ext = guest.read_u64(offset + 8)? as i64;
        // The loc pointer is never read; values are UTC.
        self.from_words(wall, ext)
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
        let instant = value.coerce_timestamp(&self.info.descriptor)?;
        let (wall, ext) = self.to_words(instant)?;
        guest.write_u64(offset, wall)?;
        guest.write_u64(offset + 8, ext as u64)?;
        guest.write_u32(offset + 16, 0)
    }

    fn decode(&self, _guest: &mut dyn GuestInstance, slots: &[u64]) -> Result<HostValue> {
        expect_slots(&self.info, slots)?;
        self.from_words(slots[0], slots[1] as i64)
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
        let instant = value.coerce_timestamp(&self.info.descriptor)?;
        let (wall, ext) = self.to_words(instant)?;
        slots.push(wall);
        slots.push(ext as u64);
        slots.push(0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_roundtrip() {
        let h = NativeTimeHandler::new("time.Time");
        let instant = DateTime::parse_from_rfc3339("2024-01-02T03:04:05.123456789Z")
            .unwrap()
            .with_timezone(&Utc);
        let (wall, ext) = h.to_words(instant).unwrap();
        assert_eq!(wall, 123_456_789);
        assert_eq!(ext, instant.timestamp() + UNIX_TO_ABSOLUTE);

        match h.from_words(wall, ext).unwrap() {
            HostValue::Timestamp(t) => assert_eq!(t, instant),
            other => panic!("expected timestamp, got {other:?}"),
        }
    }

    #[test]
    fn monotonic_wall_encoding_is_understood() {
        let h = NativeTimeHandler::new("time.Time");
        let instant = DateTime::parse_from_rfc3339("2020-06-01T12:00:00.5Z")
            .unwrap()
            .with_timezone(&Utc);
        let seconds_since_1885 = (instant.timestamp() + UNIX_TO_ABSOLUTE - WALL_EPOCH) as u64;
        let wall = HAS_MONOTONIC | (seconds_since_1885 << NSEC_SHIFT) | 500_000_000;

        // ext carries a monotonic reading in this form; it must be ignored.
        match h.from_words(wall, 12345).unwrap() {
            HostValue::Timestamp(t) => assert_eq!(t, instant),
            other => panic!("expected timestamp, got {other:?}"),
        }
    }
}
