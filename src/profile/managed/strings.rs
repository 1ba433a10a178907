//! Managed string handler: UTF-16 LE payload behind a class-2 object.

use super::{check_class, object_byte_length, ManagedObject, STRING_CLASS_ID};
use crate::cleanup::Cleanup;
use crate::error::Result;
use crate::handler::HandlerInfo;
use crate::instance::GuestInstance;
use crate::profile::Layout;
use crate::value::HostValue;

#[derive(Debug)]
pub struct ManagedStringHandler {
    info: HandlerInfo,
}

impl ManagedStringHandler {
    pub fn new(descriptor: &str, nullable: bool) -> Self {
        let layout = Layout::POINTER;
        let info = HandlerInfo::new(descriptor, layout.size, layout.alignment, layout.slot_count)
            .nullable(nullable);
        Self { info }
    }
}

impl ManagedObject for ManagedStringHandler {
    fn object_info(&self) -> &HandlerInfo {
        &self.info
    }

    fn read_object(&self, guest: &mut dyn GuestInstance, ptr: u32) -> Result<HostValue> {
        check_class(guest, ptr, STRING_CLASS_ID, &self.info.descriptor)?;
        let byte_len = object_byte_length(guest, ptr)?;
        if byte_len == 0 {
            return Ok(HostValue::Text(String::new()));
        }
        let bytes = guest.read_bytes(ptr, byte_len)?;
        Ok(HostValue::Text(decode_utf16_le(&bytes)))
    }

    fn write_object(
        &self,
        guest: &mut dyn GuestInstance,
        value: &HostValue,
        cleanup: &mut Cleanup,
    ) -> Result<u32> {
        let text = value.coerce_text(&self.info.descriptor)?;
        let bytes = encode_utf16_le(&text);
        let ptr = guest.allocate_and_pin(bytes.len() as u32, STRING_CLASS_ID, cleanup)?;
        guest.write_bytes(ptr, &bytes)?;
        Ok(ptr)
    }
}

/// Decode a UTF-16 LE byte payload. Unpaired surrogates become the
/// replacement character; a trailing odd byte is dropped.
pub(crate) fn decode_utf16_le(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

pub(crate) fn encode_utf16_le(text: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(text.len() * 2);
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf16_codec_roundtrip() {
        let bytes = encode_utf16_le("héllo");
        assert_eq!(
            bytes,
            vec![0x68, 0x00, 0xE9, 0x00, 0x6C, 0x00, 0x6C, 0x00, 0x6F, 0x00]
        );
        assert_eq!(decode_utf16_le(&bytes), "héllo");
    }

    #[test]
    fn utf16_surrogate_pairs() {
        let bytes = encode_utf16_le("🦀");
        assert_eq!(bytes.len(), 4);
        assert_eq!(decode_utf16_le(&bytes), "🦀");
    }
}
