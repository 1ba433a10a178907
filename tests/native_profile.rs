//! Native-profile handler behaviour against the fake guest.

mod common;

use chrono::{DateTime, Utc};
use common::FakeGuest;
use gantry::error::MarshalError;
use gantry::profile::native::{NativePlanner, NativeTypes};
use gantry::{Cleanup, GuestInstance, HostValue, PluginMetadata};

fn planner() -> NativePlanner {
    let metadata: PluginMetadata = serde_json::from_value(serde_json::json!({
        "plugin": "fixtures",
        "language": "tinygo",
        "types": [
            {
                "kind": "record",
                "name": "Point",
                "size": 16,
                "fields": [
                    {"name": "x", "type": "float64", "offset": 0},
                    {"name": "y", "type": "float64", "offset": 8}
                ]
            },
            {
                "kind": "variant",
                "name": "Outcome",
                "cases": [
                    {"name": "ok", "payload": "float64"},
                    {"name": "err", "payload": "string"},
                    {"name": "pending"}
                ]
            }
        ]
    }))
    .expect("fixture metadata");
    NativePlanner::new(NativeTypes::from_metadata(&metadata))
}

#[test]
fn time_write_at_offset_zero_is_utc_with_null_location() {
    let planner = planner();
    let handler = planner.plan("time.Time").expect("plan");
    let mut guest = FakeGuest::native();
    let mut cleanup = Cleanup::new();

    let instant: DateTime<Utc> = DateTime::parse_from_rfc3339("2024-01-02T03:04:05.000000123Z")
        .expect("fixture instant")
        .with_timezone(&Utc);
    handler
        .write(&mut guest, 0, &HostValue::Timestamp(instant), &mut cleanup)
        .expect("write");

    // 20-byte struct: non-zero wall and ext, zero loc pointer.
    assert_ne!(guest.read_u64(0).expect("wall"), 0);
    assert_ne!(guest.read_u64(8).expect("ext"), 0);
    assert_eq!(guest.read_u32(16).expect("loc"), 0);

    assert_eq!(
        handler.read(&mut guest, 0).expect("read"),
        HostValue::Timestamp(instant)
    );
    assert!(cleanup.is_empty());
}

#[test]
fn sequence_of_nullable_int_uses_presence_envelopes() {
    let planner = planner();
    let handler = planner.plan("[]*int32").expect("plan");
    let mut guest = FakeGuest::native();
    let mut cleanup = Cleanup::new();
    let mut slots = Vec::new();

    let value = HostValue::Seq(vec![
        HostValue::Int(1),
        HostValue::Null,
        HostValue::Int(3),
    ]);
    handler
        .encode(&mut guest, &value, &mut slots, &mut cleanup)
        .expect("encode");

    let data_ptr = slots[0] as u32;
    assert_eq!(slots[1], 3);

    // Envelope stride is 8: present byte, padding, 4-byte payload.
    assert_eq!(guest.read_u8(data_ptr).expect("present 0"), 1);
    assert_eq!(guest.read_u32(data_ptr + 4).expect("value 0"), 1);
    assert_eq!(guest.read_u8(data_ptr + 8).expect("present 1"), 0);
    assert_eq!(guest.read_u8(data_ptr + 16).expect("present 2"), 1);
    assert_eq!(guest.read_u32(data_ptr + 20).expect("value 2"), 3);

    assert_eq!(handler.decode(&mut guest, &slots).expect("decode"), value);
}

#[test]
fn string_struct_is_pointer_and_length() {
    let planner = planner();
    let handler = planner.plan("string").expect("plan");
    let mut guest = FakeGuest::native();
    let offset = guest.scratch(8);
    let mut cleanup = Cleanup::new();

    let value = HostValue::Text("héllo".to_string());
    handler
        .write(&mut guest, offset, &value, &mut cleanup)
        .expect("write");

    let data_ptr = guest.read_u32(offset).expect("data ptr");
    let len = guest.read_u32(offset + 4).expect("len");
    assert_eq!(len, 6); // UTF-8: h, é (2 bytes), l, l, o
    assert_eq!(
        guest.read_bytes(data_ptr, len).expect("payload"),
        "héllo".as_bytes().to_vec()
    );

    assert_eq!(handler.read(&mut guest, offset).expect("read"), value);
}

#[test]
fn empty_string_has_null_data_pointer() {
    let planner = planner();
    let handler = planner.plan("string").expect("plan");
    let mut guest = FakeGuest::native();
    let offset = guest.scratch(8);
    let mut cleanup = Cleanup::new();

    handler
        .write(
            &mut guest,
            offset,
            &HostValue::Text(String::new()),
            &mut cleanup,
        )
        .expect("write");
    assert!(guest.alloc_calls.is_empty());
    assert_eq!(
        handler.read(&mut guest, offset).expect("read"),
        HostValue::Text(String::new())
    );
}

#[test]
fn byte_slice_roundtrips_with_capacity() {
    let planner = planner();
    let handler = planner.plan("[]byte").expect("plan");
    let mut guest = FakeGuest::native();
    let mut cleanup = Cleanup::new();
    let mut slots = Vec::new();

    let value = HostValue::Bytes(vec![9, 8, 7]);
    handler
        .encode(&mut guest, &value, &mut slots, &mut cleanup)
        .expect("encode");
    assert_eq!(slots.len(), 3);
    assert_eq!(slots[1], 3);
    assert_eq!(slots[2], 3);
    assert_eq!(handler.decode(&mut guest, &slots).expect("decode"), value);
}

#[test]
fn fixed_array_elements_occupy_exact_extents() {
    let planner = planner();
    let handler = planner.plan("[4]int16").expect("plan");
    let mut guest = FakeGuest::native();
    let offset = guest.scratch(8);
    let mut cleanup = Cleanup::new();

    let value = HostValue::Seq(vec![
        HostValue::Int(100),
        HostValue::Int(-100),
        HostValue::Int(0),
        HostValue::Int(7),
    ]);
    handler
        .write(&mut guest, offset, &value, &mut cleanup)
        .expect("write");

    assert_eq!(handler.info().size, 8);
    assert_eq!(guest.read_u16(offset).expect("elem 0"), 100);
    assert_eq!(guest.read_u16(offset + 2).expect("elem 1"), (-100i16) as u16);
    assert_eq!(guest.read_u16(offset + 4).expect("elem 2"), 0);
    assert_eq!(guest.read_u16(offset + 6).expect("elem 3"), 7);

    assert_eq!(handler.read(&mut guest, offset).expect("read"), value);

    let err = handler
        .write(
            &mut guest,
            offset,
            &HostValue::Seq(vec![HostValue::Int(1)]),
            &mut cleanup,
        )
        .expect_err("length mismatch");
    assert!(matches!(err, MarshalError::OutOfRange { .. }));
}

#[test]
fn map_preserves_insertion_order_and_rejects_duplicates() {
    let planner = planner();
    let handler = planner.plan("map[string]int32").expect("plan");
    let mut guest = FakeGuest::native();
    let mut cleanup = Cleanup::new();
    let mut slots = Vec::new();

    let value = HostValue::Map(vec![
        (HostValue::Text("first".to_string()), HostValue::Int(1)),
        (HostValue::Text("second".to_string()), HostValue::Int(2)),
    ]);
    handler
        .encode(&mut guest, &value, &mut slots, &mut cleanup)
        .expect("encode");
    assert_eq!(handler.decode(&mut guest, &slots).expect("decode"), value);

    let mut dup_slots = Vec::new();
    let err = handler
        .encode(
            &mut guest,
            &HostValue::Map(vec![
                (HostValue::Text("k".to_string()), HostValue::Int(1)),
                (HostValue::Text("k".to_string()), HostValue::Int(2)),
            ]),
            &mut dup_slots,
            &mut cleanup,
        )
        .expect_err("duplicate");
    assert!(matches!(err, MarshalError::DuplicateKey { .. }));
}

#[test]
fn set_struct_roundtrips() {
    let planner = planner();
    let handler = planner.plan("set[string]").expect("plan");
    let mut guest = FakeGuest::native();
    let mut cleanup = Cleanup::new();
    let mut slots = Vec::new();

    let value = HostValue::Set(vec![
        HostValue::Text("x".to_string()),
        HostValue::Text("y".to_string()),
    ]);
    handler
        .encode(&mut guest, &value, &mut slots, &mut cleanup)
        .expect("encode");
    assert_eq!(handler.decode(&mut guest, &slots).expect("decode"), value);
}

#[test]
fn struct_fields_flatten_into_register_slots() {
    let planner = planner();
    let handler = planner.plan("Point").expect("plan");
    let mut guest = FakeGuest::native();
    let mut cleanup = Cleanup::new();
    let mut slots = Vec::new();

    let value = HostValue::Record(vec![
        ("x".to_string(), HostValue::Float(1.5)),
        ("y".to_string(), HostValue::Float(-2.25)),
    ]);
    handler
        .encode(&mut guest, &value, &mut slots, &mut cleanup)
        .expect("encode");
    assert_eq!(slots.len(), 2);
    assert_eq!(f64::from_bits(slots[0]), 1.5);
    assert_eq!(f64::from_bits(slots[1]), -2.25);

    assert_eq!(handler.decode(&mut guest, &slots).expect("decode"), value);
}

#[test]
fn struct_write_then_read_inline() {
    let planner = planner();
    let handler = planner.plan("Point").expect("plan");
    let mut guest = FakeGuest::native();
    let offset = guest.scratch(16);
    let mut cleanup = Cleanup::new();

    let value = HostValue::Record(vec![
        ("x".to_string(), HostValue::Float(3.0)),
        ("y".to_string(), HostValue::Float(4.0)),
    ]);
    handler
        .write(&mut guest, offset, &value, &mut cleanup)
        .expect("write");
    assert_eq!(handler.read(&mut guest, offset).expect("read"), value);
}

#[test]
fn variant_zero_pads_narrow_cases_in_slot_form() {
    let planner = planner();
    let handler = planner.plan("Outcome").expect("plan");
    let mut guest = FakeGuest::native();
    let mut cleanup = Cleanup::new();

    // The widest payload (string) takes two slots, so every encoded
    // variant occupies three.
    assert_eq!(handler.info().slot_count, 3);

    let ok = HostValue::Variant {
        case: "ok".to_string(),
        payload: Box::new(HostValue::Float(9.5)),
    };
    let mut slots = Vec::new();
    handler
        .encode(&mut guest, &ok, &mut slots, &mut cleanup)
        .expect("encode ok");
    assert_eq!(slots.len(), 3);
    assert_eq!(slots[0], 0);
    assert_eq!(handler.decode(&mut guest, &slots).expect("decode"), ok);

    let pending = HostValue::Variant {
        case: "pending".to_string(),
        payload: Box::new(HostValue::Null),
    };
    let mut slots = Vec::new();
    handler
        .encode(&mut guest, &pending, &mut slots, &mut cleanup)
        .expect("encode pending");
    assert_eq!(slots, vec![2, 0, 0]);
    assert_eq!(handler.decode(&mut guest, &slots).expect("decode"), pending);

    let err = HostValue::Variant {
        case: "err".to_string(),
        payload: Box::new(HostValue::Text("boom".to_string())),
    };
    let mut slots = Vec::new();
    handler
        .encode(&mut guest, &err, &mut slots, &mut cleanup)
        .expect("encode err");
    assert_eq!(handler.decode(&mut guest, &slots).expect("decode"), err);
}

#[test]
fn boxed_nullable_string_roundtrips() {
    let planner = planner();
    let handler = planner.plan("*string").expect("plan");
    let mut guest = FakeGuest::native();
    let offset = guest.scratch(4);
    let mut cleanup = Cleanup::new();

    handler
        .write(&mut guest, offset, &HostValue::Null, &mut cleanup)
        .expect("write null");
    assert_eq!(
        handler.read(&mut guest, offset).expect("read null"),
        HostValue::Null
    );

    let value = HostValue::Text("boxed".to_string());
    handler
        .write(&mut guest, offset, &value, &mut cleanup)
        .expect("write");
    assert_eq!(handler.read(&mut guest, offset).expect("read"), value);
}
