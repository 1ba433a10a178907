//! Planner memoisation and recursive type graphs.

mod common;

use common::FakeGuest;
use gantry::error::MarshalError;
use gantry::profile::managed::{ManagedPlanner, ManagedTypes};
use gantry::profile::native::{NativePlanner, NativeTypes};
use gantry::{Cleanup, HostValue, PluginMetadata};
use std::sync::Arc;

fn managed_planner() -> ManagedPlanner {
    let metadata: PluginMetadata = serde_json::from_value(serde_json::json!({
        "plugin": "fixtures",
        "language": "assemblyscript",
        "types": [
            {
                "kind": "record",
                "name": "Node",
                "size": 8,
                "fields": [
                    {"name": "value", "type": "i32", "offset": 0},
                    {"name": "next", "type": "Node | null", "offset": 4}
                ]
            }
        ],
        "class_ids": {"Node": 12, "Array<i32>": 4}
    }))
    .expect("fixture metadata");
    ManagedPlanner::new(ManagedTypes::from_metadata(&metadata))
}

fn native_planner() -> NativePlanner {
    let metadata: PluginMetadata = serde_json::from_value(serde_json::json!({
        "plugin": "fixtures",
        "language": "tinygo",
        "types": [
            {
                "kind": "record",
                "name": "Node",
                "size": 8,
                "fields": [
                    {"name": "value", "type": "int32", "offset": 0},
                    {"name": "next", "type": "*Node", "offset": 4}
                ]
            }
        ]
    }))
    .expect("fixture metadata");
    NativePlanner::new(NativeTypes::from_metadata(&metadata))
}

#[test]
fn planning_twice_returns_the_same_handler() {
    let planner = managed_planner();
    let first = planner.plan("Array<i32>").expect("plan");
    let second = planner.plan("Array<i32>").expect("plan again");
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.info(), second.info());
}

#[test]
fn unknown_and_unsupported_descriptors() {
    let planner = managed_planner();
    assert!(matches!(
        planner.plan("Widget").expect_err("unknown"),
        MarshalError::UnknownType(_)
    ));
    assert!(matches!(
        planner.plan("(x: i32) => i32").expect_err("function type"),
        MarshalError::UnsupportedType { .. }
    ));
    assert!(matches!(
        planner.plan("i32 | null").expect_err("nullable primitive"),
        MarshalError::UnsupportedType { .. }
    ));
    // Array syntax is not part of the managed grammar and gets a
    // specific rejection, not a generic unknown-type error.
    match planner.plan("[4]f64").expect_err("fixed array") {
        MarshalError::UnsupportedType { reason, .. } => {
            assert!(reason.contains("fixed-length array"));
        }
        other => panic!("expected UnsupportedType, got {other}"),
    }
    match planner.plan("StaticArray<f64>").expect_err("fixed array") {
        MarshalError::UnsupportedType { reason, .. } => {
            assert!(reason.contains("fixed-length array"));
        }
        other => panic!("expected UnsupportedType, got {other}"),
    }
}

#[test]
fn recursive_managed_record_terminates_and_roundtrips() {
    let planner = managed_planner();
    let handler = planner.plan("Node").expect("plan recursive type");
    let mut guest = FakeGuest::managed();
    let mut cleanup = Cleanup::new();
    let mut slots = Vec::new();

    let value = HostValue::Record(vec![
        ("value".to_string(), HostValue::Int(1)),
        (
            "next".to_string(),
            HostValue::Record(vec![
                ("value".to_string(), HostValue::Int(2)),
                ("next".to_string(), HostValue::Null),
            ]),
        ),
    ]);
    handler
        .encode(&mut guest, &value, &mut slots, &mut cleanup)
        .expect("encode");
    assert_eq!(handler.decode(&mut guest, &slots).expect("decode"), value);

    cleanup.release(&mut guest);
    assert_eq!(guest.live_pins(), 0);
}

#[test]
fn recursive_native_record_terminates_and_roundtrips() {
    let planner = native_planner();
    let handler = planner.plan("Node").expect("plan recursive type");
    let mut guest = FakeGuest::native();
    let offset = guest.scratch(8);
    let mut cleanup = Cleanup::new();

    let value = HostValue::Record(vec![
        ("value".to_string(), HostValue::Int(10)),
        (
            "next".to_string(),
            HostValue::Record(vec![
                ("value".to_string(), HostValue::Int(20)),
                ("next".to_string(), HostValue::Null),
            ]),
        ),
    ]);
    handler
        .write(&mut guest, offset, &value, &mut cleanup)
        .expect("write");
    assert_eq!(handler.read(&mut guest, offset).expect("read"), value);
}

#[test]
fn nested_descriptors_share_planned_children() {
    let planner = managed_planner();
    let outer = planner.plan("Array<i32>").expect("plan outer");
    let elem = planner.plan("i32").expect("plan elem");
    assert_eq!(elem.info().size, 4);
    assert_eq!(outer.info().size, 4);
    // The element descriptor was planned as part of the outer plan and
    // is served from the cache.
    let elem_again = planner.plan("i32").expect("plan elem again");
    assert!(Arc::ptr_eq(&elem, &elem_again));
}
