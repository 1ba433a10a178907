//! Call-marshaller behaviour: slot packing, cleanup on every exit path,
//! cancellation, and error context.

mod common;

use common::{ExportOutcome, FakeGuest};
use gantry::error::MarshalError;
use gantry::profile::managed::{ManagedPlanner, ManagedTypes};
use gantry::{
    invoke_function, CancelToken, Cleanup, FunctionPlan, HostValue, Planner, PluginMetadata,
};

fn planner() -> Planner {
    let metadata: PluginMetadata = serde_json::from_value(serde_json::json!({
        "plugin": "fixtures",
        "language": "assemblyscript",
        "class_ids": {}
    }))
    .expect("fixture metadata");
    Planner::Managed(ManagedPlanner::new(ManagedTypes::from_metadata(&metadata)))
}

fn concat_plan(planner: &Planner) -> FunctionPlan {
    let signature = serde_json::from_value(serde_json::json!({
        "name": "concat",
        "parameters": [
            {"name": "left", "type": "string"},
            {"name": "right", "type": "string"}
        ],
        "return_type": "string"
    }))
    .expect("fixture signature");
    FunctionPlan::from_signature(&signature, planner).expect("plan function")
}

#[test]
fn successful_call_decodes_result_and_releases_pins() {
    let planner = planner();
    let plan = concat_plan(&planner);
    let mut guest = FakeGuest::managed();

    // Stage the return value in guest memory ahead of the call.
    let string_handler = planner.plan("string").expect("plan string");
    let mut staging = Cleanup::new();
    let mut result_slots = Vec::new();
    string_handler
        .encode(
            &mut guest,
            &HostValue::Text("ab".to_string()),
            &mut result_slots,
            &mut staging,
        )
        .expect("stage result");
    staging.release(&mut guest);
    guest.script_export("concat", ExportOutcome::Return(result_slots));

    let result = invoke_function(
        &mut guest,
        &plan,
        &[
            HostValue::Text("a".to_string()),
            HostValue::Text("b".to_string()),
        ],
        &CancelToken::new(),
    )
    .expect("call");

    assert_eq!(result, HostValue::Text("ab".to_string()));
    assert_eq!(guest.invocations.len(), 1);
    assert_eq!(guest.invocations[0].0, "concat");
    // One slot per string argument.
    assert_eq!(guest.invocations[0].1.len(), 2);
    assert_eq!(guest.live_pins(), 0);
}

#[test]
fn export_failure_leaves_zero_pins_outstanding() {
    let planner = planner();
    let plan = concat_plan(&planner);
    let mut guest = FakeGuest::managed();
    guest.script_export("concat", ExportOutcome::Fail("guest panicked".to_string()));

    let err = invoke_function(
        &mut guest,
        &plan,
        &[
            HostValue::Text("a".to_string()),
            HostValue::Text("b".to_string()),
        ],
        &CancelToken::new(),
    )
    .expect_err("export failure");

    assert!(matches!(err, MarshalError::GuestError { .. }));
    assert!(err.is_user_visible());
    // Both argument strings were allocated and pinned during encoding.
    assert_eq!(guest.alloc_calls.len(), 2);
    assert_eq!(guest.live_pins(), 0);
}

#[test]
fn encode_failure_carries_argument_context_and_unpins() {
    let planner = planner();
    let plan = concat_plan(&planner);
    let mut guest = FakeGuest::managed();

    let err = invoke_function(
        &mut guest,
        &plan,
        &[
            HostValue::Text("a".to_string()),
            HostValue::Seq(vec![]),
        ],
        &CancelToken::new(),
    )
    .expect_err("bad argument");

    match &err {
        MarshalError::Argument { index, name, .. } => {
            assert_eq!(*index, 1);
            assert_eq!(name, "right");
        }
        other => panic!("expected argument context, got {other}"),
    }
    assert!(matches!(err.root(), MarshalError::CoercionError { .. }));
    // The first argument had already been pinned; the failure released it.
    assert_eq!(guest.live_pins(), 0);
    assert!(guest.invocations.is_empty());
}

#[test]
fn arity_mismatch_is_rejected_before_encoding() {
    let planner = planner();
    let plan = concat_plan(&planner);
    let mut guest = FakeGuest::managed();

    let err = invoke_function(
        &mut guest,
        &plan,
        &[HostValue::Text("only".to_string())],
        &CancelToken::new(),
    )
    .expect_err("arity");

    assert!(matches!(err, MarshalError::ArityMismatch { .. }));
    assert!(guest.alloc_calls.is_empty());
}

#[test]
fn cancellation_aborts_before_the_export_runs() {
    let planner = planner();
    let plan = concat_plan(&planner);
    let mut guest = FakeGuest::managed();
    let cancel = CancelToken::new();
    cancel.cancel();

    let err = invoke_function(
        &mut guest,
        &plan,
        &[
            HostValue::Text("a".to_string()),
            HostValue::Text("b".to_string()),
        ],
        &cancel,
    )
    .expect_err("cancelled");

    assert!(matches!(err, MarshalError::Cancelled));
    assert!(guest.invocations.is_empty());
    assert_eq!(guest.live_pins(), 0);
}

#[test]
fn void_function_returns_null() {
    let planner = planner();
    let signature = serde_json::from_value(serde_json::json!({
        "name": "tick",
        "parameters": []
    }))
    .expect("fixture signature");
    let plan = FunctionPlan::from_signature(&signature, &planner).expect("plan");

    let mut guest = FakeGuest::managed();
    guest.script_export("tick", ExportOutcome::Return(vec![]));

    let result = invoke_function(&mut guest, &plan, &[], &CancelToken::new()).expect("call");
    assert_eq!(result, HostValue::Null);
}
