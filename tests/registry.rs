//! Metadata extraction and registry rebuild semantics.

use gantry::{
    build_id, extract_metadata, ActivatedPlugin, MetadataError, PluginMetadata, SharedRegistry,
};
use wasm_encoder::{CustomSection, Module};

fn fixture_metadata(plugin: &str, functions: serde_json::Value) -> PluginMetadata {
    serde_json::from_value(serde_json::json!({
        "plugin": plugin,
        "language": "tinygo",
        "functions": functions,
    }))
    .expect("fixture metadata")
}

fn module_with_metadata(metadata: &PluginMetadata) -> Vec<u8> {
    let bytes = gantry::encode_metadata(metadata).expect("encode metadata");
    let mut module = Module::new();
    module.section(&CustomSection {
        name: "gantry:metadata".into(),
        data: bytes.as_slice().into(),
    });
    module.finish()
}

#[test]
fn metadata_extracts_from_custom_section() {
    let metadata = fixture_metadata(
        "echo",
        serde_json::json!([
            {
                "name": "echo",
                "parameters": [{"name": "message", "type": "string"}],
                "return_type": "string"
            }
        ]),
    );
    let wasm = module_with_metadata(&metadata);

    let extracted = extract_metadata(&wasm).expect("extract");
    assert_eq!(extracted.plugin, "echo");
    assert_eq!(extracted.functions.len(), 1);
    assert_eq!(build_id(&wasm).len(), 16);
}

#[test]
fn missing_section_is_reported() {
    let wasm = Module::new().finish();
    assert!(matches!(
        extract_metadata(&wasm).expect_err("no section"),
        MetadataError::NotFound
    ));
}

#[test]
fn rebuild_replaces_the_registered_set_atomically() {
    let registry = SharedRegistry::new();

    let first = ActivatedPlugin::new(
        fixture_metadata(
            "math",
            serde_json::json!([
                {
                    "name": "add",
                    "parameters": [
                        {"name": "a", "type": "int32"},
                        {"name": "b", "type": "int32"}
                    ],
                    "return_type": "int32"
                },
                {
                    "name": "sum",
                    "parameters": [{"name": "values", "type": "[]int32"}],
                    "return_type": "int64"
                }
            ]),
        ),
        "aaaa000011112222".to_string(),
    );
    registry.rebuild(&[first]).expect("rebuild");

    let snapshot = registry.snapshot();
    assert_eq!(snapshot.len(), 2);
    let add = snapshot.get("add").expect("add registered");
    assert_eq!(add.plugin, "math");
    assert_eq!(add.plan.params.len(), 2);

    // A call in flight keeps its snapshot across a rebuild.
    let replacement = ActivatedPlugin::new(
        fixture_metadata(
            "strings",
            serde_json::json!([
                {
                    "name": "upper",
                    "parameters": [{"name": "s", "type": "string"}],
                    "return_type": "string"
                }
            ]),
        ),
        "bbbb000011112222".to_string(),
    );
    registry.rebuild(&[replacement]).expect("rebuild again");

    assert!(snapshot.get("add").is_some());
    let current = registry.snapshot();
    assert!(current.get("add").is_none());
    assert!(current.get("upper").is_some());
    assert_eq!(current.len(), 1);
}

#[test]
fn functions_that_fail_to_plan_are_skipped() {
    let registry = SharedRegistry::new();
    let plugin = ActivatedPlugin::new(
        fixture_metadata(
            "mixed",
            serde_json::json!([
                {
                    "name": "good",
                    "parameters": [{"name": "s", "type": "string"}]
                },
                {
                    "name": "bad",
                    "parameters": [{"name": "w", "type": "Widget"}]
                }
            ]),
        ),
        "cccc000011112222".to_string(),
    );
    registry.rebuild(&[plugin]).expect("rebuild");

    let snapshot = registry.snapshot();
    assert!(snapshot.get("good").is_some());
    assert!(snapshot.get("bad").is_none());
}
