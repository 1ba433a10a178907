//! Plugin metadata.
//!
//! Plugins embed a JSON metadata document in a custom section named
//! `gantry:metadata`: the SDK language (which selects the ABI profile),
//! exported function signatures, named type definitions with field
//! offsets, and the managed-profile class-id table. This module owns the
//! document model and its extraction from a module binary, which needs
//! no instantiation.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use thiserror::Error;
use wasmparser::{Parser, Payload};

/// Name of the custom section carrying the metadata document.
pub const METADATA_SECTION: &str = "gantry:metadata";

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("module has no {METADATA_SECTION} section")]
    NotFound,

    #[error("invalid module binary: {0}")]
    InvalidModule(String),

    #[error("malformed metadata document: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// The SDK language a plugin was built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdkLanguage {
    /// UTF-16 managed-heap guests.
    AssemblyScript,
    /// UTF-8 value-type guests.
    TinyGo,
}

/// The metadata document embedded in a plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginMetadata {
    pub plugin: String,
    pub language: SdkLanguage,
    #[serde(default)]
    pub sdk_version: Option<String>,
    #[serde(default)]
    pub functions: Vec<FunctionSignature>,
    #[serde(default)]
    pub types: Vec<TypeDef>,
    /// Managed-profile class ids keyed by type descriptor. Authoritative:
    /// the guest compiler assigns them at build time.
    #[serde(default)]
    pub class_ids: HashMap<String, u32>,
}

impl PluginMetadata {
    pub fn find_function(&self, name: &str) -> Option<&FunctionSignature> {
        self.functions.iter().find(|f| f.name == name)
    }
}

/// Signature of one exported function.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionSignature {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default)]
    pub return_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type")]
    pub descriptor: String,
}

/// A named type declared by the plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TypeDef {
    Record {
        name: String,
        /// Total payload size in bytes, as laid out by the guest compiler.
        size: u32,
        fields: Vec<FieldDef>,
    },
    Variant {
        name: String,
        cases: Vec<CaseDef>,
    },
}

impl TypeDef {
    pub fn name(&self) -> &str {
        match self {
            TypeDef::Record { name, .. } => name,
            TypeDef::Variant { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub descriptor: String,
    pub offset: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseDef {
    pub name: String,
    #[serde(default)]
    pub payload: Option<String>,
}

/// Decode a metadata document from raw section bytes.
pub fn decode_metadata(bytes: &[u8]) -> Result<PluginMetadata, MetadataError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Encode a metadata document to section bytes.
pub fn encode_metadata(metadata: &PluginMetadata) -> Result<Vec<u8>, MetadataError> {
    Ok(serde_json::to_vec(metadata)?)
}

/// Extract the metadata document from a module binary.
pub fn extract_metadata(wasm: &[u8]) -> Result<PluginMetadata, MetadataError> {
    for payload in Parser::new(0).parse_all(wasm) {
        let payload = payload.map_err(|e| MetadataError::InvalidModule(e.to_string()))?;
        if let Payload::CustomSection(reader) = payload {
            if reader.name() == METADATA_SECTION {
                return decode_metadata(reader.data());
            }
        }
    }
    Err(MetadataError::NotFound)
}

/// Build id of a plugin: the first 16 hex digits of the SHA-256 of the
/// module bytes.
pub fn build_id(wasm: &[u8]) -> String {
    let digest = Sha256::digest(wasm);
    digest.iter().take(8).map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_roundtrip() {
        let doc = serde_json::json!({
            "plugin": "greeter",
            "language": "assemblyscript",
            "functions": [
                {
                    "name": "greet",
                    "parameters": [{"name": "name", "type": "string"}],
                    "return_type": "string"
                }
            ],
            "types": [
                {
                    "kind": "record",
                    "name": "Person",
                    "size": 8,
                    "fields": [
                        {"name": "name", "type": "string", "offset": 0},
                        {"name": "age", "type": "i32", "offset": 4}
                    ]
                }
            ],
            "class_ids": {"Person": 17}
        });
        let bytes = serde_json::to_vec(&doc).expect("serialize");
        let metadata = decode_metadata(&bytes).expect("decode");

        assert_eq!(metadata.plugin, "greeter");
        assert_eq!(metadata.language, SdkLanguage::AssemblyScript);
        assert_eq!(metadata.functions.len(), 1);
        assert_eq!(metadata.types[0].name(), "Person");
        assert_eq!(metadata.class_ids["Person"], 17);

        let f = metadata.find_function("greet").expect("function");
        assert_eq!(f.parameters[0].descriptor, "string");
    }

    #[test]
    fn build_id_is_stable() {
        let a = build_id(b"module bytes");
        let b = build_id(b"module bytes");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert_ne!(a, build_id(b"other bytes"));
    }
}
