//! Managed-profile type registry.
//!
//! Maps textual type descriptors to structural shape, layout, and
//! nullability. The descriptor grammar follows the managed SDK surface:
//! `string`, `Array<T>`, `Map<K,V>`, `Set<T>`, `T | null`, plus named
//! records and variants declared in plugin metadata. Class ids for
//! managed objects come from the metadata table; the buffer and string
//! ids are reserved.

use super::{BUFFER_CLASS_ID, STRING_CLASS_ID};
use crate::error::{MarshalError, Result};
use crate::metadata::{PluginMetadata, TypeDef};
use crate::profile::{CaseShape, FieldShape, Layout, Primitive, TypeShape};
use std::collections::HashMap;

pub struct ManagedTypes {
    records: HashMap<String, (u32, Vec<FieldShape>)>,
    variants: HashMap<String, Vec<CaseShape>>,
    class_ids: HashMap<String, u32>,
}

impl ManagedTypes {
    pub fn from_metadata(metadata: &PluginMetadata) -> Self {
        let mut records = HashMap::new();
        let mut variants = HashMap::new();
        for def in &metadata.types {
            match def {
                TypeDef::Record { name, size, fields } => {
                    let fields = fields
                        .iter()
                        .map(|f| FieldShape {
                            name: f.name.clone(),
                            descriptor: f.descriptor.clone(),
                            offset: f.offset,
                        })
                        .collect();
                    records.insert(name.clone(), (*size, fields));
                }
                TypeDef::Variant { name, cases } => {
                    let cases = cases
                        .iter()
                        .map(|c| CaseShape {
                            name: c.name.clone(),
                            payload: c.payload.clone(),
                        })
                        .collect();
                    variants.insert(name.clone(), cases);
                }
            }
        }
        Self {
            records,
            variants,
            class_ids: metadata.class_ids.clone(),
        }
    }

    /// Whether the descriptor admits the null value (`T | null`).
    pub fn is_nullable(&self, descriptor: &str) -> bool {
        strip_null(descriptor).is_some()
    }

    /// The descriptor with any `| null` suffix removed.
    pub fn core_descriptor<'d>(&self, descriptor: &'d str) -> &'d str {
        strip_null(descriptor).unwrap_or(descriptor.trim())
    }

    /// Structural shape of the descriptor's core (nullability stripped).
    pub fn shape(&self, descriptor: &str) -> Result<TypeShape> {
        let core = self.core_descriptor(descriptor);
        if let Some(prim) = primitive(core) {
            return Ok(TypeShape::Primitive(prim));
        }
        if core == "string" {
            return Ok(TypeShape::String);
        }
        if core == "ArrayBuffer" || core == "Uint8Array" {
            return Ok(TypeShape::Bytes);
        }
        if core == "Date" {
            return Ok(TypeShape::Timestamp);
        }
        if core.contains("=>") {
            return Ok(TypeShape::Function);
        }
        if core.starts_with('[') || generic_args(core, "StaticArray").is_some() {
            return Err(MarshalError::UnsupportedType {
                descriptor: descriptor.to_string(),
                reason: "managed guests have no fixed-length array type".to_string(),
            });
        }
        if let Some(args) = generic_args(core, "Array") {
            if let [elem] = args.as_slice() {
                return Ok(TypeShape::Sequence {
                    elem: elem.to_string(),
                });
            }
        }
        if let Some(args) = generic_args(core, "Map") {
            if let [key, value] = args.as_slice() {
                return Ok(TypeShape::Map {
                    key: key.to_string(),
                    value: value.to_string(),
                });
            }
        }
        if let Some(args) = generic_args(core, "Set") {
            if let [elem] = args.as_slice() {
                return Ok(TypeShape::Set {
                    elem: elem.to_string(),
                });
            }
        }
        if let Some((_, fields)) = self.records.get(core) {
            return Ok(TypeShape::Record {
                name: core.to_string(),
                fields: fields.clone(),
            });
        }
        if let Some(cases) = self.variants.get(core) {
            return Ok(TypeShape::Variant {
                name: core.to_string(),
                cases: cases.clone(),
            });
        }
        Err(MarshalError::UnknownType(descriptor.to_string()))
    }

    /// Layout of a descriptor, computable without planning handlers.
    ///
    /// Everything except a bare primitive is a managed reference and
    /// occupies one pointer.
    pub fn layout(&self, descriptor: &str) -> Result<Layout> {
        let nullable = self.is_nullable(descriptor);
        match self.shape(descriptor)? {
            TypeShape::Primitive(prim) => {
                if nullable {
                    return Err(MarshalError::UnsupportedType {
                        descriptor: descriptor.to_string(),
                        reason: "managed primitives cannot be nullable".to_string(),
                    });
                }
                Ok(Layout::new(prim.size(), prim.alignment(), 1))
            }
            TypeShape::Function => Err(MarshalError::UnsupportedType {
                descriptor: descriptor.to_string(),
                reason: "function types have no handler".to_string(),
            }),
            _ => Ok(Layout::POINTER),
        }
    }

    /// Declared payload size of a record.
    pub fn record_size(&self, name: &str) -> Result<u32> {
        self.records
            .get(name)
            .map(|(size, _)| *size)
            .ok_or_else(|| MarshalError::UnknownType(name.to_string()))
    }

    /// Class id for a managed type descriptor.
    pub fn class_id(&self, descriptor: &str) -> Result<u32> {
        let core = self.core_descriptor(descriptor);
        match core {
            "string" => Ok(STRING_CLASS_ID),
            "ArrayBuffer" => Ok(BUFFER_CLASS_ID),
            _ => self.class_ids.get(core).copied().ok_or_else(|| {
                MarshalError::UnsupportedType {
                    descriptor: descriptor.to_string(),
                    reason: "no class id in plugin metadata".to_string(),
                }
            }),
        }
    }
}

fn strip_null(descriptor: &str) -> Option<&str> {
    let trimmed = descriptor.trim();
    let rest = trimmed.strip_suffix("null")?;
    let rest = rest.trim_end().strip_suffix('|')?;
    Some(rest.trim_end())
}

fn primitive(descriptor: &str) -> Option<Primitive> {
    Some(match descriptor {
        "bool" => Primitive::Bool,
        "i8" => Primitive::I8,
        "i16" => Primitive::I16,
        "i32" | "isize" => Primitive::I32,
        "i64" => Primitive::I64,
        "u8" => Primitive::U8,
        "u16" => Primitive::U16,
        "u32" | "usize" => Primitive::U32,
        "u64" => Primitive::U64,
        "f32" => Primitive::F32,
        "f64" => Primitive::F64,
        _ => return None,
    })
}

/// Split `Base<a, b, ...>` into its top-level type arguments.
fn generic_args<'d>(descriptor: &'d str, base: &str) -> Option<Vec<&'d str>> {
    let rest = descriptor.strip_prefix(base)?;
    let inner = rest.strip_prefix('<')?.strip_suffix('>')?;

    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in inner.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                args.push(inner[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    args.push(inner[start..].trim());
    Some(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::SdkLanguage;

    fn empty_types() -> ManagedTypes {
        ManagedTypes::from_metadata(&PluginMetadata {
            plugin: "test".to_string(),
            language: SdkLanguage::AssemblyScript,
            sdk_version: None,
            functions: vec![],
            types: vec![],
            class_ids: HashMap::new(),
        })
    }

    #[test]
    fn nullability_parsing() {
        let types = empty_types();
        assert!(types.is_nullable("string | null"));
        assert!(types.is_nullable("Array<i32>|null"));
        assert!(!types.is_nullable("string"));
        assert_eq!(types.core_descriptor("string | null"), "string");
        assert_eq!(types.core_descriptor("Map<string, i64> | null"), "Map<string, i64>");
    }

    #[test]
    fn generic_shapes() {
        let types = empty_types();
        assert_eq!(
            types.shape("Array<Array<i32>>").unwrap(),
            TypeShape::Sequence {
                elem: "Array<i32>".to_string()
            }
        );
        assert_eq!(
            types.shape("Map<string, Array<i32>>").unwrap(),
            TypeShape::Map {
                key: "string".to_string(),
                value: "Array<i32>".to_string()
            }
        );
        assert!(matches!(
            types.shape("Widget").unwrap_err(),
            MarshalError::UnknownType(_)
        ));
    }

    #[test]
    fn layouts() {
        let types = empty_types();
        assert_eq!(types.layout("i64").unwrap(), Layout::new(8, 8, 1));
        assert_eq!(types.layout("string").unwrap(), Layout::POINTER);
        assert_eq!(types.layout("Array<f64> | null").unwrap(), Layout::POINTER);
        assert!(matches!(
            types.layout("i32 | null").unwrap_err(),
            MarshalError::UnsupportedType { .. }
        ));
    }

    #[test]
    fn function_descriptors_are_recognised() {
        let types = empty_types();
        assert_eq!(types.shape("(x: i32) => i32").unwrap(), TypeShape::Function);
    }

    #[test]
    fn fixed_array_syntax_is_rejected_with_a_clear_reason() {
        let types = empty_types();
        for descriptor in ["[4]f64", "StaticArray<f64>"] {
            match types.shape(descriptor).unwrap_err() {
                MarshalError::UnsupportedType { reason, .. } => {
                    assert!(reason.contains("fixed-length array"));
                }
                other => panic!("expected UnsupportedType, got {other}"),
            }
        }
    }
}
