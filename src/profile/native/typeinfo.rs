//! Native-profile type registry.
//!
//! The descriptor grammar follows the native SDK surface: `string`,
//! `[]T`, `[N]T`, `map[K]V`, `set[T]`, `*T`, `time.Time`, plus named
//! structs and variants declared in plugin metadata. Layout is fully
//! computable from the registry: value types nest inline, and
//! nullability is expressed structurally (`*T` becomes a presence
//! envelope for primitives and a boxed pointer otherwise).

use crate::error::{MarshalError, Result};
use crate::handler::align_up;
use crate::metadata::{PluginMetadata, TypeDef};
use crate::profile::{CaseShape, FieldShape, Layout, Primitive, TypeShape};
use std::collections::HashMap;

/// Guard against malformed metadata declaring value types that nest
/// into themselves. Well-formed recursion always goes through `*T`.
const MAX_LAYOUT_DEPTH: u32 = 64;

pub struct NativeTypes {
    records: HashMap<String, (u32, Vec<FieldShape>)>,
    variants: HashMap<String, Vec<CaseShape>>,
}

impl NativeTypes {
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
        Self { records, variants }
    }

    /// Whether the descriptor is a pointer type (`*T`).
    pub fn is_nullable(&self, descriptor: &str) -> bool {
        descriptor.trim().starts_with('*')
    }

    /// The pointee of a `*T` descriptor, or the descriptor itself.
    pub fn core_descriptor<'d>(&self, descriptor: &'d str) -> &'d str {
        let trimmed = descriptor.trim();
        trimmed.strip_prefix('*').map(str::trim).unwrap_or(trimmed)
    }

    /// Structural shape of the descriptor's core (pointer stripped).
    pub fn shape(&self, descriptor: &str) -> Result<TypeShape> {
        let core = self.core_descriptor(descriptor);
        if let Some(prim) = primitive(core) {
            return Ok(TypeShape::Primitive(prim));
        }
        if core == "string" {
            return Ok(TypeShape::String);
        }
        if core == "[]byte" || core == "[]u8" {
            return Ok(TypeShape::Bytes);
        }
        if core == "time.Time" {
            return Ok(TypeShape::Timestamp);
        }
        if core.starts_with("func(") || core.starts_with("func ") {
            return Ok(TypeShape::Function);
        }
        if let Some(elem) = core.strip_prefix("[]") {
            return Ok(TypeShape::Sequence {
                elem: elem.trim().to_string(),
            });
        }
        if let Some((len, elem)) = fixed_array(core) {
            return Ok(TypeShape::FixedArray {
                elem: elem.to_string(),
                len,
            });
        }
        if let Some((key, value)) = map_types(core) {
            return Ok(TypeShape::Map {
                key: key.to_string(),
                value: value.to_string(),
            });
        }
        if let Some(elem) = core.strip_prefix("set[").and_then(|s| s.strip_suffix(']')) {
            return Ok(TypeShape::Set {
                elem: elem.trim().to_string(),
            });
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
    pub fn layout(&self, descriptor: &str) -> Result<Layout> {
        self.layout_at(descriptor, 0)
    }

    fn layout_at(&self, descriptor: &str, depth: u32) -> Result<Layout> {
        if depth > MAX_LAYOUT_DEPTH {
            return Err(MarshalError::UnsupportedType {
                descriptor: descriptor.to_string(),
                reason: "value type nests into itself".to_string(),
            });
        }

        if self.is_nullable(descriptor) {
            let inner = self.core_descriptor(descriptor);
            return match self.shape(inner)? {
                TypeShape::Primitive(_) => {
                    // Presence envelope: `{present: u8, value}` at the
                    // payload's alignment.
                    let inner = self.layout_at(inner, depth + 1)?;
                    Ok(Layout::new(
                        inner.alignment + inner.size,
                        inner.alignment,
                        1 + inner.slot_count,
                    ))
                }
                _ => Ok(Layout::POINTER),
            };
        }

        match self.shape(descriptor)? {
            TypeShape::Primitive(prim) => Ok(Layout::new(prim.size(), prim.alignment(), 1)),
            TypeShape::String => Ok(Layout::new(8, 4, 2)),
            TypeShape::Bytes | TypeShape::Sequence { .. } => Ok(Layout::new(12, 4, 3)),
            TypeShape::Map { .. } | TypeShape::Set { .. } => Ok(Layout::new(8, 4, 2)),
            TypeShape::Timestamp => Ok(Layout::new(20, 8, 3)),
            TypeShape::FixedArray { elem, len } => {
                let elem = self.layout_at(&elem, depth + 1)?;
                let stride = align_up(elem.size, elem.alignment);
                Ok(Layout::new(
                    stride * len,
                    elem.alignment,
                    elem.slot_count * len,
                ))
            }
            TypeShape::Record { name, fields } => {
                let (size, _) = self.records.get(&name).expect("record shape from registry");
                let mut alignment = 1;
                let mut slots = 0;
                for field in &fields {
                    let field_layout = self.layout_at(&field.descriptor, depth + 1)?;
                    alignment = alignment.max(field_layout.alignment);
                    slots += field_layout.slot_count;
                }
                Ok(Layout::new(*size, alignment, slots))
            }
            TypeShape::Variant { cases, .. } => {
                let mut payload_align = 4;
                let mut payload_size = 0;
                let mut payload_slots = 0;
                for case in &cases {
                    if let Some(payload) = &case.payload {
                        let layout = self.layout_at(payload, depth + 1)?;
                        payload_align = payload_align.max(layout.alignment);
                        payload_size = payload_size.max(layout.size);
                        payload_slots = payload_slots.max(layout.slot_count);
                    }
                }
                let payload_offset = align_up(4, payload_align);
                Ok(Layout::new(
                    align_up(payload_offset + payload_size, payload_align),
                    payload_align,
                    1 + payload_slots,
                ))
            }
            TypeShape::Function => Err(MarshalError::UnsupportedType {
                descriptor: descriptor.to_string(),
                reason: "function types have no handler".to_string(),
            }),
        }
    }
}

fn primitive(descriptor: &str) -> Option<Primitive> {
    Some(match descriptor {
        "bool" => Primitive::Bool,
        "int8" => Primitive::I8,
        "int16" => Primitive::I16,
        "int32" | "int" | "rune" => Primitive::I32,
        "int64" => Primitive::I64,
        "uint8" | "byte" => Primitive::U8,
        "uint16" => Primitive::U16,
        "uint32" | "uint" | "uintptr" => Primitive::U32,
        "uint64" => Primitive::U64,
        "float32" => Primitive::F32,
        "float64" => Primitive::F64,
        _ => return None,
    })
}

/// Parse `[N]T` into `(N, T)`.
fn fixed_array(descriptor: &str) -> Option<(u32, &str)> {
    let rest = descriptor.strip_prefix('[')?;
    let close = rest.find(']')?;
    let len: u32 = rest[..close].trim().parse().ok()?;
    Some((len, rest[close + 1..].trim()))
}

/// Parse `map[K]V` into `(K, V)`, honouring nested brackets in the key.
fn map_types(descriptor: &str) -> Option<(&str, &str)> {
    let rest = descriptor.strip_prefix("map[")?;
    let mut depth = 1usize;
    for (i, c) in rest.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some((rest[..i].trim(), rest[i + 1..].trim()));
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::SdkLanguage;

    fn empty_types() -> NativeTypes {
        NativeTypes::from_metadata(&PluginMetadata {
            plugin: "test".to_string(),
            language: SdkLanguage::TinyGo,
            sdk_version: None,
            functions: vec![],
            types: vec![],
            class_ids: HashMap::new(),
        })
    }

    #[test]
    fn grammar_shapes() {
        let types = empty_types();
        assert_eq!(
            types.shape("[]int32").unwrap(),
            TypeShape::Sequence {
                elem: "int32".to_string()
            }
        );
        assert_eq!(
            types.shape("[4]float64").unwrap(),
            TypeShape::FixedArray {
                elem: "float64".to_string(),
                len: 4
            }
        );
        assert_eq!(
            types.shape("map[string][]int32").unwrap(),
            TypeShape::Map {
                key: "string".to_string(),
                value: "[]int32".to_string()
            }
        );
        assert_eq!(
            types.shape("set[string]").unwrap(),
            TypeShape::Set {
                elem: "string".to_string()
            }
        );
        assert_eq!(types.shape("*string").unwrap(), TypeShape::String);
        assert!(types.is_nullable("*string"));
    }

    #[test]
    fn layouts() {
        let types = empty_types();
        assert_eq!(types.layout("string").unwrap(), Layout::new(8, 4, 2));
        assert_eq!(types.layout("[]byte").unwrap(), Layout::new(12, 4, 3));
        assert_eq!(types.layout("time.Time").unwrap(), Layout::new(20, 8, 3));
        // Presence envelope: byte + padding + 4-byte payload.
        assert_eq!(types.layout("*int32").unwrap(), Layout::new(8, 4, 2));
        // Boxed non-primitive.
        assert_eq!(types.layout("*string").unwrap(), Layout::POINTER);
        // Inline array stride honours element alignment.
        assert_eq!(types.layout("[3]int16").unwrap(), Layout::new(6, 2, 3));
    }
}
