//! Guest language ABI profiles.
//!
//! Two profiles are supported. The `managed` profile targets guests with
//! a UTF-16 managed heap: every object carries a 16-byte header with a
//! class id and byte length, and host-side allocations must be pinned
//! against the guest collector. The `native` profile targets guests with
//! UTF-8 value types: strings and slices are pointer/length structs,
//! there are no object headers, and pinning is a no-op.
//!
//! Each profile owns its descriptor grammar, type registry, and handler
//! planner; the primitive handlers are shared.

pub mod array;
pub mod managed;
pub mod native;
pub mod primitives;

use crate::error::Result;
use crate::handler::{align_up, HandlerInfo, TypeHandler};
use std::sync::Arc;

/// One planned record field.
#[derive(Debug)]
pub struct FieldPlan {
    pub name: String,
    pub offset: u32,
    pub handler: Arc<dyn TypeHandler>,
}

/// Look up a host-side field by name in a record or string-keyed map.
pub(crate) fn host_field<'v>(
    value: &'v crate::value::HostValue,
    name: &str,
) -> Option<&'v crate::value::HostValue> {
    use crate::value::HostValue;
    match value {
        HostValue::Record(fields) => fields.iter().find(|(n, _)| n == name).map(|(_, v)| v),
        HostValue::Map(entries) => entries
            .iter()
            .find(|(k, _)| matches!(k, HostValue::Text(t) if t == name))
            .map(|(_, v)| v),
        _ => None,
    }
}

/// Warn about host-side fields with no declared counterpart.
pub(crate) fn warn_excess_fields(
    value: &crate::value::HostValue,
    declared: &[FieldPlan],
    descriptor: &str,
) {
    use crate::value::HostValue;
    let names: Vec<&str> = match value {
        HostValue::Record(fields) => fields.iter().map(|(n, _)| n.as_str()).collect(),
        HostValue::Map(entries) => entries
            .iter()
            .filter_map(|(k, _)| match k {
                HostValue::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect(),
        _ => return,
    };
    for name in names {
        if !declared.iter().any(|f| f.name == name) {
            tracing::warn!(field = name, descriptor, "ignoring undeclared field");
        }
    }
}

/// One planned variant alternative.
#[derive(Debug)]
pub struct CasePlan {
    pub name: String,
    pub handler: Option<Arc<dyn TypeHandler>>,
}

/// Union geometry of a tagged variant: a 32-bit discriminator followed
/// by a payload region sized and aligned for the widest alternative.
#[derive(Debug)]
pub(crate) struct VariantLayout {
    pub payload_offset: u32,
    pub size: u32,
    pub payload_slots: u32,
}

pub(crate) fn variant_layout(cases: &[CasePlan]) -> VariantLayout {
    let mut payload_align = 4u32;
    let mut payload_size = 0u32;
    let mut payload_slots = 0u32;
    for case in cases {
        if let Some(handler) = &case.handler {
            let info = handler.info();
            payload_align = payload_align.max(info.alignment);
            payload_size = payload_size.max(info.size);
            payload_slots = payload_slots.max(info.slot_count);
        }
    }
    let payload_offset = align_up(4, payload_align);
    VariantLayout {
        payload_offset,
        size: align_up(payload_offset + payload_size, payload_align),
        payload_slots,
    }
}

pub(crate) fn case_index(cases: &[CasePlan], name: &str) -> Option<usize> {
    cases.iter().position(|c| c.name == name)
}

/// Packed layout of one map or set entry: the key at offset 0, the
/// value (if any) behind it at its own alignment.
pub(crate) struct EntryLayout {
    pub value_offset: u32,
    pub size: u32,
}

pub(crate) fn entry_layout(key: &HandlerInfo, value: Option<&HandlerInfo>) -> EntryLayout {
    match value {
        Some(value) => {
            let value_offset = align_up(key.size, value.alignment);
            let alignment = key.alignment.max(value.alignment);
            EntryLayout {
                value_offset,
                size: align_up(value_offset + value.size, alignment),
            }
        }
        None => EntryLayout {
            value_offset: 0,
            size: align_up(key.size, key.alignment),
        },
    }
}

/// Fixed-width primitive kinds common to both profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
}

impl Primitive {
    pub fn size(self) -> u32 {
        match self {
            Primitive::Bool | Primitive::I8 | Primitive::U8 => 1,
            Primitive::I16 | Primitive::U16 => 2,
            Primitive::I32 | Primitive::U32 | Primitive::F32 => 4,
            Primitive::I64 | Primitive::U64 | Primitive::F64 => 8,
        }
    }

    pub fn alignment(self) -> u32 {
        self.size()
    }
}

/// Structural classification of a type descriptor, as reported by a
/// profile's type registry. Nullability is reported separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeShape {
    Primitive(Primitive),
    String,
    Bytes,
    Timestamp,
    /// Inline array of `len` elements.
    FixedArray { elem: String, len: u32 },
    /// Dynamically sized sequence.
    Sequence { elem: String },
    Map { key: String, value: String },
    Set { elem: String },
    Record { name: String, fields: Vec<FieldShape> },
    Variant { name: String, cases: Vec<CaseShape> },
    /// Function types are recognised but have no handler family.
    Function,
}

/// One record field with its precomputed offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldShape {
    pub name: String,
    pub descriptor: String,
    pub offset: u32,
}

/// One variant alternative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseShape {
    pub name: String,
    pub payload: Option<String>,
}

/// Size, alignment, and register footprint of a descriptor, computable
/// by the type registry without building handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub size: u32,
    pub alignment: u32,
    pub slot_count: u32,
}

impl Layout {
    pub const fn new(size: u32, alignment: u32, slot_count: u32) -> Self {
        Self {
            size,
            alignment,
            slot_count,
        }
    }

    /// Layout of a 32-bit guest pointer.
    pub const POINTER: Layout = Layout::new(4, 4, 1);
}

/// A planner for one of the two profiles.
pub enum Planner {
    Managed(managed::ManagedPlanner),
    Native(native::NativePlanner),
}

impl Planner {
    pub fn plan(&self, descriptor: &str) -> Result<Arc<dyn TypeHandler>> {
        match self {
            Planner::Managed(p) => p.plan(descriptor),
            Planner::Native(p) => p.plan(descriptor),
        }
    }
}
