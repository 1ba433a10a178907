//! Native-profile handler planner.

use super::map::{NativeMapHandler, NativeSetHandler};
use super::nullable::{NullableBoxHandler, NullableEnvelopeHandler};
use super::record::NativeStructHandler;
use super::slice::{NativeBytesHandler, NativeSliceHandler};
use super::strings::NativeStringHandler;
use super::time::NativeTimeHandler;
use super::variant::NativeVariantHandler;
use super::NativeTypes;
use crate::error::{MarshalError, Result};
use crate::handler::{HandlerInfo, TypeHandler};
use crate::plan::PlanCache;
use crate::profile::array::InlineArrayHandler;
use crate::profile::primitives::PrimitiveHandler;
use crate::profile::{CasePlan, FieldPlan, TypeShape};
use std::sync::Arc;

pub struct NativePlanner {
    types: Arc<NativeTypes>,
    cache: PlanCache,
}

impl NativePlanner {
    pub fn new(types: NativeTypes) -> Self {
        Self {
            types: Arc::new(types),
            cache: PlanCache::new(),
        }
    }

    pub fn types(&self) -> &NativeTypes {
        &self.types
    }

    /// Plan the handler for a type descriptor, memoised per descriptor.
    pub fn plan(&self, descriptor: &str) -> Result<Arc<dyn TypeHandler>> {
        self.cache.plan_with(
            descriptor,
            || self.handler_info(descriptor),
            || self.build(descriptor),
        )
    }

    fn handler_info(&self, descriptor: &str) -> Result<HandlerInfo> {
        let layout = self.types.layout(descriptor)?;
        Ok(
            HandlerInfo::new(descriptor, layout.size, layout.alignment, layout.slot_count)
                .nullable(self.types.is_nullable(descriptor)),
        )
    }

    fn build(&self, descriptor: &str) -> Result<Arc<dyn TypeHandler>> {
        if self.types.is_nullable(descriptor) {
            let inner_descriptor = self.types.core_descriptor(descriptor).to_string();
            let inner = self.plan(&inner_descriptor)?;
            return match self.types.shape(&inner_descriptor)? {
                TypeShape::Primitive(_) => {
                    Ok(Arc::new(NullableEnvelopeHandler::new(descriptor, inner)))
                }
                _ => Ok(Arc::new(NullableBoxHandler::new(descriptor, inner))),
            };
        }

        match self.types.shape(descriptor)? {
            TypeShape::Primitive(prim) => Ok(Arc::new(PrimitiveHandler::new(descriptor, prim))),
            TypeShape::String => Ok(Arc::new(NativeStringHandler::new(descriptor))),
            TypeShape::Bytes => Ok(Arc::new(NativeBytesHandler::new(descriptor))),
            TypeShape::Timestamp => Ok(Arc::new(NativeTimeHandler::new(descriptor))),
            TypeShape::FixedArray { elem, len } => {
                let elem = self.plan(&elem)?;
                Ok(Arc::new(InlineArrayHandler::new(descriptor, elem, len)))
            }
            TypeShape::Sequence { elem } => {
                let elem = self.plan(&elem)?;
                Ok(Arc::new(NativeSliceHandler::new(descriptor, elem)))
            }
            TypeShape::Map { key, value } => {
                let key = self.plan(&key)?;
                let value = self.plan(&value)?;
                Ok(Arc::new(NativeMapHandler::new(descriptor, key, value)))
            }
            TypeShape::Set { elem } => {
                let elem = self.plan(&elem)?;
                Ok(Arc::new(NativeSetHandler::new(descriptor, elem)))
            }
            TypeShape::Record { name, fields } => {
                let layout = self.types.layout(&name)?;
                let mut plans = Vec::with_capacity(fields.len());
                for field in fields {
                    plans.push(FieldPlan {
                        handler: self.plan(&field.descriptor)?,
                        name: field.name,
                        offset: field.offset,
                    });
                }
                Ok(Arc::new(NativeStructHandler::new(
                    descriptor,
                    layout.size,
                    layout.alignment,
                    plans,
                )))
            }
            TypeShape::Variant { cases, .. } => {
                let layout = self.types.layout(descriptor)?;
                let mut plans = Vec::with_capacity(cases.len());
                for case in cases {
                    let handler = match &case.payload {
                        Some(payload) => Some(self.plan(payload)?),
                        None => None,
                    };
                    plans.push(CasePlan {
                        name: case.name,
                        handler,
                    });
                }
                Ok(Arc::new(NativeVariantHandler::new(
                    descriptor,
                    layout.alignment,
                    plans,
                )))
            }
            TypeShape::Function => Err(MarshalError::UnsupportedType {
                descriptor: descriptor.to_string(),
                reason: "function types have no handler".to_string(),
            }),
        }
    }
}
