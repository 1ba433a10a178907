//! Managed-profile handler planner.

use super::bytes::{ManagedBufferHandler, ManagedByteViewHandler};
use super::list::ManagedSequenceHandler;
use super::map::{ManagedMapHandler, ManagedSetHandler};
use super::record::ManagedRecordHandler;
use super::strings::ManagedStringHandler;
use super::time::ManagedTimeHandler;
use super::variant::ManagedVariantHandler;
use super::{ManagedHandler, ManagedTypes};
use crate::error::{MarshalError, Result};
use crate::handler::{HandlerInfo, TypeHandler};
use crate::plan::PlanCache;
use crate::profile::primitives::PrimitiveHandler;
use crate::profile::{CasePlan, FieldPlan, TypeShape};
use std::sync::Arc;

pub struct ManagedPlanner {
    types: Arc<ManagedTypes>,
    cache: PlanCache,
}

impl ManagedPlanner {
    pub fn new(types: ManagedTypes) -> Self {
        Self {
            types: Arc::new(types),
            cache: PlanCache::new(),
        }
    }

    pub fn types(&self) -> &ManagedTypes {
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
        let nullable = self.types.is_nullable(descriptor);
        let core = self.types.core_descriptor(descriptor).to_string();

        match self.types.shape(descriptor)? {
            TypeShape::Primitive(prim) => {
                if nullable {
                    return Err(MarshalError::UnsupportedType {
                        descriptor: descriptor.to_string(),
                        reason: "managed primitives cannot be nullable".to_string(),
                    });
                }
                Ok(Arc::new(PrimitiveHandler::new(descriptor, prim)))
            }
            TypeShape::String => Ok(Arc::new(ManagedHandler(ManagedStringHandler::new(
                descriptor, nullable,
            )))),
            TypeShape::Bytes => {
                if core == "ArrayBuffer" {
                    Ok(Arc::new(ManagedHandler(ManagedBufferHandler::new(
                        descriptor, nullable,
                    ))))
                } else {
                    let class_id = self.types.class_id(&core)?;
                    Ok(Arc::new(ManagedHandler(ManagedByteViewHandler::new(
                        descriptor, nullable, class_id,
                    ))))
                }
            }
            TypeShape::Timestamp => {
                let class_id = self.types.class_id(&core)?;
                Ok(Arc::new(ManagedHandler(ManagedTimeHandler::new(
                    descriptor, nullable, class_id,
                ))))
            }
            // The managed grammar never yields this shape; shape()
            // rejects array-like descriptors up front.
            TypeShape::FixedArray { .. } => Err(MarshalError::UnsupportedType {
                descriptor: descriptor.to_string(),
                reason: "managed guests have no fixed-length array type".to_string(),
            }),
            TypeShape::Sequence { elem } => {
                let class_id = self.types.class_id(&core)?;
                let elem = self.plan(&elem)?;
                Ok(Arc::new(ManagedHandler(ManagedSequenceHandler::new(
                    descriptor, nullable, class_id, elem,
                ))))
            }
            TypeShape::Map { key, value } => {
                let class_id = self.types.class_id(&core)?;
                let key = self.plan(&key)?;
                let value = self.plan(&value)?;
                Ok(Arc::new(ManagedHandler(ManagedMapHandler::new(
                    descriptor, nullable, class_id, key, value,
                ))))
            }
            TypeShape::Set { elem } => {
                let class_id = self.types.class_id(&core)?;
                let elem = self.plan(&elem)?;
                Ok(Arc::new(ManagedHandler(ManagedSetHandler::new(
                    descriptor, nullable, class_id, elem,
                ))))
            }
            TypeShape::Record { name, fields } => {
                let class_id = self.types.class_id(&name)?;
                let payload_size = self.types.record_size(&name)?;
                let mut plans = Vec::with_capacity(fields.len());
                for field in fields {
                    plans.push(FieldPlan {
                        handler: self.plan(&field.descriptor)?,
                        name: field.name,
                        offset: field.offset,
                    });
                }
                Ok(Arc::new(ManagedHandler(ManagedRecordHandler::new(
                    descriptor,
                    nullable,
                    class_id,
                    payload_size,
                    plans,
                ))))
            }
            TypeShape::Variant { name, cases } => {
                let class_id = self.types.class_id(&name)?;
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
                Ok(Arc::new(ManagedHandler(ManagedVariantHandler::new(
                    descriptor, nullable, class_id, plans,
                ))))
            }
            TypeShape::Function => Err(MarshalError::UnsupportedType {
                descriptor: descriptor.to_string(),
                reason: "function types have no handler".to_string(),
            }),
        }
    }
}
