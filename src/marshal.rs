//! The call marshaller.
//!
//! For a planned function signature, packs host arguments into ABI
//! register slots, invokes the guest export, and decodes the return
//! slots. The cleanup chain accumulated during encoding is released on
//! every exit path, success or failure: it is the guest collector's
//! safety boundary.

use crate::cleanup::Cleanup;
use crate::error::{MarshalError, Result};
use crate::handler::TypeHandler;
use crate::instance::GuestInstance;
use crate::metadata::FunctionSignature;
use crate::profile::Planner;
use crate::value::HostValue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One planned parameter.
pub struct ParamPlan {
    pub name: String,
    pub handler: Arc<dyn TypeHandler>,
}

/// A function signature with its handlers planned.
pub struct FunctionPlan {
    pub name: String,
    pub params: Vec<ParamPlan>,
    pub result: Option<Arc<dyn TypeHandler>>,
}

impl FunctionPlan {
    /// Plan all handlers for a declared signature.
    pub fn from_signature(signature: &FunctionSignature, planner: &Planner) -> Result<Self> {
        let mut params = Vec::with_capacity(signature.parameters.len());
        for param in &signature.parameters {
            params.push(ParamPlan {
                name: param.name.clone(),
                handler: planner.plan(&param.descriptor)?,
            });
        }
        let result = match &signature.return_type {
            Some(descriptor) => Some(planner.plan(descriptor)?),
            None => None,
        };
        Ok(Self {
            name: signature.name.clone(),
            params,
            result,
        })
    }

    fn argument_slot_count(&self) -> usize {
        self.params
            .iter()
            .map(|p| p.handler.info().slot_count as usize)
            .sum()
    }
}

/// Cancellation signal shared between the host and an in-flight call.
///
/// A cancelled call aborts before its next guest operation; pins already
/// issued are released before the cancellation propagates.
#[derive(Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Invoke a planned function on a guest instance.
///
/// The caller must hold the instance exclusively for the duration of the
/// call.
pub fn invoke_function(
    guest: &mut dyn GuestInstance,
    plan: &FunctionPlan,
    args: &[HostValue],
    cancel: &CancelToken,
) -> Result<HostValue> {
    if args.len() != plan.params.len() {
        return Err(MarshalError::ArityMismatch {
            function: plan.name.clone(),
            expected: plan.params.len(),
            got: args.len(),
        });
    }

    let mut cleanup = Cleanup::new();
    let mut slots = Vec::with_capacity(plan.argument_slot_count());

    for (index, (param, arg)) in plan.params.iter().zip(args).enumerate() {
        if cancel.is_cancelled() {
            cleanup.release(guest);
            return Err(MarshalError::Cancelled);
        }
        if let Err(err) = param.handler.encode(guest, arg, &mut slots, &mut cleanup) {
            cleanup.release(guest);
            return Err(err.in_argument(index, &param.name));
        }
    }

    if cancel.is_cancelled() {
        cleanup.release(guest);
        return Err(MarshalError::Cancelled);
    }

    let return_slots = match guest.invoke(&plan.name, &slots) {
        Ok(return_slots) => return_slots,
        Err(err) => {
            cleanup.release(guest);
            return Err(err);
        }
    };

    let result = match &plan.result {
        Some(handler) => handler.decode(guest, &return_slots),
        None => Ok(HostValue::Null),
    };
    // Released whether decoding succeeded or not.
    cleanup.release(guest);
    result
}
