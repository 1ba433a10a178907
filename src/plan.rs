//! Handler plan cache.
//!
//! Planning is recursive: composite handlers hold their element and
//! field handlers. The cache memoises by type descriptor so that a
//! descriptor is planned once per plugin activation, and installs
//! forward references so that recursive type graphs terminate: when a
//! descriptor already in progress is requested again, the requester
//! receives a handler whose target cell is resolved once the outer
//! construction completes.

use crate::cleanup::Cleanup;
use crate::error::{MarshalError, Result};
use crate::handler::{HandlerInfo, TypeHandler};
use crate::instance::GuestInstance;
use crate::value::HostValue;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

type HandlerCell = Arc<OnceLock<Arc<dyn TypeHandler>>>;

#[derive(Default)]
struct PlanState {
    ready: HashMap<String, Arc<dyn TypeHandler>>,
    pending: HashMap<String, HandlerCell>,
}

/// Memoising handler cache, one per planner.
///
/// The mutex is held only while consulting or updating the maps, never
/// while a handler is being built; recursive planning re-enters through
/// `plan_with` and finds its own descriptor in the pending set.
#[derive(Default)]
pub struct PlanCache {
    state: Mutex<PlanState>,
}

impl PlanCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up or build the handler for `descriptor`.
    ///
    /// `forward_info` supplies the layout for a forward reference; it is
    /// only invoked when `descriptor` is currently mid-construction.
    pub fn plan_with(
        &self,
        descriptor: &str,
        forward_info: impl FnOnce() -> Result<HandlerInfo>,
        build: impl FnOnce() -> Result<Arc<dyn TypeHandler>>,
    ) -> Result<Arc<dyn TypeHandler>> {
        let cell: HandlerCell = {
            let mut state = self.state.lock().expect("plan cache poisoned");
            if let Some(handler) = state.ready.get(descriptor) {
                return Ok(Arc::clone(handler));
            }
            if let Some(cell) = state.pending.get(descriptor) {
                // Recursive reference to a descriptor mid-construction.
                let handler = ForwardHandler {
                    info: forward_info()?,
                    target: Arc::clone(cell),
                };
                return Ok(Arc::new(handler));
            }
            let cell: HandlerCell = Arc::new(OnceLock::new());
            state
                .pending
                .insert(descriptor.to_string(), Arc::clone(&cell));
            cell
        };

        match build() {
            Ok(handler) => {
                let mut state = self.state.lock().expect("plan cache poisoned");
                state.pending.remove(descriptor);
                state
                    .ready
                    .insert(descriptor.to_string(), Arc::clone(&handler));
                let _ = cell.set(Arc::clone(&handler));
                Ok(handler)
            }
            Err(err) => {
                let mut state = self.state.lock().expect("plan cache poisoned");
                state.pending.remove(descriptor);
                Err(err)
            }
        }
    }
}

/// A handler standing in for one still under construction.
///
/// Child links resolve through the shared cell once the outer handler
/// completes; layout comes from the type registry, which can compute it
/// without recursing (recursion is only reachable through pointer
/// shapes).
#[derive(Debug)]
struct ForwardHandler {
    info: HandlerInfo,
    target: HandlerCell,
}

impl ForwardHandler {
    fn resolved(&self) -> Result<&Arc<dyn TypeHandler>> {
        self.target
            .get()
            .ok_or_else(|| MarshalError::UnsupportedType {
                descriptor: self.info.descriptor.clone(),
                reason: "unresolved forward reference".to_string(),
            })
    }
}

impl TypeHandler for ForwardHandler {
    fn info(&self) -> &HandlerInfo {
        &self.info
    }

    fn read(&self, guest: &mut dyn GuestInstance, offset: u32) -> Result<HostValue> {
        self.resolved()?.read(guest, offset)
    }

    fn write(
        &self,
        guest: &mut dyn GuestInstance,
        offset: u32,
        value: &HostValue,
        cleanup: &mut Cleanup,
    ) -> Result<()> {
        self.resolved()?.write(guest, offset, value, cleanup)
    }

    fn decode(&self, guest: &mut dyn GuestInstance, slots: &[u64]) -> Result<HostValue> {
        self.resolved()?.decode(guest, slots)
    }

    fn encode(
        &self,
        guest: &mut dyn GuestInstance,
        value: &HostValue,
        slots: &mut Vec<u64>,
        cleanup: &mut Cleanup,
    ) -> Result<()> {
        self.resolved()?.encode(guest, value, slots, cleanup)
    }
}
