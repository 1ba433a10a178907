//! The process-wide function registry.
//!
//! Maps exported function names to their owning plugin and planned
//! handlers. The registry is rebuilt from scratch every time the plugin
//! set changes and swapped in as a single reference store, so request
//! handlers never observe a half-updated view; stale entries disappear
//! with the swap.

use crate::error::Result;
use crate::marshal::FunctionPlan;
use crate::metadata::{PluginMetadata, SdkLanguage};
use crate::profile::managed::{ManagedPlanner, ManagedTypes};
use crate::profile::native::{NativePlanner, NativeTypes};
use crate::profile::Planner;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// A plugin whose handlers are ready to plan: metadata plus the planner
/// for its SDK language's ABI profile.
pub struct ActivatedPlugin {
    pub metadata: PluginMetadata,
    pub build_id: String,
    pub planner: Planner,
}

impl ActivatedPlugin {
    pub fn new(metadata: PluginMetadata, build_id: String) -> Self {
        let planner = match metadata.language {
            SdkLanguage::AssemblyScript => {
                Planner::Managed(ManagedPlanner::new(ManagedTypes::from_metadata(&metadata)))
            }
            SdkLanguage::TinyGo => {
                Planner::Native(NativePlanner::new(NativeTypes::from_metadata(&metadata)))
            }
        };
        Self {
            metadata,
            build_id,
            planner,
        }
    }
}

/// One registered function.
pub struct RegisteredFunction {
    pub plugin: String,
    pub build_id: String,
    pub plan: Arc<FunctionPlan>,
}

/// An immutable snapshot of the registered function set.
#[derive(Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<RegisteredFunction>>,
}

impl FunctionRegistry {
    pub fn get(&self, name: &str) -> Option<&Arc<RegisteredFunction>> {
        self.functions.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// Shared handle to the current registry snapshot.
pub struct SharedRegistry {
    current: RwLock<Arc<FunctionRegistry>>,
}

impl Default for SharedRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedRegistry {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(FunctionRegistry::default())),
        }
    }

    /// The current snapshot. Calls in flight keep whatever snapshot they
    /// started with.
    pub fn snapshot(&self) -> Arc<FunctionRegistry> {
        Arc::clone(&self.current.read().expect("registry poisoned"))
    }

    /// Rebuild the registry from the given plugin set and swap it in.
    ///
    /// Functions whose types fail to plan are skipped with a warning;
    /// one bad signature does not unregister the rest of the plugin.
    pub fn rebuild(&self, plugins: &[ActivatedPlugin]) -> Result<()> {
        let mut functions = HashMap::new();
        for plugin in plugins {
            for signature in &plugin.metadata.functions {
                let plan = match FunctionPlan::from_signature(signature, &plugin.planner) {
                    Ok(plan) => plan,
                    Err(err) => {
                        warn!(
                            function = %signature.name,
                            plugin = %plugin.metadata.plugin,
                            error = %err,
                            "skipping function that failed to plan"
                        );
                        continue;
                    }
                };
                functions.insert(
                    signature.name.clone(),
                    Arc::new(RegisteredFunction {
                        plugin: plugin.metadata.plugin.clone(),
                        build_id: plugin.build_id.clone(),
                        plan: Arc::new(plan),
                    }),
                );
                info!(
                    function = %signature.name,
                    plugin = %plugin.metadata.plugin,
                    build_id = %plugin.build_id,
                    "registered function"
                );
            }
        }

        let next = Arc::new(FunctionRegistry { functions });
        let previous = {
            let mut current = self.current.write().expect("registry poisoned");
            std::mem::replace(&mut *current, Arc::clone(&next))
        };

        for (name, function) in &previous.functions {
            if !next.functions.contains_key(name) {
                info!(
                    function = %name,
                    plugin = %function.plugin,
                    build_id = %function.build_id,
                    "unregistered function"
                );
            }
        }
        Ok(())
    }
}
