//! Engine-backed guest instances.
//!
//! Adapts a wasmtime instance to the [`GuestInstance`] contract. The
//! export names of the allocator and pin hooks differ per ABI profile,
//! so they are carried in a [`GuestAbi`] selected from the plugin's SDK
//! language.

use crate::error::{MarshalError, Result};
use crate::instance::GuestInstance;
use crate::metadata::SdkLanguage;
use wasmtime::{Engine, Instance, Linker, Memory, Module, Store, Val, ValType};

/// Export names of the guest-side runtime hooks.
pub struct GuestAbi {
    pub alloc_export: &'static str,
    /// The managed allocator takes `(size, class_id)`; the native one
    /// takes only `size`.
    pub alloc_takes_class: bool,
    pub pin_export: Option<&'static str>,
    pub unpin_export: Option<&'static str>,
}

impl GuestAbi {
    pub fn for_language(language: SdkLanguage) -> Self {
        match language {
            SdkLanguage::AssemblyScript => Self {
                alloc_export: "__new",
                alloc_takes_class: true,
                pin_export: Some("__pin"),
                unpin_export: Some("__unpin"),
            },
            SdkLanguage::TinyGo => Self {
                alloc_export: "malloc",
                alloc_takes_class: false,
                pin_export: None,
                unpin_export: None,
            },
        }
    }
}

/// A live guest module bound to its store, memory, and ABI hooks.
pub struct WasmGuest {
    store: Store<()>,
    instance: Instance,
    memory: Memory,
    abi: GuestAbi,
}

fn guest_error(err: impl std::fmt::Display) -> MarshalError {
    MarshalError::GuestError {
        message: err.to_string(),
    }
}

impl WasmGuest {
    /// Instantiate a module with no host imports.
    pub fn instantiate(engine: &Engine, module: &Module, abi: GuestAbi) -> Result<Self> {
        let mut store = Store::new(engine, ());
        let linker = Linker::<()>::new(engine);
        let instance = linker
            .instantiate(&mut store, module)
            .map_err(guest_error)?;
        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or_else(|| guest_error("no exported memory named 'memory'"))?;
        Ok(Self {
            store,
            instance,
            memory,
            abi,
        })
    }
}

impl GuestInstance for WasmGuest {
    fn read_bytes(&self, offset: u32, len: u32) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; len as usize];
        self.memory
            .read(&self.store, offset as usize, &mut buffer)
            .map_err(|_| MarshalError::MemoryFault {
                op: "read",
                offset,
                len,
            })?;
        Ok(buffer)
    }

    fn write_bytes(&mut self, offset: u32, bytes: &[u8]) -> Result<()> {
        self.memory
            .write(&mut self.store, offset as usize, bytes)
            .map_err(|_| MarshalError::MemoryFault {
                op: "write",
                offset,
                len: bytes.len() as u32,
            })
    }

    fn allocate(&mut self, size: u32, class_id: u32) -> Result<u32> {
        let ptr = if self.abi.alloc_takes_class {
            let alloc = self
                .instance
                .get_typed_func::<(i32, i32), i32>(&mut self.store, self.abi.alloc_export)
                .map_err(guest_error)?;
            alloc
                .call(&mut self.store, (size as i32, class_id as i32))
                .map_err(guest_error)?
        } else {
            let alloc = self
                .instance
                .get_typed_func::<i32, i32>(&mut self.store, self.abi.alloc_export)
                .map_err(guest_error)?;
            alloc.call(&mut self.store, size as i32).map_err(guest_error)?
        };
        if ptr == 0 {
            return Err(MarshalError::AllocFault { size, class_id });
        }
        Ok(ptr as u32)
    }

    fn pin(&mut self, ptr: u32) -> Result<()> {
        if let Some(name) = self.abi.pin_export {
            let pin = self
                .instance
                .get_typed_func::<i32, i32>(&mut self.store, name)
                .map_err(guest_error)?;
            pin.call(&mut self.store, ptr as i32).map_err(guest_error)?;
        }
        Ok(())
    }

    fn unpin(&mut self, ptr: u32) -> Result<()> {
        if let Some(name) = self.abi.unpin_export {
            let unpin = self
                .instance
                .get_typed_func::<i32, ()>(&mut self.store, name)
                .map_err(guest_error)?;
            unpin
                .call(&mut self.store, ptr as i32)
                .map_err(guest_error)?;
        }
        Ok(())
    }

    fn invoke(&mut self, name: &str, args: &[u64]) -> Result<Vec<u64>> {
        let func = self
            .instance
            .get_func(&mut self.store, name)
            .ok_or_else(|| guest_error(format!("no export named '{name}'")))?;
        let ty = func.ty(&self.store);

        let param_types: Vec<ValType> = ty.params().collect();
        if param_types.len() != args.len() {
            return Err(guest_error(format!(
                "export '{name}' takes {} parameters, got {} slots",
                param_types.len(),
                args.len()
            )));
        }

        let mut params = Vec::with_capacity(args.len());
        for (slot, ty) in args.iter().zip(&param_types) {
            params.push(slot_to_val(*slot, ty, name)?);
        }

        let mut results = vec![Val::I32(0); ty.results().len()];
        func.call(&mut self.store, &params, &mut results)
            .map_err(guest_error)?;

        results.iter().map(|val| val_to_slot(val, name)).collect()
    }
}

fn slot_to_val(slot: u64, ty: &ValType, name: &str) -> Result<Val> {
    Ok(match ty {
        ValType::I32 => Val::I32(slot as u32 as i32),
        ValType::I64 => Val::I64(slot as i64),
        ValType::F32 => Val::F32(slot as u32),
        ValType::F64 => Val::F64(slot),
        other => {
            return Err(guest_error(format!(
                "export '{name}' has unsupported parameter type {other}"
            )))
        }
    })
}

fn val_to_slot(val: &Val, name: &str) -> Result<u64> {
    Ok(match val {
        Val::I32(v) => *v as u32 as u64,
        Val::I64(v) => *v as u64,
        Val::F32(bits) => u64::from(*bits),
        Val::F64(bits) => *bits,
        other => {
            return Err(guest_error(format!(
                "export '{name}' has unsupported result type {other:?}"
            )))
        }
    })
}
