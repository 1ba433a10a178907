//! Gantry: a host runtime core for WebAssembly plugins.
//!
//! Gantry loads user-authored compute plugins, registers their exported
//! functions, and marshals values between the host's dynamic value
//! representation and each guest language's native memory layout.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              Gantry Runtime              │
//! │                                          │
//! │  metadata  - plugin type information     │
//! │  profile   - per-language ABI handlers   │
//! │  plan      - memoised handler planning   │
//! │  marshal   - call boundary crossing      │
//! │  registry  - registered function set     │
//! │                                          │
//! ├──────────────────────────────────────────┤
//! │        WASM Execution (wasmtime)         │
//! └──────────────────────────────────────────┘
//! ```
//!
//! ## Profiles
//!
//! Two guest ABI profiles are supported. Managed-heap guests keep every
//! object behind a 16-byte class header and require allocations to be
//! pinned against their collector while the host holds pointers into
//! them. Native-value guests use pointer/length structs and inline
//! layout, with no headers and no pinning.
//!
//! ## Calling a function
//!
//! ```ignore
//! let metadata = metadata::extract_metadata(&wasm_bytes)?;
//! let plugin = ActivatedPlugin::new(metadata, metadata::build_id(&wasm_bytes));
//! registry.rebuild(&[plugin])?;
//!
//! let function = registry.snapshot().get("greet").unwrap().clone();
//! let result = invoke_function(
//!     &mut guest,
//!     &function.plan,
//!     &[HostValue::Text("world".into())],
//!     &CancelToken::new(),
//! )?;
//! ```

pub mod cleanup;
pub mod error;
pub mod handler;
pub mod instance;
pub mod marshal;
pub mod metadata;
pub mod plan;
pub mod profile;
pub mod registry;
pub mod value;
pub mod wasm;

pub use cleanup::Cleanup;
pub use error::{MarshalError, Result};
pub use handler::{HandlerInfo, TypeHandler};
pub use instance::GuestInstance;
pub use marshal::{invoke_function, CancelToken, FunctionPlan, ParamPlan};
pub use metadata::{
    build_id, decode_metadata, encode_metadata, extract_metadata, FunctionSignature,
    MetadataError, Parameter, PluginMetadata, SdkLanguage, TypeDef,
};
pub use profile::Planner;
pub use registry::{ActivatedPlugin, FunctionRegistry, RegisteredFunction, SharedRegistry};
pub use value::HostValue;
pub use wasm::{GuestAbi, WasmGuest};
