//! # Sandbox
//!
//! In-process component host implementing `ComponentSandbox`.
//!
//! Components are built from config by module name through a
//! [`ModuleRegistry`]. Builtins:
//!
//! | module           | behaviour                                      |
//! |------------------|------------------------------------------------|
//! | `passthrough`    | forwards numeric channel values                |
//! | `moving_average` | rolling mean over the first numeric input      |
//! | `counter`        | counts its invocations                         |
//! | `sum`            | adds every available numeric input             |
//!
//! Any component can carry `fault.*` params to inject failures, delays or
//! hangs (see [`FaultPlan`]).

mod error;
mod fault;
mod modules;
mod native;

pub use error::{Result, SandboxError};
pub use fault::FaultPlan;
pub use modules::{ModuleFactory, ModuleRegistry, NativeModule, BUILTIN_MODULES};
pub use native::NativeSandbox;
