//! Method dispatch: the registry, the role gate, and the built-in handlers.

pub mod handlers;
pub mod permissions;
pub mod registry;
pub mod validation;

pub use permissions::{ALWAYS_ALLOWED, Permissions};
pub use registry::{BuiltinMethod, HandlerFn, MethodHandler, MethodRegistry};
