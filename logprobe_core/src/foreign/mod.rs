//! The foreign object model.
//!
//! Everything the introspection layer knows about a hosted application's
//! private runtime goes through these types: handles to objects whose static
//! type is unknown, classes loaded by one specific context, and the host that
//! enumerates applications.

mod context;
mod dynamic;
mod object;
mod value;

pub use context::{ContextId, ForeignClass, HostRuntime, HostedApplication, IsolatedContext};
pub use dynamic::{DynamicContext, DynamicHost, DynamicObject, DynamicObjectBuilder, Liveness};
pub use object::{ForeignFault, ForeignObject, MethodSignature, ObjectIdentity, ObjectRef, TypeInfo};
pub use value::{ForeignValue, ValueKind};
