//! Foreign objects and the handles that reference them.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use super::context::ContextId;
use super::value::{ForeignValue, ValueKind};

/// Runtime type of a foreign object, as defined by one isolated context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeInfo {
    /// Fully qualified type name.
    pub name: String,

    /// Every supertype and implemented interface, nearest first.
    pub supertypes: Vec<String>,

    /// The context that defined this type.
    pub context: ContextId,
}

impl TypeInfo {
    /// Create a type with no supertypes.
    pub fn new(name: impl Into<String>, context: ContextId) -> Self {
        Self {
            name: name.into(),
            supertypes: Vec::new(),
            context,
        }
    }

    /// Add supertypes.
    pub fn extends<I, S>(mut self, supertypes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.supertypes.extend(supertypes.into_iter().map(Into::into));
        self
    }

    /// Check whether this type is `name` or one of its subtypes.
    pub fn is_a(&self, name: &str) -> bool {
        self.name == name || self.supertypes.iter().any(|s| s == name)
    }
}

/// Parameter shape of one method overload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSignature {
    pub name: String,
    pub params: Vec<ValueKind>,
}

impl MethodSignature {
    pub fn new(name: impl Into<String>, params: Vec<ValueKind>) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    /// Check whether the declared argument types select this overload.
    pub fn accepts(&self, arg_types: &[ValueKind]) -> bool {
        self.params.len() == arg_types.len()
            && self
                .params
                .iter()
                .zip(arg_types)
                .all(|(param, arg)| param == arg || *param == ValueKind::Any)
    }
}

/// An error raised by the foreign side of a call.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ForeignFault {
    /// The foreign diagnostic, verbatim.
    pub message: String,
}

impl ForeignFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// An object living inside an isolated context.
///
/// Implementations dispatch by method name at runtime. Callers never see a
/// static type for the object; they go through [`ObjectRef`] and the
/// capability accessor.
pub trait ForeignObject: Send + Sync + fmt::Debug {
    /// The runtime type of this object.
    fn type_info(&self) -> &TypeInfo;

    /// All overloads of `method`, empty when no such method exists.
    fn signatures(&self, method: &str) -> Vec<MethodSignature>;

    /// Invoke `method` with already shape-checked arguments.
    fn call(&self, method: &str, args: &[ForeignValue]) -> Result<ForeignValue, ForeignFault>;

    /// A short description used in diagnostics.
    fn describe(&self) -> String {
        format!("{}@{}", self.type_info().name, self.type_info().context)
    }
}

/// Identity of a foreign object, stable for the object's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectIdentity(usize);

/// A shared reference to a foreign object.
#[derive(Clone)]
pub struct ObjectRef(Arc<dyn ForeignObject>);

impl ObjectRef {
    pub fn new<T: ForeignObject + 'static>(object: T) -> Self {
        Self(Arc::new(object))
    }

    pub fn from_arc(object: Arc<dyn ForeignObject>) -> Self {
        Self(object)
    }

    /// The identity of the referenced object.
    ///
    /// Two handles have equal identity exactly when they point to the same
    /// object; names and contents play no part.
    pub fn identity(&self) -> ObjectIdentity {
        ObjectIdentity(Arc::as_ptr(&self.0) as *const () as usize)
    }

    pub fn same_object(&self, other: &ObjectRef) -> bool {
        self.identity() == other.identity()
    }
}

impl std::ops::Deref for ObjectRef {
    type Target = dyn ForeignObject;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef({})", self.0.describe())
    }
}
