//! Values exchanged with foreign objects.

use std::fmt;

use super::object::ObjectRef;

/// A value passed to or returned from a foreign call.
#[derive(Debug, Clone)]
pub enum ForeignValue {
    /// The foreign null reference.
    Null,

    /// A boolean.
    Bool(bool),

    /// An integer.
    Int(i64),

    /// A string.
    Str(String),

    /// A reference to another foreign object.
    Object(ObjectRef),

    /// A list or iterator materialized into a vector.
    List(Vec<ForeignValue>),
}

/// The declared shape of a method parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueKind {
    Bool,
    Int,
    Str,
    List,
    /// An object of the named type (or any subtype).
    Object(String),
    /// Accepts every value, including null.
    Any,
}

impl ForeignValue {
    /// Returns `true` for the null reference.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Borrow the string payload.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Get the boolean payload.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get the integer payload.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Borrow the object payload.
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Take the object payload.
    pub fn into_object(self) -> Option<ObjectRef> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Take the list payload.
    pub fn into_list(self) -> Option<Vec<ForeignValue>> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Check whether this value may be passed where `kind` is declared.
    ///
    /// Null conforms to object, list and string parameters, mirroring
    /// reference semantics on the foreign side.
    pub fn conforms_to(&self, kind: &ValueKind) -> bool {
        match (self, kind) {
            (_, ValueKind::Any) => true,
            (Self::Null, ValueKind::Object(_) | ValueKind::List | ValueKind::Str) => true,
            (Self::Bool(_), ValueKind::Bool) => true,
            (Self::Int(_), ValueKind::Int) => true,
            (Self::Str(_), ValueKind::Str) => true,
            (Self::List(_), ValueKind::List) => true,
            (Self::Object(obj), ValueKind::Object(type_name)) => obj.type_info().is_a(type_name),
            _ => false,
        }
    }
}

impl From<&str> for ForeignValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for ForeignValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<bool> for ForeignValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for ForeignValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<ObjectRef> for ForeignValue {
    fn from(obj: ObjectRef) -> Self {
        Self::Object(obj)
    }
}

impl From<Option<ObjectRef>> for ForeignValue {
    fn from(obj: Option<ObjectRef>) -> Self {
        obj.map(Self::Object).unwrap_or(Self::Null)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => write!(f, "boolean"),
            Self::Int => write!(f, "int"),
            Self::Str => write!(f, "String"),
            Self::List => write!(f, "List"),
            Self::Object(name) => write!(f, "{}", name),
            Self::Any => write!(f, "Object"),
        }
    }
}
