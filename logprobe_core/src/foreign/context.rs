//! Isolated contexts and the host runtime that owns them.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use uuid::Uuid;

use super::object::ObjectRef;

/// Identity of one isolated context. A reloaded application gets a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(Uuid);

impl ContextId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The short form is enough to tell contexts apart in logs.
        write!(f, "{}", &self.0.simple().to_string()[..8])
    }
}

/// A class as loaded by one particular context.
#[derive(Debug, Clone)]
pub struct ForeignClass {
    name: String,
    context: ContextId,
    statics: ObjectRef,
}

impl ForeignClass {
    /// Create a class whose static methods are served by `statics`.
    pub fn new(name: impl Into<String>, context: ContextId, statics: ObjectRef) -> Self {
        Self {
            name: name.into(),
            context,
            statics,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    /// The object answering static method calls on this class.
    pub fn statics(&self) -> &ObjectRef {
        &self.statics
    }

    /// Check whether `object` is an instance of this class.
    ///
    /// A same-named type defined by another context is a different class.
    pub fn is_instance(&self, object: &ObjectRef) -> bool {
        let info = object.type_info();
        info.context == self.context && info.is_a(&self.name)
    }
}

/// The private runtime environment of one hosted application.
pub trait IsolatedContext: Send + Sync + fmt::Debug {
    fn id(&self) -> ContextId;

    /// Name of the hosted application owning this context.
    fn application(&self) -> &str;

    /// `false` once the application has been stopped or reloaded.
    fn is_alive(&self) -> bool;

    /// Load a class by name through this context's own loading mechanism.
    fn load_class(&self, name: &str) -> Option<ForeignClass>;
}

/// A hosted application as reported by the host runtime.
#[derive(Debug, Clone)]
pub struct HostedApplication {
    /// Application name (its context path without the leading slash).
    pub name: String,

    /// Working directory; relative log paths resolve against it.
    pub work_dir: PathBuf,

    /// The application's isolated context, absent when it is not running.
    pub context: Option<Arc<dyn IsolatedContext>>,
}

impl HostedApplication {
    pub fn new(name: impl Into<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            work_dir: work_dir.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: Arc<dyn IsolatedContext>) -> Self {
        self.context = Some(context);
        self
    }

    /// The context, if the application is running.
    pub fn live_context(&self) -> Option<&Arc<dyn IsolatedContext>> {
        self.context.as_ref().filter(|ctx| ctx.is_alive())
    }
}

/// The application server hosting the applications.
pub trait HostRuntime: Send + Sync {
    /// All deployed applications, running or not.
    fn applications(&self) -> Vec<HostedApplication>;

    /// Look one application up by name.
    fn find_application(&self, name: &str) -> Option<HostedApplication> {
        self.applications().into_iter().find(|app| app.name == name)
    }
}
