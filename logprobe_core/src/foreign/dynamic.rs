//! An in-process foreign runtime.
//!
//! Objects are tables of closure-backed methods; contexts are class tables
//! with a liveness flag. This is what the emulated host and the tests use in
//! place of a real application server.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use super::context::{ContextId, ForeignClass, HostRuntime, HostedApplication, IsolatedContext};
use super::object::{ForeignFault, ForeignObject, MethodSignature, ObjectRef, TypeInfo};
use super::value::{ForeignValue, ValueKind};

type MethodFn = Arc<dyn Fn(&[ForeignValue]) -> Result<ForeignValue, ForeignFault> + Send + Sync>;

/// Shared running flag of a context and every object it created.
#[derive(Debug, Clone)]
pub struct Liveness(Arc<AtomicBool>);

impl Liveness {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_alive(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn kill(&self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

struct Overload {
    signature: MethodSignature,
    body: MethodFn,
}

/// A foreign object whose methods are closures.
pub struct DynamicObject {
    type_info: TypeInfo,
    methods: HashMap<String, Vec<Overload>>,
    liveness: Liveness,
}

impl fmt::Debug for DynamicObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.methods.keys().collect();
        names.sort();
        f.debug_struct("DynamicObject")
            .field("type", &self.type_info.name)
            .field("methods", &names)
            .finish()
    }
}

impl ForeignObject for DynamicObject {
    fn type_info(&self) -> &TypeInfo {
        &self.type_info
    }

    fn signatures(&self, method: &str) -> Vec<MethodSignature> {
        self.methods
            .get(method)
            .map(|overloads| overloads.iter().map(|o| o.signature.clone()).collect())
            .unwrap_or_default()
    }

    fn call(&self, method: &str, args: &[ForeignValue]) -> Result<ForeignValue, ForeignFault> {
        if !self.liveness.is_alive() {
            return Err(ForeignFault::new(format!(
                "java.lang.IllegalStateException: {} belongs to a stopped context",
                self.type_info.name
            )));
        }
        let overload = self
            .methods
            .get(method)
            .and_then(|overloads| {
                overloads.iter().find(|o| {
                    o.signature.params.len() == args.len()
                        && args
                            .iter()
                            .zip(&o.signature.params)
                            .all(|(value, kind)| value.conforms_to(kind))
                })
            })
            .ok_or_else(|| {
                ForeignFault::new(format!(
                    "java.lang.NoSuchMethodException: {}.{}",
                    self.type_info.name, method
                ))
            })?;
        (overload.body)(args)
    }
}

/// Builder for [`DynamicObject`].
pub struct DynamicObjectBuilder {
    type_info: TypeInfo,
    methods: HashMap<String, Vec<Overload>>,
    liveness: Liveness,
}

impl DynamicObjectBuilder {
    pub fn new(type_info: TypeInfo, liveness: Liveness) -> Self {
        Self {
            type_info,
            methods: HashMap::new(),
            liveness,
        }
    }

    /// Add supertypes to the object's runtime type.
    pub fn extends<I, S>(mut self, supertypes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.type_info = self.type_info.extends(supertypes);
        self
    }

    /// Add a method overload.
    pub fn method<F>(mut self, name: &str, params: Vec<ValueKind>, body: F) -> Self
    where
        F: Fn(&[ForeignValue]) -> Result<ForeignValue, ForeignFault> + Send + Sync + 'static,
    {
        self.methods.entry(name.to_string()).or_default().push(Overload {
            signature: MethodSignature::new(name, params),
            body: Arc::new(body),
        });
        self
    }

    /// Add a no-argument method returning a fixed value.
    pub fn constant(self, name: &str, value: impl Into<ForeignValue>) -> Self {
        let value = value.into();
        self.method(name, vec![], move |_| Ok(value.clone()))
    }

    pub fn build(self) -> ObjectRef {
        ObjectRef::new(DynamicObject {
            type_info: self.type_info,
            methods: self.methods,
            liveness: self.liveness,
        })
    }
}

/// An isolated context backed by an in-memory class table.
#[derive(Debug)]
pub struct DynamicContext {
    id: ContextId,
    application: String,
    classes: RwLock<HashMap<String, ForeignClass>>,
    liveness: Liveness,
}

impl DynamicContext {
    pub fn new(application: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: ContextId::new(),
            application: application.into(),
            classes: RwLock::new(HashMap::new()),
            liveness: Liveness::new(),
        })
    }

    pub fn liveness(&self) -> Liveness {
        self.liveness.clone()
    }

    /// Start building an object whose type is defined by this context.
    pub fn object(&self, type_name: &str) -> DynamicObjectBuilder {
        DynamicObjectBuilder::new(TypeInfo::new(type_name, self.id), self.liveness.clone())
    }

    /// Start building the static side of a class.
    pub fn statics(&self) -> DynamicObjectBuilder {
        self.object("java.lang.Class")
    }

    /// Make a class loadable by name.
    pub fn define_class(&self, name: &str, statics: DynamicObjectBuilder) {
        let class = ForeignClass::new(name, self.id, statics.build());
        self.classes.write().insert(name.to_string(), class);
    }

    /// Stop the context. Every object it created faults from now on.
    pub fn stop(&self) {
        info!("Stopping context {} of {}", self.id, self.application);
        self.liveness.kill();
    }
}

impl IsolatedContext for DynamicContext {
    fn id(&self) -> ContextId {
        self.id
    }

    fn application(&self) -> &str {
        &self.application
    }

    fn is_alive(&self) -> bool {
        self.liveness.is_alive()
    }

    fn load_class(&self, name: &str) -> Option<ForeignClass> {
        if !self.is_alive() {
            debug!("Context {} is stopped, cannot load {}", self.id, name);
            return None;
        }
        self.classes.read().get(name).cloned()
    }
}

#[derive(Debug)]
struct Deployment {
    work_dir: PathBuf,
    context: Option<Arc<DynamicContext>>,
}

/// A host runtime over dynamic contexts.
#[derive(Debug, Default)]
pub struct DynamicHost {
    deployments: RwLock<BTreeMap<String, Deployment>>,
}

impl DynamicHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deploy an application, replacing (and stopping) any previous deployment.
    pub fn deploy(
        &self,
        name: impl Into<String>,
        work_dir: impl Into<PathBuf>,
        context: Option<Arc<DynamicContext>>,
    ) {
        let name = name.into();
        let previous = self.deployments.write().insert(
            name.clone(),
            Deployment {
                work_dir: work_dir.into(),
                context,
            },
        );
        if let Some(ctx) = previous.and_then(|d| d.context) {
            ctx.stop();
        }
        debug!("Deployed {}", name);
    }

    /// Stop a running application. Returns `false` if it is unknown.
    pub fn stop(&self, name: &str) -> bool {
        match self.deployments.write().get_mut(name) {
            Some(deployment) => {
                if let Some(ctx) = deployment.context.take() {
                    ctx.stop();
                }
                true
            }
            None => false,
        }
    }

    /// Remove an application entirely.
    pub fn undeploy(&self, name: &str) -> bool {
        match self.deployments.write().remove(name) {
            Some(deployment) => {
                if let Some(ctx) = deployment.context {
                    ctx.stop();
                }
                true
            }
            None => false,
        }
    }

    pub fn context(&self, name: &str) -> Option<Arc<DynamicContext>> {
        self.deployments
            .read()
            .get(name)
            .and_then(|d| d.context.clone())
    }
}

impl HostRuntime for DynamicHost {
    fn applications(&self) -> Vec<HostedApplication> {
        self.deployments
            .read()
            .iter()
            .map(|(name, deployment)| {
                let app = HostedApplication::new(name.clone(), deployment.work_dir.clone());
                match &deployment.context {
                    Some(ctx) => app.with_context(ctx.clone() as Arc<dyn IsolatedContext>),
                    None => app,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn greeter(ctx: &DynamicContext) -> ObjectRef {
        ctx.object("demo.Greeter")
            .constant("getName", "greeter")
            .method("greet", vec![ValueKind::Str], |args| {
                let who = args[0].as_str().unwrap_or("nobody");
                Ok(ForeignValue::from(format!("hello {}", who)))
            })
            .build()
    }

    #[test]
    fn test_dynamic_object_dispatch() {
        let ctx = DynamicContext::new("demo");
        let obj = greeter(&ctx);

        let result = obj.call("greet", &[ForeignValue::from("bob")]).unwrap();
        assert_eq!(result.as_str(), Some("hello bob"));
        assert_eq!(obj.signatures("greet").len(), 1);
        assert!(obj.signatures("missing").is_empty());
        assert!(obj.call("greet", &[]).is_err());
    }

    #[test]
    fn test_stopped_context_faults() {
        let ctx = DynamicContext::new("demo");
        ctx.define_class("demo.Greeter", ctx.statics());
        let obj = greeter(&ctx);

        ctx.stop();

        let err = obj.call("getName", &[]).unwrap_err();
        assert!(err.message.contains("stopped"));
        assert!(ctx.load_class("demo.Greeter").is_none());
    }

    #[test]
    fn test_class_identity_is_per_context() {
        let a = DynamicContext::new("a");
        let b = DynamicContext::new("b");
        a.define_class("demo.Greeter", a.statics());
        b.define_class("demo.Greeter", b.statics());

        let from_b = greeter(&b);
        let class_a = a.load_class("demo.Greeter").unwrap();
        let class_b = b.load_class("demo.Greeter").unwrap();

        assert!(!class_a.is_instance(&from_b));
        assert!(class_b.is_instance(&from_b));
    }

    #[test]
    fn test_host_lifecycle() {
        let host = DynamicHost::new();
        let ctx = DynamicContext::new("shop");
        host.deploy("shop", "/apps/shop", Some(ctx.clone()));
        host.deploy("static", "/apps/static", None);

        assert_eq!(host.applications().len(), 2);
        assert!(host.find_application("shop").unwrap().live_context().is_some());

        assert!(host.stop("shop"));
        assert!(!ctx.is_alive());
        assert!(host.find_application("shop").unwrap().context.is_none());
        assert!(!host.stop("missing"));

        assert!(host.undeploy("static"));
        assert!(host.find_application("static").is_none());
    }
}
